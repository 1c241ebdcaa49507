//! Conversion of the Apollo 11 lunar module descent markers from KML into a
//! globe keyframe asset.

use std::fmt;
use std::fs;
use std::ops::{Add, Sub};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub mod asset;
pub mod markers;
pub mod tree;

pub use asset::{render_asset, render_header, render_keyframes};
pub use markers::{
    collect_positions, extract_marker, format_timestamp, landing_offset, marker_timestamp,
    parse_coordinate, parse_elapsed_seconds, PositionRecord, TIMESTAMP_FORMAT,
};
pub use tree::{filter, find, get_string, has_name, parse_document, traverse, LabeledNode, NodeKind};

#[derive(Error, Debug)]
pub enum DescentError {
    #[error("failed to parse KML: {0}")]
    Xml(String),
    #[error("no marker group named '{0}' in document")]
    GroupNotFound(String),
    #[error("marker group '{0}' holds no usable markers")]
    NoMarkers(String),
    #[error("marker name does not start with M:SS: '{0}'")]
    InvalidMarkerName(String),
    #[error("expected lon,lat,alt coordinates, got '{0}'")]
    InvalidCoordinates(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Default input as published with the Google Moon KMZ collection.
pub const DEFAULT_INPUT: &str = "the_last_four_minutes_2019-06-09.kml";
pub const DEFAULT_OUTPUT: &str = "apollo11LemDescent.asset";
pub const DEFAULT_GROUP: &str = "Decent Markers";
pub const DEFAULT_SOURCE_URL: &str = "http://apollo.mem-tek.com/GoogleMoonKMZ.html";

/// 1969-07-20T20:17:40Z as seconds from the Unix epoch.
const APOLLO_11_TOUCHDOWN_UNIX: i64 = -14_182_940;

/// Landing site extracted from LRO footage.
pub const LRO_LANDING_SPOT: Coordinate = Coordinate {
    longitude: 23.4733,
    latitude: 0.6741,
    altitude: -1925.0,
};

pub fn apollo_11_touchdown() -> DateTime<Utc> {
    DateTime::<Utc>::default() + TimeDelta::seconds(APOLLO_11_TOUCHDOWN_UNIX)
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

impl Coordinate {
    pub const fn new(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude,
        }
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: Coordinate) -> Coordinate {
        Coordinate::new(
            self.longitude + rhs.longitude,
            self.latitude + rhs.latitude,
            self.altitude + rhs.altitude,
        )
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: Coordinate) -> Coordinate {
        Coordinate::new(
            self.longitude - rhs.longitude,
            self.latitude - rhs.latitude,
            self.altitude - rhs.altitude,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.longitude, self.latitude, self.altitude)
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct Keyframe {
    pub timestamp: NaiveDateTime,
    pub coordinate: Coordinate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Name of the folder holding the descent markers (spelled as in the KML).
    pub group_name: String,
    pub touchdown: DateTime<Utc>,
    pub landing_spot: Coordinate,
    pub globe: String,
    pub translation_type: String,
    pub use_heightmap: bool,
    /// Input file name quoted in the asset header.
    pub source_name: String,
    pub source_url: String,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            group_name: DEFAULT_GROUP.to_string(),
            touchdown: apollo_11_touchdown(),
            landing_spot: LRO_LANDING_SPOT,
            globe: "Moon".to_string(),
            translation_type: "GlobeTranslation".to_string(),
            use_heightmap: false,
            source_name: DEFAULT_INPUT.to_string(),
            source_url: DEFAULT_SOURCE_URL.to_string(),
        }
    }
}

/// Extracted markers together with the landing correction.
#[derive(Clone, Debug, Serialize)]
pub struct Conversion {
    pub positions: PositionRecord,
    /// Unshifted record of the last processed marker.
    pub landing: Keyframe,
    /// Where the landing record is placed; other records move by `offset`.
    pub target: Coordinate,
    pub offset: Coordinate,
}

impl Conversion {
    /// Keyframes in record order with the offset applied. The landing record
    /// is emitted at `target` itself so float rounding cannot move it.
    pub fn corrected(&self) -> impl Iterator<Item = Keyframe> + '_ {
        self.positions.iter().map(move |kf| Keyframe {
            timestamp: kf.timestamp,
            coordinate: if kf.timestamp == self.landing.timestamp {
                self.target
            } else {
                kf.coordinate + self.offset
            },
        })
    }

    pub fn render(&self, params: &Params) -> String {
        render_asset(self, params)
    }
}

/// Locate the marker group in an already parsed tree and compute the keyframes.
pub fn convert_document(tree: &LabeledNode, params: &Params) -> Result<Conversion, DescentError> {
    let group = find(tree, has_name(&params.group_name))
        .ok_or_else(|| DescentError::GroupNotFound(params.group_name.clone()))?;
    let positions = collect_positions(group, params.touchdown)?;
    let (landing, offset) = landing_offset(&positions, params.landing_spot, &params.group_name)?;
    info!(
        "Extracted {} keyframes, landing {} at {}, offset {}",
        positions.len(),
        format_timestamp(&landing.timestamp),
        landing.coordinate,
        offset
    );
    Ok(Conversion {
        positions,
        landing,
        target: params.landing_spot,
        offset,
    })
}

pub fn convert_str(xml: &str, params: &Params) -> Result<Conversion, DescentError> {
    let tree = parse_document(xml)?;
    convert_document(&tree, params)
}

pub fn convert_file(path: &Path, params: &Params) -> Result<Conversion, DescentError> {
    let xml = fs::read_to_string(path).map_err(|source| DescentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    convert_str(&xml, params)
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const DESCENT_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
<Document>
  <name>The last four minutes</name>
  <Folder>
    <name>Ground Track</name>
    <Placemark>
      <name>4:00 Ground</name>
      <Point><coordinates>0,0,0</coordinates></Point>
    </Placemark>
  </Folder>
  <Folder>
    <name>Decent Markers</name>
    <open>1</open>
    <Placemark>
      <name>3:42 Throttle down</name>
      <Point>
        <altitudeMode>relativeToGround</altitudeMode>
        <coordinates>23.6,0.80,-1000</coordinates>
      </Point>
    </Placemark>
    <Placemark>
      <name>Note without a point</name>
    </Placemark>
    <Placemark>
      <name>1:00 Hover</name>
      <Point>
        <coordinates>
          23.52,0.71,-1900
        </coordinates>
      </Point>
    </Placemark>
    <Placemark>
      <name>0:00 Contact</name>
      <Point><coordinates>23.5,0.70,-1920</coordinates></Point>
    </Placemark>
  </Folder>
</Document>
</kml>"#;
}
