//! Descent marker extraction: elapsed-time parsing, timestamp math, and the
//! insertion-ordered position record the offset is derived from.

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use super::tree::{get_string, LabeledNode};
use super::{Coordinate, DescentError, Keyframe};

/// Keyframe timestamp layout: ISO-8601, whole seconds, no zone suffix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse the leading `M:SS` / `MM:SS` token of a marker name into seconds
/// before touchdown.
pub fn parse_elapsed_seconds(name: &str) -> Result<u32, DescentError> {
    let invalid = || DescentError::InvalidMarkerName(name.to_string());
    let (minutes, rest) = name.trim_start().split_once(':').ok_or_else(invalid)?;
    if minutes.is_empty() || !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let digits = rest.bytes().take(2).take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Err(invalid());
    }
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    let seconds: u32 = rest[..digits].parse().map_err(|_| invalid())?;
    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(invalid)
}

/// Parse a KML `lon,lat,alt` tuple. Surrounding whitespace is ignored.
pub fn parse_coordinate(text: &str) -> Result<Coordinate, DescentError> {
    let invalid = || DescentError::InvalidCoordinates(text.trim().to_string());
    let parts: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let mut values = [0.0f64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| invalid())?;
    }
    Ok(Coordinate::new(values[0], values[1], values[2]))
}

/// Absolute marker time: `touchdown - elapsed`, truncated to whole seconds.
pub fn marker_timestamp(touchdown: DateTime<Utc>, elapsed_s: u32) -> NaiveDateTime {
    (touchdown - TimeDelta::seconds(i64::from(elapsed_s)))
        .naive_utc()
        .trunc_subsecs(0)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Pull `(timestamp, coordinate)` out of one child of the marker group.
///
/// Children without a `name` element or a `Point/coordinates` chain are not
/// markers and yield `Ok(None)`.
pub fn extract_marker(
    marker: &LabeledNode,
    touchdown: DateTime<Utc>,
) -> Result<Option<Keyframe>, DescentError> {
    let Some(name_node) = marker.child("name") else {
        debug!("skipping <{}>: no name element", marker.name);
        return Ok(None);
    };
    let Some(coords_node) = marker.child("Point").and_then(|p| p.child("coordinates")) else {
        debug!("skipping <{}>: no Point/coordinates", marker.name);
        return Ok(None);
    };

    let name = get_string(name_node).unwrap_or_default();
    let elapsed = parse_elapsed_seconds(name)?;
    let coordinate = parse_coordinate(get_string(coords_node).unwrap_or_default())?;
    let timestamp = marker_timestamp(touchdown, elapsed);
    debug!(
        "marker '{}': -{}s -> {} {}",
        name,
        elapsed,
        format_timestamp(&timestamp),
        coordinate
    );
    Ok(Some(Keyframe {
        timestamp,
        coordinate,
    }))
}

/// Timestamp-keyed coordinates in first-insertion order.
///
/// Re-inserting an existing timestamp replaces its coordinate in place. The
/// most recently inserted key is tracked separately: it is the landing record
/// even when it overwrote an earlier slot.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PositionRecord {
    entries: IndexMap<NaiveDateTime, Coordinate>,
    last: Option<NaiveDateTime>,
}

impl PositionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced coordinate when the timestamp was already present.
    pub fn insert(&mut self, timestamp: NaiveDateTime, coordinate: Coordinate) -> Option<Coordinate> {
        self.last = Some(timestamp);
        self.entries.insert(timestamp, coordinate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, timestamp: &NaiveDateTime) -> Option<Coordinate> {
        self.entries.get(timestamp).copied()
    }

    /// Record written by the last processed marker.
    pub fn last_inserted(&self) -> Option<Keyframe> {
        let timestamp = self.last?;
        self.get(&timestamp).map(|coordinate| Keyframe {
            timestamp,
            coordinate,
        })
    }

    pub fn latest_timestamp(&self) -> Option<NaiveDateTime> {
        self.entries.keys().max().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Keyframe> + '_ {
        self.entries.iter().map(|(timestamp, coordinate)| Keyframe {
            timestamp: *timestamp,
            coordinate: *coordinate,
        })
    }
}

/// Walk the direct children of the marker group and record every marker.
pub fn collect_positions(
    group: &LabeledNode,
    touchdown: DateTime<Utc>,
) -> Result<PositionRecord, DescentError> {
    let mut record = PositionRecord::new();
    for child in group.children.iter().filter(|c| c.is_element()) {
        if let Some(keyframe) = extract_marker(child, touchdown)? {
            if let Some(previous) = record.insert(keyframe.timestamp, keyframe.coordinate) {
                warn!(
                    "duplicate marker time {}: replacing {} with {}",
                    format_timestamp(&keyframe.timestamp),
                    previous,
                    keyframe.coordinate
                );
            }
        }
    }
    Ok(record)
}

/// Per-axis correction moving the landing record onto `landing_spot`.
pub fn landing_offset(
    record: &PositionRecord,
    landing_spot: Coordinate,
    group_name: &str,
) -> Result<(Keyframe, Coordinate), DescentError> {
    let landing = record
        .last_inserted()
        .ok_or_else(|| DescentError::NoMarkers(group_name.to_string()))?;
    if record.latest_timestamp() != Some(landing.timestamp) {
        warn!(
            "last marker in document order ({}) is not the latest in time; markers may be out of order",
            format_timestamp(&landing.timestamp)
        );
    }
    Ok((landing, landing_spot - landing.coordinate))
}
