//! Rendering of the keyframe asset script.

use super::markers::format_timestamp;
use super::{Conversion, Params};

/// Provenance and assumptions comment block placed above the keyframes.
pub fn render_header(conversion: &Conversion, params: &Params) -> String {
    let target = params.landing_spot;
    let original = conversion.landing.coordinate;
    let offset = conversion.offset;

    let mut out = String::new();
    out.push_str(&format!(
        "-- The following keyframe data was converted from {},\n",
        params.source_name
    ));
    out.push_str(&format!("-- which is available at {}\n\n", params.source_url));
    out.push_str("-- In the conversion, some assumptions and simplifications were made:\n");
    out.push_str(
        "--   * The descent markers in the KML have Point nodes expressed \"relative to ground\"\n",
    );
    out.push_str(&format!(
        "--     We assume that the ground is fixed at altitude {} meters below the reference ellipsoid,\n",
        -target.altitude
    ));
    out.push_str("--     in order to match height data from a height map constructed from LRO data.\n");
    out.push_str(&format!(
        "--   * We manually offset the coordinates slightly, by {} degrees in longitude and {} degrees in latitude,\n",
        offset.longitude, offset.latitude
    ));
    out.push_str(&format!(
        "--     in order to match the landing spot specified at long: {}, lat: {} extracted from footage from LRO.\n",
        target.longitude, target.latitude
    ));
    out.push_str(&format!(
        "--     The kml file provided long: {}, lat: {} as the landing coordinates - hence the manual offset.\n",
        original.longitude, original.latitude
    ));
    out.push_str(
        "--     If more accurate height/color maps are acquired, these values can be adjusted by running the conversion again.\n\n",
    );
    out
}

/// `asset.export('keyframes', {...})` body, one entry per keyframe in record order.
pub fn render_keyframes(conversion: &Conversion, params: &Params) -> String {
    let mut out = String::from("asset.export('keyframes', {\n");
    for keyframe in conversion.corrected() {
        let c = keyframe.coordinate;
        out.push_str(&format!("    ['{}'] = {{\n", format_timestamp(&keyframe.timestamp)));
        out.push_str(&format!("        Type = \"{}\",\n", params.translation_type));
        out.push_str(&format!("        Globe = \"{}\",\n", params.globe));
        out.push_str(&format!("        Longitude = {},\n", c.longitude));
        out.push_str(&format!("        Latitude = {},\n", c.latitude));
        out.push_str(&format!("        Altitude = {},\n", c.altitude));
        out.push_str(&format!("        UseHeightmap = {}\n", params.use_heightmap));
        out.push_str("    },\n");
    }
    out.push_str("})");
    out
}

pub fn render_asset(conversion: &Conversion, params: &Params) -> String {
    let mut out = render_header(conversion, params);
    out.push_str(&render_keyframes(conversion, params));
    out
}
