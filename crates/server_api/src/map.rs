//! Map marker rendering for open nets.
//!
//! Coordinates are stored as free text. Extraction is best effort: the first
//! two signed decimals found in the text are read as latitude and longitude,
//! and a net without two such numbers gets no marker.

use std::sync::OnceLock;

use regex::Regex;
use shared::protocol::{MapMarker, NetSummary};

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // ASCII digits only; `\d` would also match other Unicode digit classes.
    PATTERN.get_or_init(|| Regex::new(r"-?[0-9]+(?:\.[0-9]+)?").expect("static pattern"))
}

pub fn parse_coordinates(text: &str) -> Option<(f64, f64)> {
    let mut numbers = decimal_pattern().find_iter(text);
    let lat = numbers.next()?.as_str().parse::<f64>().ok()?;
    let lng = numbers.next()?.as_str().parse::<f64>().ok()?;
    (lat.is_finite() && lng.is_finite()).then_some((lat, lng))
}

pub fn marker_info(net: &NetSummary) -> String {
    format!(
        "<b>Netz ID: {}</b><br>Größe: {}<br>Status: {}",
        net.net_id, net.estimated_size, net.status
    )
}

pub fn marker_for(net: &NetSummary) -> Option<MapMarker> {
    let (lat, lng) = parse_coordinates(&net.gps_coordinates)?;
    Some(MapMarker {
        lat,
        lng,
        info: marker_info(net),
    })
}

pub fn map_markers(nets: &[NetSummary]) -> Vec<MapMarker> {
    nets.iter().filter_map(marker_for).collect()
}

#[cfg(test)]
#[path = "tests/map_tests.rs"]
mod tests;
