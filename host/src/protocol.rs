//! line protocol: `<integer sensor value>,<status token>\n`
//!
//! malformed lines are expected noise (boot banners, half-flushed buffers
//! after a reset), so rejection is `None`, not an error.

use crate::domain::Reading;

const SEPARATOR: char = ',';

/// decode one raw line from the device
pub fn parse(line: &[u8]) -> Option<Reading> {
    let text = std::str::from_utf8(line).ok()?;
    parse_str(text)
}

pub fn parse_str(line: &str) -> Option<Reading> {
    let (value, status) = line.trim().split_once(SEPARATOR)?;
    if status.contains(SEPARATOR) {
        return None;
    }
    let sensor_value = value.trim().parse::<i64>().ok()?;
    Some(Reading::new(sensor_value, status.trim()))
}
