use chrono::{DateTime, Local, Utc};

use crate::condition::ConditionKind;
use crate::feed::PointValue;

/// Creation instant of an event, pre-rendered in the two forms downstream
/// message composition needs: a reader-local string and the archiver's UTC
/// format.
#[derive(Debug, Clone)]
pub struct Timestamp {
    utc: DateTime<Utc>,
    local_str: String,
    utc_str: String,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(utc: DateTime<Utc>) -> Self {
        Self {
            local_str: utc
                .with_timezone(&Local)
                .format("%a, %d %b %Y %H:%M:%S %Z")
                .to_string(),
            utc_str: utc.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            utc,
        }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.utc
    }

    pub fn local_str(&self) -> &str {
        &self.local_str
    }

    pub fn utc_str(&self) -> &str {
        &self.utc_str
    }
}

/// Record produced when an entry's condition fires. Built once by the entry
/// and cloned into each consumer queue; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AlarmEvent {
    pub point: String,
    pub condition: ConditionKind,
    /// Human-readable description of the range the value was expected in.
    pub specified_range: String,
    pub unit: String,
    pub subject: String,
    pub recipients: Vec<String>,
    pub warning: String,
    pub value_measured: String,
    pub timestamp: Timestamp,
}

/// Render a measured value for inclusion in notifications: floats to four
/// significant digits, everything else verbatim.
pub(crate) fn format_measured(value: &PointValue) -> String {
    match value {
        PointValue::Float(v) => format_significant(*v, 4),
        PointValue::Int(v) => v.to_string(),
        PointValue::Text(v) => v.clone(),
    }
}

fn format_significant(value: f64, digits: i32) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;
    format!("{:.*}", decimals, value)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::feed::PointValue;

    use super::{format_measured, Timestamp};

    #[test]
    fn floats_render_with_four_significant_digits() {
        assert_eq!(format_measured(&PointValue::Float(0.123_456_7)), "0.1235");
        assert_eq!(format_measured(&PointValue::Float(1.234_567)), "1.235");
        assert_eq!(format_measured(&PointValue::Float(-27.345_9)), "-27.35");
        assert_eq!(format_measured(&PointValue::Float(123_456.7)), "123457");
    }

    #[test]
    fn non_floats_render_verbatim() {
        assert_eq!(format_measured(&PointValue::Int(42)), "42");
        assert_eq!(
            format_measured(&PointValue::Text("OFF".to_string())),
            "OFF"
        );
    }

    #[test]
    fn timestamp_renders_archiver_format() {
        let instant = Utc.with_ymd_and_hms(2021, 11, 5, 17, 51, 28).unwrap();
        let timestamp = Timestamp::from_datetime(instant);
        assert_eq!(timestamp.utc_str(), "2021-11-05T17:51:28.000");
        assert_eq!(timestamp.utc(), instant);
        assert!(!timestamp.local_str().is_empty());
    }
}
