use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One weather observation, the unit of transfer through every pipeline stage.
///
/// A record is constructed once per fetch and immutable afterwards: it is
/// serialized to exactly one local artifact, uploaded to exactly one staged
/// object, and consumed unchanged by the warehouse load. Records are never
/// updated or deleted; the whole model is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    /// ISO two-letter country code when the provider has one.
    pub country: String,

    /// UTC instant of the fetch, truncated to whole seconds. Authoritative
    /// ordering key and the warehouse partitioning field.
    pub timestamp: DateTime<Utc>,
    /// UTC calendar date of `timestamp`. Redundant projection, kept for the
    /// warehouse schema; must never be sampled independently.
    pub date: NaiveDate,
    /// UTC wall time of `timestamp`. Same rule as `date`.
    pub time: NaiveTime,

    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    pub pressure: u32,

    pub weather: String,
    pub weather_main: String,

    pub wind_speed: f64,
    pub wind_deg: u16,
    pub clouds: u8,

    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,

    pub visibility: u32,

    pub coord_lat: f64,
    pub coord_lon: f64,
}

impl WeatherRecord {
    /// Split a fetch instant into the three temporal fields of a record.
    ///
    /// The instant is truncated to whole seconds (the artifact key has second
    /// precision) and `date`/`time` are derived from the truncated value, so
    /// the three fields can never skew even if the fetch spans a clock tick.
    pub fn temporal_parts(fetched_at: DateTime<Utc>) -> (DateTime<Utc>, NaiveDate, NaiveTime) {
        let timestamp = fetched_at.with_nanosecond(0).unwrap_or(fetched_at);
        (timestamp, timestamp.date_naive(), timestamp.time())
    }

    /// File name of the local artifact for this record.
    ///
    /// Second precision makes the name the idempotency key for storage: two
    /// runs within the same wall-clock second overwrite each other
    /// (last-write-wins, accepted limitation).
    pub fn artifact_basename(&self) -> String {
        format!("weather_{}.json", self.timestamp.format("%Y%m%d_%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> WeatherRecord {
        let (timestamp, date, time) =
            WeatherRecord::temporal_parts(Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 5).unwrap());

        WeatherRecord {
            city: "Paris".to_string(),
            country: "FR".to_string(),
            timestamp,
            date,
            time,
            temperature: 15.2,
            feels_like: 14.1,
            temp_min: 12.0,
            temp_max: 17.3,
            humidity: 60,
            pressure: 1013,
            weather: "clear sky".to_string(),
            weather_main: "Clear".to_string(),
            wind_speed: 3.4,
            wind_deg: 220,
            clouds: 10,
            sunrise: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            sunset: DateTime::from_timestamp(1_700_030_000, 0).unwrap(),
            visibility: 10_000,
            coord_lat: 48.85,
            coord_lon: 2.35,
        }
    }

    #[test]
    fn temporal_parts_are_consistent_projections() {
        let instant = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
            + chrono::Duration::nanoseconds(987_654_321);

        let (timestamp, date, time) = WeatherRecord::temporal_parts(instant);

        assert_eq!(timestamp.nanosecond(), 0);
        assert_eq!(date.and_time(time).and_utc(), timestamp);
    }

    #[test]
    fn artifact_basename_encodes_fetch_second() {
        let record = sample_record();
        assert_eq!(record.artifact_basename(), "weather_20240307_143005.json");
    }

    #[test]
    fn record_json_round_trips_field_identical() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: WeatherRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, record);
    }

    #[test]
    fn record_serializes_to_a_single_line() {
        let json = serde_json::to_string(&sample_record()).unwrap();
        assert!(!json.contains('\n'));
    }
}
