use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to a raw event by the store on insertion.
/// Identifiers are strictly increasing, so the highest one seen in a pass can act as a watermark.
pub type EventId = u64;

/// A geographic point. Serialized longitude first, GeoJSON style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<(f64, f64)> for Point {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

impl From<Point> for (f64, f64) {
    fn from(point: Point) -> Self {
        (point.lon, point.lat)
    }
}

/// A single validated ping, as accepted by the ingest path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub vehicle_id: String,
    pub timestamp_ms: i64,
    pub point: Point,
}

impl LocationEvent {
    pub fn new(vehicle_id: &str, timestamp_ms: i64, point: Point) -> Self {
        Self {
            vehicle_id: vehicle_id.to_owned(),
            timestamp_ms,
            point,
        }
    }
}

/// A LocationEvent as held by the raw log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: EventId,
    pub event: LocationEvent,
}

/// All pending samples of one vehicle, ordered by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleBatch {
    pub vehicle_id: String,
    pub start_time: i64,
    pub end_time: i64,
    pub timestamps: Vec<i64>,
    pub coordinates: Vec<Point>,
    pub max_source_id: EventId,
}

impl VehicleBatch {
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LineString {
    LineString { coordinates: Vec<Point> },
}

/// A consolidated, bounded run of samples for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationHistory {
    pub id: Uuid,
    pub vehicle_id: String,
    pub count: usize,
    pub start_time: i64,
    pub end_time: i64,
    pub timestamps: Vec<i64>,
    #[serde(rename = "line_string", with = "line_string")]
    pub coordinates: Vec<Point>,
}

impl LocationHistory {
    /// Build a new record from a run of samples. The run must not be empty.
    pub fn from_samples(vehicle_id: &str, timestamps: &[i64], coordinates: &[Point]) -> Self {
        debug_assert_eq!(timestamps.len(), coordinates.len());
        debug_assert!(!timestamps.is_empty());

        Self {
            id: Uuid::now_v7(),
            vehicle_id: vehicle_id.to_owned(),
            count: timestamps.len(),
            start_time: timestamps.first().copied().unwrap_or_default(),
            end_time: timestamps.last().copied().unwrap_or_default(),
            timestamps: timestamps.to_vec(),
            coordinates: coordinates.to_vec(),
        }
    }

    /// Append samples at the end of this record.
    pub fn extend(&mut self, timestamps: &[i64], coordinates: &[Point]) {
        if let Some(last) = timestamps.last() {
            self.end_time = *last;
        }
        self.timestamps.extend_from_slice(timestamps);
        self.coordinates.extend_from_slice(coordinates);
        self.count = self.timestamps.len();
    }
}

mod line_string {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{LineString, Point};

    pub fn serialize<S: Serializer>(coordinates: &[Point], serializer: S) -> Result<S::Ok, S::Error> {
        LineString::LineString {
            coordinates: coordinates.to_vec(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Point>, D::Error> {
        let LineString::LineString { coordinates } = LineString::deserialize(deserializer)?;
        Ok(coordinates)
    }
}
