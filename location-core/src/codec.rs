//! Wire codec for location pings.
//!
//! A ping is a MessagePack map `{v: string, t: int64, d: uint32, m: uint32}`:
//! `v` is the vehicle id, `t` the timestamp in milliseconds, and `d`/`m` hold
//! the packed coordinate.
//!
//! `d` combines two bias indices, `d = lat_index * 361 + lon_index`. A bias index
//! folds a signed whole-degree magnitude into `[0, 2a]` (`a` = 90 for latitude,
//! 180 for longitude). `m` packs the sub-degree parts as milli-arcminutes:
//! latitude in bits 16-31, longitude in bits 0-15.
use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, RangeError, ValidationError};
use crate::types::{LocationEvent, Point};

/// Number of valid longitude bias indices, `2 * 180 + 1`.
const LON_INDICES: u32 = 361;
const LAT_BIAS: u32 = 90;
const LON_BIAS: u32 = 180;

/// A map with 4 entries, key "v", then an 8 character string starting with 'e'.
pub const RECORD_HEADER: [u8; 5] = [0x84, 0xA1, b'v', 0xA8, b'e'];

#[derive(Debug, Deserialize, Serialize)]
struct WireRecord {
    v: String,
    t: i64,
    d: u32,
    m: u32,
}

/// Check the fixed record header without deserializing the buffer.
pub fn has_valid_header(buffer: &[u8]) -> bool {
    buffer.starts_with(&RECORD_HEADER)
}

/// Validate a raw ingest buffer and decode it into a LocationEvent.
pub fn validate_and_decode(buffer: &[u8]) -> Result<LocationEvent, ValidationError> {
    if !has_valid_header(buffer) {
        return Err(ValidationError::MalformedHeader);
    }

    let record: WireRecord = rmp_serde::from_slice(buffer)?;

    if record.v.is_empty() {
        return Err(ValidationError::MissingVehicleId);
    }
    // Staleness is checked on insert.
    if record.t == 0 {
        return Err(ValidationError::MissingTimestamp);
    }

    let point = decode(record.d, record.m)?;

    Ok(LocationEvent {
        vehicle_id: record.v,
        timestamp_ms: record.t,
        point,
    })
}

/// Encode a ping into its wire representation.
pub fn encode_event(
    vehicle_id: &str,
    timestamp_ms: i64,
    lat: f64,
    lon: f64,
) -> Result<Vec<u8>, EncodeError> {
    let (d, m) = encode(lat, lon)?;
    let record = WireRecord {
        v: vehicle_id.to_owned(),
        t: timestamp_ms,
        d,
        m,
    };

    Ok(rmp_serde::to_vec_named(&record)?)
}

/// Decode the packed degree and sub-degree fields into a point.
pub fn decode(packed_degrees: u32, packed_subdegrees: u32) -> Result<Point, RangeError> {
    let lat_fraction = milli_arcminutes_to_degrees((packed_subdegrees >> 16) & 0xFFFF);
    let lon_fraction = milli_arcminutes_to_degrees(packed_subdegrees & 0xFFFF);

    let lat = unbias(packed_degrees / LON_INDICES, lat_fraction, LAT_BIAS)?;
    let lon = unbias(packed_degrees % LON_INDICES, lon_fraction, LON_BIAS)?;

    check_range(lat, lon)?;

    Ok(Point { lon, lat })
}

/// Pack a latitude/longitude pair. Inverse of `decode`, to the nearest milli-arcminute.
pub fn encode(lat: f64, lon: f64) -> Result<(u32, u32), RangeError> {
    check_range(lat, lon)?;

    let (lat_index, lat_millis) = bias(lat, LAT_BIAS);
    let (lon_index, lon_millis) = bias(lon, LON_BIAS);

    let packed_degrees = lat_index * LON_INDICES + lon_index;
    let packed_subdegrees = (lat_millis << 16) | lon_millis;

    // Rounding to milli-arcminutes can land on a point decode refuses, e.g. (1e-7, 1e-7) on (0, 0).
    decode(packed_degrees, packed_subdegrees)?;

    Ok((packed_degrees, packed_subdegrees))
}

/// Recover a signed degree value from its bias index and fractional part.
pub fn unbias(index: u32, fraction: f64, a: u32) -> Result<f64, RangeError> {
    if index < a {
        Ok(f64::from(index + 1) - fraction)
    } else if index <= 2 * a {
        let magnitude = f64::from(index - a) - fraction;
        // Leave an exact zero alone so we never produce -0.0.
        if magnitude != 0.0 {
            Ok(-magnitude)
        } else {
            Ok(magnitude)
        }
    } else {
        Err(RangeError::IndexOutOfRange {
            index,
            max: 2 * a,
        })
    }
}

fn bias(value: f64, a: u32) -> (u32, u32) {
    let whole = value.abs().ceil();
    let fraction = whole - value.abs();
    let millis = (fraction * 60_000.0).round() as u32;

    if value > 0.0 {
        (whole as u32 - 1, millis)
    } else {
        (a + whole as u32, millis)
    }
}

fn milli_arcminutes_to_degrees(millis: u32) -> f64 {
    f64::from(millis) / 1000.0 / 60.0
}

fn check_range(lat: f64, lon: f64) -> Result<(), RangeError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(RangeError::Latitude(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(RangeError::Longitude(lon));
    }
    if lat == 0.0 && lon == 0.0 {
        return Err(RangeError::NullIsland);
    }
    Ok(())
}
