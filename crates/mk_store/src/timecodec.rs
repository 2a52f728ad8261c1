//! Fixed-width 15-byte timestamp codec.
//!
//! Byte-compatible with Go's `time.Time.MarshalBinary` version-1
//! encoding, which existing macaroon databases use on disk:
//!
//!   [ version (1 byte, = 1) |
//!     seconds since 0001-01-01 00:00:00 UTC (8 bytes, BE i64) |
//!     nanoseconds (4 bytes, BE i32) |
//!     zone offset in minutes (2 bytes, BE i16, -1 = UTC) ]
//!
//! The seconds field is absolute; the zone offset only affects
//! display, so decoding normalizes every timestamp to UTC.

use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Length of a marshaled timestamp.
pub(crate) const TIME_MARSHAL_LEN: usize = 15;

const TIME_VERSION: u8 = 1;

/// Seconds between 0001-01-01 and the Unix epoch.
const UNIX_TO_ABSOLUTE: i64 = 62_135_596_800;

/// Zone-offset sentinel marking a UTC timestamp.
const UTC_OFFSET_SENTINEL: i16 = -1;

pub(crate) fn marshal(t: DateTime<Utc>) -> [u8; TIME_MARSHAL_LEN] {
    let sec = t.timestamp() + UNIX_TO_ABSOLUTE;
    let nsec = t.timestamp_subsec_nanos() as i32;

    let mut out = [0u8; TIME_MARSHAL_LEN];
    out[0] = TIME_VERSION;
    out[1..9].copy_from_slice(&sec.to_be_bytes());
    out[9..13].copy_from_slice(&nsec.to_be_bytes());
    out[13..15].copy_from_slice(&UTC_OFFSET_SENTINEL.to_be_bytes());
    out
}

pub(crate) fn unmarshal(data: &[u8]) -> Result<DateTime<Utc>, StoreError> {
    if data.len() != TIME_MARSHAL_LEN || data[0] != TIME_VERSION {
        return Err(StoreError::Malformed);
    }

    let sec = i64::from_be_bytes([
        data[1], data[2], data[3], data[4], data[5], data[6], data[7], data[8],
    ]);
    let nsec = i32::from_be_bytes([data[9], data[10], data[11], data[12]]);
    if !(0..1_000_000_000).contains(&nsec) {
        return Err(StoreError::Malformed);
    }
    // Bytes 13..15 carry the zone offset; any value is accepted since
    // the seconds field is already absolute.

    let unix = sec.checked_sub(UNIX_TO_ABSOLUTE).ok_or(StoreError::Malformed)?;
    DateTime::<Utc>::from_timestamp(unix, nsec as u32).ok_or(StoreError::Malformed)
}
