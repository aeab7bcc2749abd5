//! Opaque base64 pagination cursors (C10, §4.11).
//!
//! Grounded on the teacher's `common/pagination.rs` `Cursor` codec (base64 URL-safe,
//! no padding), generalized to the spec's `(timestamp_ns, uuid[, uuid])` payload.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub timestamp_nanos: i64,
    pub primary_id: Uuid,
    pub secondary_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("invalid base64")]
    Base64,
    #[error("invalid utf-8")]
    Utf8,
    #[error("wrong number of parts: expected 2 or 3, got {0}")]
    PartCount(usize),
    #[error("invalid timestamp")]
    Timestamp,
    #[error("invalid uuid")]
    Uuid,
}

impl Cursor {
    pub fn single(timestamp: DateTime<Utc>, primary_id: Uuid) -> Self {
        Self {
            timestamp_nanos: timestamp.timestamp_nanos_opt().unwrap_or_default(),
            primary_id,
            secondary_id: None,
        }
    }

    pub fn double(timestamp: DateTime<Utc>, primary_id: Uuid, secondary_id: Uuid) -> Self {
        Self {
            timestamp_nanos: timestamp.timestamp_nanos_opt().unwrap_or_default(),
            primary_id,
            secondary_id: Some(secondary_id),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }

    pub fn encode(&self) -> String {
        let mut parts = vec![self.timestamp_nanos.to_string(), self.primary_id.to_string()];
        if let Some(secondary) = self.secondary_id {
            parts.push(secondary.to_string());
        }
        URL_SAFE_NO_PAD.encode(parts.join(".").as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CursorError::Base64)?;
        let text = String::from_utf8(bytes).map_err(|_| CursorError::Utf8)?;
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(CursorError::PartCount(parts.len()));
        }
        let timestamp_nanos = parts[0].parse::<i64>().map_err(|_| CursorError::Timestamp)?;
        let primary_id = Uuid::parse_str(parts[1]).map_err(|_| CursorError::Uuid)?;
        let secondary_id = if parts.len() == 3 {
            Some(Uuid::parse_str(parts[2]).map_err(|_| CursorError::Uuid)?)
        } else {
            None
        };
        Ok(Self {
            timestamp_nanos,
            primary_id,
            secondary_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single() {
        let c = Cursor::single(Utc::now(), Uuid::new_v4());
        assert_eq!(Cursor::decode(&c.encode()).unwrap(), c);
    }

    #[test]
    fn round_trips_double() {
        let c = Cursor::double(Utc::now(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(Cursor::decode(&c.encode()).unwrap(), c);
    }

    #[test]
    fn timestamp_recovers_the_original_instant() {
        let now = Utc::now();
        let c = Cursor::single(now, Uuid::new_v4());
        assert_eq!(c.timestamp().timestamp_nanos_opt(), now.timestamp_nanos_opt());
    }

    #[test]
    fn rejects_malformed_base64() {
        assert_eq!(Cursor::decode("not valid base64!!"), Err(CursorError::Base64));
    }

    #[test]
    fn rejects_wrong_part_count() {
        let token = URL_SAFE_NO_PAD.encode(b"only-one-part");
        assert!(matches!(
            Cursor::decode(&token),
            Err(CursorError::PartCount(1))
        ));
    }

    #[test]
    fn rejects_bad_uuid() {
        let token = URL_SAFE_NO_PAD.encode(b"123.not-a-uuid");
        assert_eq!(Cursor::decode(&token), Err(CursorError::Uuid));
    }
}
