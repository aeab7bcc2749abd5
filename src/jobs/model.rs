//! The `_job_` row shape (§3.2, §4.9).
//!
//! Grounded on the teacher's `kernel/jobs/job.rs` `Job` struct (a `TypedBuilder` over
//! every persisted column, plus a `FromRow`-style mapping), trimmed to the three job
//! kinds this system actually has.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// One per committed mutation; payload is the row (or deleted row, or
    /// `{prop:value}`, or selectors+parameters for clear).
    Notification,
    /// User-raised; compressible by `(type, key, resource, resource_id)`.
    Event,
    /// User-raised; never compressed.
    QueuedEvent,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Notification => "notification",
            JobKind::Event => "event",
            JobKind::QueuedEvent => "queued-event",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown job kind: {0}")]
pub struct ParseJobKindError(String);

impl std::str::FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notification" => Ok(JobKind::Notification),
            "event" => Ok(JobKind::Event),
            "queued-event" => Ok(JobKind::QueuedEvent),
            other => Err(ParseJobKindError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct Job {
    #[builder(default)]
    pub serial: i64,
    pub job: JobKind,
    #[builder(default)]
    pub r#type: String,
    #[builder(default)]
    pub key: String,
    #[builder(default)]
    pub resource: String,
    #[builder(default)]
    pub resource_id: Option<Uuid>,
    pub payload: Value,
    #[builder(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[builder(default = 4)]
    pub attempts_left: i32,
    #[builder(default = Value::Object(Default::default()))]
    pub context: Value,
    #[builder(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Map a `_job_` row fetched with `SELECT *` onto a [`Job`]. A malformed `job`
    /// column (shouldn't happen outside manual DB surgery) is treated as a storage
    /// error by the caller.
    pub fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let kind_str: String = row.try_get("job")?;
        let job = kind_str
            .parse::<JobKind>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            serial: row.try_get("serial")?,
            job,
            r#type: row.try_get("type")?,
            key: row.try_get("key")?,
            resource: row.try_get("resource")?,
            resource_id: row.try_get("resource_id")?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("timestamp")?,
            attempts_left: row.try_get("attempts_left")?,
            context: row.try_get("context")?,
            scheduled_at: row.try_get("scheduled_at")?,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.attempts_left <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_round_trips_through_str() {
        for kind in [JobKind::Notification, JobKind::Event, JobKind::QueuedEvent] {
            let s = kind.as_str();
            assert_eq!(s.parse::<JobKind>().unwrap().as_str(), s);
        }
    }

    #[test]
    fn builder_defaults_attempts_left_to_four() {
        let job = Job::builder()
            .job(JobKind::Event)
            .payload(serde_json::json!({}))
            .build();
        assert_eq!(job.attempts_left, 4);
        assert!(!job.is_terminal());
    }

    #[test]
    fn zero_attempts_left_is_terminal() {
        let job = Job::builder()
            .job(JobKind::Event)
            .payload(serde_json::json!({}))
            .attempts_left(0)
            .build();
        assert!(job.is_terminal());
    }
}
