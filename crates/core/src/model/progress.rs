use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::ProgressKey;

/// Highest score a progress record can hold.
pub const MAX_SCORE: u8 = 100;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("score {0} is out of range 0..=100")]
    ScoreOutOfRange(i64),

    #[error("invalid progress status: {0}")]
    InvalidStatus(String),

    #[error("updated_at is before created_at")]
    InvalidTimeRange,
}

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    InProgress,
    Completed,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            other => Err(ProgressError::InvalidStatus(other.to_owned())),
        }
    }
}

//
// ─── RECORD ───────────────────────────────────────────────────────────────────
//

/// Denormalized per-learner, per-course progress summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(flatten)]
    pub key: ProgressKey,
    pub status: ProgressStatus,
    pub score: Option<u8>,
    pub success: Option<bool>,
    pub last_event_time: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// A fresh record with no signal applied yet.
    #[must_use]
    pub fn empty(key: ProgressKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            status: ProgressStatus::InProgress,
            score: None,
            success: None,
            last_event_time: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ScoreOutOfRange` for scores outside 0..=100 and
    /// `ProgressError::InvalidTimeRange` if `updated_at` precedes `created_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        key: ProgressKey,
        status: ProgressStatus,
        score: Option<i64>,
        success: Option<bool>,
        last_event_time: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if updated_at < created_at {
            return Err(ProgressError::InvalidTimeRange);
        }
        let score = score
            .map(|raw| match u8::try_from(raw) {
                Ok(value) if value <= MAX_SCORE => Ok(value),
                _ => Err(ProgressError::ScoreOutOfRange(raw)),
            })
            .transpose()?;

        Ok(Self {
            key,
            status,
            score,
            success,
            last_event_time,
            created_at,
            updated_at,
        })
    }

    /// The parts of the record that are derived from statements, leaving out
    /// bookkeeping timestamps.
    #[must_use]
    pub fn derived_view(&self) -> (ProgressStatus, Option<u8>, Option<bool>, Option<&str>) {
        (
            self.status,
            self.score,
            self.success,
            self.last_event_time.as_deref(),
        )
    }
}

//
// ─── DELTA ────────────────────────────────────────────────────────────────────
//

/// The change one statement makes to a progress record.
///
/// Fields set to `None` leave the stored value untouched. `completed` only
/// ever moves a record to `Completed`; once completed a record stays completed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressDelta {
    pub completed: bool,
    pub score: Option<u8>,
    pub success: Option<bool>,
    pub event_time: Option<String>,
}

impl ProgressDelta {
    /// Status a brand-new record takes when this delta creates it.
    #[must_use]
    pub fn insert_status(&self) -> ProgressStatus {
        if self.completed {
            ProgressStatus::Completed
        } else {
            ProgressStatus::InProgress
        }
    }

    /// Merge this delta into `existing`, creating the record when absent.
    ///
    /// Storage adapters call this while holding whatever lock makes the
    /// read-modify-write atomic for `key`.
    #[must_use]
    pub fn apply_to(
        &self,
        key: ProgressKey,
        existing: Option<ProgressRecord>,
        at: DateTime<Utc>,
    ) -> ProgressRecord {
        let mut record = existing.unwrap_or_else(|| ProgressRecord::empty(key, at));

        if self.completed {
            record.status = ProgressStatus::Completed;
        }
        if let Some(score) = self.score {
            record.score = Some(score);
        }
        if let Some(success) = self.success {
            record.success = Some(success);
        }
        if let Some(event_time) = &self.event_time {
            record.last_event_time = Some(event_time.clone());
        }
        record.updated_at = at;
        record
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
