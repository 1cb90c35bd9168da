//! Folding progress signals into progress records.
//!
//! `reduce_one` is the live path (one signal against the stored record) and
//! `reduce_all` replays a learner's whole history. Both go through
//! [`ProgressDelta::apply_to`], so for the same arrival order they agree on
//! everything except the bookkeeping timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::extract::ProgressSignal;
use crate::model::{CourseId, LearnerId, ProgressKey, ProgressRecord};

/// Why a signal produced no progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingLearner,
    MissingCourse,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingLearner => f.write_str("no learner identifier"),
            SkipReason::MissingCourse => f.write_str("no course identifier"),
        }
    }
}

/// Merge one signal into the existing record for its key.
///
/// `existing` must belong to the same key; a record for a different key is
/// ignored and a new one is started. Live ingestion performs the same merge
/// atomically through `ProgressRepository::upsert_progress`.
///
/// # Errors
///
/// Returns the `SkipReason` for signals without a learner or course.
pub fn reduce_one(
    signal: &ProgressSignal,
    existing: Option<ProgressRecord>,
    at: DateTime<Utc>,
) -> Result<ProgressRecord, SkipReason> {
    let key = signal.key()?;
    let existing = existing.filter(|record| record.key == key);
    Ok(signal.delta().apply_to(key, existing, at))
}

/// Rebuild a learner's progress from their ordered signals.
///
/// Signals without a course are dropped. Records come back in the order each
/// course first appears in `signals`.
#[must_use]
pub fn reduce_all(
    learner_id: &LearnerId,
    signals: &[ProgressSignal],
    at: DateTime<Utc>,
) -> Vec<ProgressRecord> {
    let mut index: HashMap<CourseId, usize> = HashMap::new();
    let mut records: Vec<ProgressRecord> = Vec::new();

    for signal in signals {
        let Some(course_id) = &signal.course_id else {
            continue;
        };
        let delta = signal.delta();
        let key = ProgressKey::new(learner_id.clone(), course_id.clone());

        match index.get(course_id) {
            Some(&slot) => {
                let current = records[slot].clone();
                records[slot] = delta.apply_to(key, Some(current), at);
            }
            None => {
                index.insert(course_id.clone(), records.len());
                records.push(delta.apply_to(key, None, at));
            }
        }
    }

    records
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
