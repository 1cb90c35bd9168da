//! Reads progress signals out of loosely structured statements.
//!
//! Every accessor here walks the JSON with `Value::get`/`Value::pointer`, so a
//! missing or mistyped field simply yields `None`. Nothing in this module can
//! fail.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{CourseId, LearnerId, MAX_SCORE, ProgressDelta, ProgressKey, Statement};
use crate::reduce::SkipReason;

/// Substring of the verb text that marks a statement as completing a course.
pub const COMPLETED_MARKER: &str = "completed";

/// Language used when reading a verb's display map.
pub const DISPLAY_LANGUAGE: &str = "en-US";

/// Actor fields that may carry the learner identity, in priority order.
const LEARNER_POINTERS: [&str; 3] = ["/account/name", "/mbox", "/openid"];

/// Normalized view of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSignal {
    pub learner_id: Option<LearnerId>,
    pub course_id: Option<CourseId>,
    pub score: Option<u8>,
    pub success: Option<bool>,
    pub completed: bool,
    pub event_time: Option<String>,
}

impl ProgressSignal {
    /// The record this signal belongs to.
    ///
    /// # Errors
    ///
    /// Returns the `SkipReason` when either half of the key is missing.
    pub fn key(&self) -> Result<ProgressKey, SkipReason> {
        let learner_id = self.learner_id.clone().ok_or(SkipReason::MissingLearner)?;
        let course_id = self.course_id.clone().ok_or(SkipReason::MissingCourse)?;
        Ok(ProgressKey::new(learner_id, course_id))
    }

    #[must_use]
    pub fn delta(&self) -> ProgressDelta {
        ProgressDelta {
            completed: self.completed,
            score: self.score,
            success: self.success,
            event_time: self.event_time.clone(),
        }
    }
}

/// Derive the progress signal carried by `statement`.
#[must_use]
pub fn extract(statement: &Statement) -> ProgressSignal {
    let result = statement.result.as_ref().filter(|r| r.is_object());

    ProgressSignal {
        learner_id: learner_id(&statement.actor),
        course_id: course_id(&statement.object),
        score: result.and_then(score),
        success: result.and_then(success),
        completed: result.is_some_and(completion) || verb_completes(&statement.verb),
        event_time: statement.timestamp.clone(),
    }
}

/// First non-empty identifier among account name, mailbox and `OpenID`.
#[must_use]
pub fn learner_id(actor: &Value) -> Option<LearnerId> {
    LEARNER_POINTERS
        .iter()
        .filter_map(|pointer| actor.pointer(pointer).and_then(Value::as_str))
        .find(|id| !id.is_empty())
        .map(LearnerId::new)
}

/// Last `/`-separated segment of the object id.
#[must_use]
pub fn course_id(object: &Value) -> Option<CourseId> {
    let id = object.get("id").and_then(Value::as_str)?;
    id.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(CourseId::new)
}

/// Percentage score from `score.scaled`.
///
/// Ties round half away from zero (`0.125` gives `13`), and the result is
/// clamped into 0..=100 since `scaled` may legally be negative.
#[must_use]
pub fn score(result: &Value) -> Option<u8> {
    let scaled = result.pointer("/score/scaled").and_then(Value::as_f64)?;
    if !scaled.is_finite() {
        return None;
    }
    let percent = (scaled * 100.0).round().clamp(0.0, f64::from(MAX_SCORE));

    // In range 0..=100 after the clamp.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = percent as u8;
    Some(percent)
}

/// The `success` flag, present only when the key is.
#[must_use]
pub fn success(result: &Value) -> Option<bool> {
    result.get("success").map(truthy)
}

fn completion(result: &Value) -> bool {
    result.get("completion").is_some_and(truthy)
}

/// Display text in [`DISPLAY_LANGUAGE`], falling back to the verb id.
#[must_use]
pub fn verb_text(verb: &Value) -> Option<&str> {
    verb.get("display")
        .and_then(|display| display.get(DISPLAY_LANGUAGE))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .or_else(|| verb.get("id").and_then(Value::as_str))
}

fn verb_completes(verb: &Value) -> bool {
    verb_text(verb).is_some_and(|text| text.contains(COMPLETED_MARKER))
}

/// Loose truthiness used for client-supplied flags.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
