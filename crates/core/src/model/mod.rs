mod ids;
mod progress;
mod statement;

pub use ids::{CourseId, LearnerId, ParseIdError, ProgressKey};
pub use progress::{MAX_SCORE, ProgressDelta, ProgressError, ProgressRecord, ProgressStatus};
pub use statement::{Statement, StatementError};
