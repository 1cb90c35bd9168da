#![forbid(unsafe_code)]

pub mod extract;
pub mod model;
pub mod reduce;
pub mod time;

pub use extract::{ProgressSignal, extract};
pub use reduce::{SkipReason, reduce_all, reduce_one};
pub use time::Clock;
