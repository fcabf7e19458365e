//! `benchops-core`: shared building blocks.
//!
//! Identifiers, the error model and the wall-clock abstraction used by every
//! other crate in the workspace. No I/O lives here.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use id::JobId;
