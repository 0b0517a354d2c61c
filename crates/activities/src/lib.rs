//! `activities` crate — the `UploadActivity` trait and its implementations.
//!
//! Activities are the slow, external side of the system: generating the
//! packet universe, uploading a group's batch once its quorum is reached, and
//! invoking third-party services that report results back. The engine crate
//! dispatches to them through the [`UploadActivity`] trait object.

pub mod error;
pub mod types;
pub mod traits;
pub mod mock;
pub mod uploader;

pub use error::ActivityError;
pub use types::{ActivityContext, Packet};
pub use traits::{ResultSink, UploadActivity};
