//! `MockUploadActivity` — a test double for `UploadActivity`.
//!
//! Useful in unit and integration tests where a real upload backend is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::traits::UploadActivity;
use crate::types::{ActivityContext, Packet};
use crate::ActivityError;

/// Behaviour injected into `MockUploadActivity` at construction time.
pub enum MockBehaviour {
    /// Return a `"uploaded …"` summary line.
    Succeed,
    /// Fail every call with a `Retryable` error.
    FailRetryable(String),
    /// Fail every call with a `Fatal` error.
    FailFatal(String),
    /// Fail the first `failures` calls with a `Retryable` error, then succeed.
    Flaky { failures: usize, message: String },
}

/// A mock activity that records every upload it receives and returns a
/// programmer-specified result.
pub struct MockUploadActivity {
    /// What `generate_packets` returns.
    pub universe: Vec<Packet>,
    /// What the activity will do when `upload_batch` is called.
    pub behaviour: MockBehaviour,
    /// All `(group_key, batch)` pairs seen by this activity (in call order).
    pub uploads: Arc<Mutex<Vec<(u32, Vec<Packet>)>>>,
}

impl MockUploadActivity {
    /// Create a mock whose uploads always succeed.
    pub fn succeeding(universe: Vec<Packet>) -> Self {
        Self {
            universe,
            behaviour: MockBehaviour::Succeed,
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose uploads always fail with a `Fatal` error.
    pub fn failing_fatal(universe: Vec<Packet>, msg: impl Into<String>) -> Self {
        Self {
            universe,
            behaviour: MockBehaviour::FailFatal(msg.into()),
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose uploads always fail with a `Retryable` error.
    pub fn failing_retryable(universe: Vec<Packet>, msg: impl Into<String>) -> Self {
        Self {
            universe,
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose first `failures` uploads fail retryably.
    pub fn flaky(universe: Vec<Packet>, failures: usize) -> Self {
        Self {
            universe,
            behaviour: MockBehaviour::Flaky {
                failures,
                message: "transient upload failure".into(),
            },
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times `upload_batch` has been invoked.
    pub fn call_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Group keys in upload-invocation order.
    pub fn uploaded_keys(&self) -> Vec<u32> {
        self.uploads.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

#[async_trait]
impl UploadActivity for MockUploadActivity {
    async fn generate_packets(
        &self,
        _ctx: &ActivityContext,
    ) -> Result<Vec<Packet>, ActivityError> {
        Ok(self.universe.clone())
    }

    async fn upload_batch(
        &self,
        group_key: u32,
        batch: Vec<Packet>,
        _ctx: &ActivityContext,
    ) -> Result<String, ActivityError> {
        let attempt = {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push((group_key, batch.clone()));
            uploads.len()
        };

        match &self.behaviour {
            MockBehaviour::Succeed => Ok(format!(
                "uploaded {} packets for group {}",
                batch.len(),
                group_key
            )),
            MockBehaviour::FailRetryable(msg) => Err(ActivityError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(ActivityError::Fatal(msg.clone())),
            MockBehaviour::Flaky { failures, message } => {
                if attempt <= *failures {
                    Err(ActivityError::Retryable(message.clone()))
                } else {
                    Ok(format!(
                        "uploaded {} packets for group {}",
                        batch.len(),
                        group_key
                    ))
                }
            }
        }
    }
}
