//! Failure reporting for multi-step store operations
//!
//! The store reports each failed step to an injected observer rather than a
//! global logger. The returned error alone doesn't say whether cleanup ran,
//! so the observer gets one call per distinct failure.

use std::fmt;

use tracing::error;
use vdi_core::Error;

/// Step of an add or delete sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreStep {
    Create,
    Write,
    Snapshot,
    DeleteWorkingVolume,
    DeleteSnapshot,
}

impl StoreStep {
    /// Operator-facing message for a failure at this step
    pub fn message(&self) -> &'static str {
        match self {
            StoreStep::Create | StoreStep::Write | StoreStep::Snapshot => "Error in create image",
            StoreStep::DeleteWorkingVolume => "Error in delete image",
            StoreStep::DeleteSnapshot => "Error in delete snapshot image",
        }
    }
}

impl fmt::Display for StoreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreStep::Create => "create",
            StoreStep::Write => "write",
            StoreStep::Snapshot => "snapshot",
            StoreStep::DeleteWorkingVolume => "delete working volume",
            StoreStep::DeleteSnapshot => "delete snapshot",
        };
        f.write_str(name)
    }
}

/// Receives failures from the store
pub trait StoreObserver: Send + Sync {
    /// `step` failed for `image_id`
    fn step_failed(&self, image_id: &str, step: StoreStep, error: &Error);

    /// Deleting the volume after `step` failed also failed
    fn cleanup_failed(&self, image_id: &str, step: StoreStep, error: &Error);
}

/// Observer that logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StoreObserver for TracingObserver {
    fn step_failed(&self, image_id: &str, step: StoreStep, err: &Error) {
        error!(image_id, %step, error = %err, "{}", step.message());
    }

    fn cleanup_failed(&self, image_id: &str, step: StoreStep, err: &Error) {
        error!(
            image_id,
            %step,
            error = %err,
            "Error in cleanup of image after failed {}",
            step
        );
    }
}
