//! Submission synchronization.
//!
//! The frame graph submits one command buffer per timeline step. Ordering on
//! the GPU is expressed with [`Semaphore`]s (only the final, presenting step
//! uses them) and CPU-visible completion with [`Fence`]s, which gate the
//! deferred release of transient resources.

mod sync;

pub use sync::{Fence, FenceStatus, Semaphore};

/// Semaphores and fence attached to a single queue submission.
#[derive(Debug, Default, Clone)]
pub struct SubmitInfo {
    /// Semaphores the submission waits on before executing.
    pub wait_semaphores: Vec<Semaphore>,
    /// Semaphores signaled when the submission completes.
    pub signal_semaphores: Vec<Semaphore>,
    /// Fence signaled when the submission completes.
    pub fence: Option<Fence>,
}

impl SubmitInfo {
    /// A submission that only signals `fence`.
    pub fn with_fence(fence: Fence) -> Self {
        Self {
            fence: Some(fence),
            ..Self::default()
        }
    }
}
