//! Fences and semaphores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Orders two submissions on the GPU. Invisible to the CPU.
///
/// Only the final submission of a frame carries semaphores, taken from the
/// [`PresentTarget`](crate::graph::PresentTarget).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Semaphore {
    id: u64,
}

impl Semaphore {
    /// Wrap a device-assigned id, see
    /// [`Device::create_semaphore`](crate::backend::Device::create_semaphore).
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Whether the submission behind a [`Fence`] has retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Unsignaled,
    Signaled,
}

/// Signaled by the device once a submission has retired.
///
/// Every derealization entry of the frame graph waits on one fence. Clones
/// observe the same signal, so the caller can keep a copy of the present
/// fence while the graph holds another.
#[derive(Debug, Clone)]
pub struct Fence {
    signaled: Arc<AtomicBool>,
}

impl Fence {
    pub fn new_unsignaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_signaled() -> Self {
        let fence = Self::new_unsignaled();
        fence.signal();
        fence
    }

    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Non-blocking poll.
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Spin until signaled.
    ///
    /// Only useful when another thread signals. Use
    /// [`Device::wait_fence`](crate::backend::Device::wait_fence) to wait for
    /// a submission, it lets the device retire work while waiting.
    pub fn wait(&self) {
        while !self.is_signaled() {
            std::hint::spin_loop();
        }
    }

    /// Back to unsignaled. No submission may still reference the fence.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Called by the device when the submission retires.
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    /// Whether both handles observe the same signal.
    pub fn same_as(&self, other: &Fence) -> bool {
        Arc::ptr_eq(&self.signaled, &other.signaled)
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new_unsignaled()
    }
}
