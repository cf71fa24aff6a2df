//! # Lilium Graphics
//!
//! Frame graph compiler and executor for the Lilium renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameGraph`] - Per-frame declarative description of GPU passes and the
//!   textures and buffers they create, read and write
//! - [`Device`] - Trait the frame graph drives GPU work through
//! - [`DummyDevice`] - Recording device for tests and headless tooling
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lilium_graphics::{DummyDevice, FrameGraph};
//!
//! let mut graph = FrameGraph::new(Arc::new(DummyDevice::new()));
//! // Declare passes...
//! graph.compile();
//! graph.execute()?;
//! graph.reset();
//! ```

pub mod backend;
pub mod error;
pub mod graph;
pub mod profiling;
pub mod scheduler;
pub mod types;

// Re-export main types for convenience
pub use backend::{CommandBuffer, Device, DummyDevice};
pub use error::GraphicsError;
pub use graph::{
    Builder, FrameGraph, FrameGraphConfig, PassId, PassRef, PresentTarget, ResourceHandle,
    Resources, Step,
};
pub use scheduler::{Fence, FenceStatus, Semaphore};
pub use types::{
    BufferDescriptor, BufferUsage, ClearValue, Extent3d, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Lilium Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_frame_graph_creation() {
        let graph = FrameGraph::new(Arc::new(DummyDevice::new()));
        assert_eq!(graph.pass_count(), 0);
        assert!(graph.steps().is_empty());
    }

    #[test]
    fn test_dummy_device() {
        let device = DummyDevice::new();
        assert_eq!(device.name(), "Dummy");
    }
}
