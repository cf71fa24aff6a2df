//! Graphics error types.

use thiserror::Error;

/// Errors reported by a [`Device`](crate::backend::Device) and propagated by
/// [`FrameGraph::execute`](crate::graph::FrameGraph::execute).
///
/// Misuse of the frame graph API (invalid handles, executing an uncompiled
/// graph) is a programming error and panics instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Submission of a command buffer failed.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::ResourceCreationFailed("gbuffer".to_string());
        assert_eq!(err.to_string(), "resource creation failed: gbuffer");
    }
}
