//! Common types shared across the graphics system.

// ============================================================================
// Extent3d
// ============================================================================

/// 3D extent for textures and framebuffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels, or array layers for 2D arrays (1 for 2D textures).
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Create a new 3D extent.
    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Component-wise maximum of two extents.
    pub fn max(self, other: Self) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
            depth: self.depth.max(other.depth),
        }
    }
}

// ============================================================================
// ClearValue
// ============================================================================

/// Clear value for render targets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ClearValue {
    /// No clear operation.
    #[default]
    None,
    /// Clear color attachment with RGBA values.
    Color { r: f32, g: f32, b: f32, a: f32 },
    /// Clear depth attachment.
    Depth(f32),
    /// Clear depth and stencil attachments.
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    /// Create a color clear value.
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color { r, g, b, a }
    }

    /// Create a depth clear value.
    pub fn depth(value: f32) -> Self {
        Self::Depth(value)
    }

    /// Create a depth/stencil clear value.
    pub fn depth_stencil(depth: f32, stencil: u32) -> Self {
        Self::DepthStencil { depth, stencil }
    }

    /// No clear operation.
    pub fn none() -> Self {
        Self::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_max() {
        let a = Extent3d::new_2d(1920, 540);
        let b = Extent3d::new_3d(960, 1080, 2);
        assert_eq!(a.max(b), Extent3d::new_3d(1920, 1080, 2));
    }

    #[test]
    fn test_clear_value_default_is_none() {
        assert_eq!(ClearValue::default(), ClearValue::None);
        assert_eq!(
            ClearValue::depth_stencil(1.0, 0),
            ClearValue::DepthStencil {
                depth: 1.0,
                stencil: 0
            }
        );
    }
}
