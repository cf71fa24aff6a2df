//! Texture types and descriptors.

use super::Extent3d;
use bitflags::bitflags;

/// Pixel format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    R16Float,
    R32Float,
    Rg16Float,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    /// Common swapchain format.
    Bgra8Unorm,
    Bgra8UnormSrgb,
    /// HDR color targets.
    Rgba16Float,
    Rgba32Float,
    Depth16Unorm,
    Depth24PlusStencil8,
    Depth32Float,
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Depth formats are bound to the depth-stencil slot of a subpass.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth24PlusStencil8
                | Self::Depth32Float
                | Self::Depth32FloatStencil8
        )
    }

    /// Stencil load/store ops only matter for these.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }
}

bitflags! {
    /// How a texture may be used.
    ///
    /// Only textures with `RENDER_ATTACHMENT` become framebuffer attachments
    /// when a pass writes them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        /// Sampled reads transition to a read-only layout.
        const TEXTURE_BINDING = 1 << 2;
        /// Storage access happens in the general layout.
        const STORAGE_BINDING = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    /// One-dimensional texture.
    D1,
    /// Two-dimensional texture, `size.depth` is the layer count.
    #[default]
    D2,
    /// Three-dimensional texture.
    D3,
    /// Cube map, `size.depth` must be 6.
    Cube,
}

/// Type of view created over a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewType {
    D1,
    D2,
    D2Array,
    D3,
    Cube,
}

impl TextureViewType {
    /// The view type covering a whole texture of the given dimension.
    pub fn for_dimension(dimension: TextureDimension, layers: u32) -> Self {
        match dimension {
            TextureDimension::D1 => Self::D1,
            TextureDimension::D2 if layers > 1 => Self::D2Array,
            TextureDimension::D2 => Self::D2,
            TextureDimension::D3 => Self::D3,
            TextureDimension::Cube => Self::Cube,
        }
    }
}

/// Mip levels and array layers addressed by a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl SubresourceRange {
    /// Range covering every mip and layer of the texture.
    pub fn whole(desc: &TextureDescriptor) -> Self {
        Self {
            base_mip_level: 0,
            mip_level_count: desc.mip_level_count,
            base_array_layer: 0,
            array_layer_count: desc.array_layers(),
        }
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Dimensionality of the texture.
    pub dimension: TextureDimension,
    /// Size of the texture.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Number of array layers (1 for 3D textures).
    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.size.depth.max(1),
        }
    }

    /// View type covering the whole texture.
    pub fn default_view_type(&self) -> TextureViewType {
        TextureViewType::for_dimension(self.dimension, self.array_layers())
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            size: Extent3d::default(),
            mip_level_count: 1,
            sample_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}
