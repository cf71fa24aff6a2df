//! GPU backend abstraction layer.
//!
//! The frame graph talks to the GPU exclusively through the [`Device`] trait:
//! resource and view creation, native render pass and framebuffer objects,
//! queue submission and fence waits.
//!
//! # Available Backends
//!
//! - [`DummyDevice`]: records every call and simulates queue retirement, used
//!   for tests and headless tooling.
//!
//! Native backends implement [`Device`] outside of this crate.

mod command;
pub mod dummy;

pub use command::{Barrier, Command, CommandBuffer, CommandBufferLevel, SubpassContents};
pub use dummy::{DeviceEvent, DummyDevice, SubmissionRecord};

use crate::error::GraphicsError;
use crate::scheduler::{Fence, Semaphore, SubmitInfo};
use crate::types::{
    BufferDescriptor, Extent3d, SubresourceRange, TextureDescriptor, TextureFormat,
    TextureViewType,
};

/// Handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a native render pass object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHandle(pub(crate) u64);

/// Handle to a native framebuffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

macro_rules! impl_raw_handle {
    ($($handle:ident),*) => {
        $(
            impl $handle {
                /// Wrap a raw backend id.
                pub fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// Raw backend id.
                pub fn raw(self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

impl_raw_handle!(
    TextureHandle,
    TextureViewHandle,
    BufferHandle,
    RenderPassHandle,
    FramebufferHandle
);

/// What happens to an attachment's contents at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Preserve the previous contents.
    Load,
    /// Clear to the attachment's clear value.
    Clear,
    /// Previous contents are undefined.
    DontCare,
}

/// What happens to an attachment's contents at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Write the rendered contents back to memory.
    Store,
    /// Contents may be discarded.
    DontCare,
}

/// Memory layout of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    PresentSrc,
}

/// Description of one render pass attachment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub format: TextureFormat,
    pub sample_count: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

/// Reference from a subpass to an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentReference {
    /// Index into [`RenderPassDescription::attachments`].
    pub attachment: u32,
    /// Layout during the subpass.
    pub layout: ImageLayout,
}

/// Attachments used by one subpass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubpassDescription {
    pub color_attachments: Vec<AttachmentReference>,
    /// Multisample resolve targets. Empty, or aligned with
    /// `color_attachments` with `None` for color attachments left unresolved.
    pub resolve_attachments: Vec<Option<AttachmentReference>>,
    pub depth_stencil_attachment: Option<AttachmentReference>,
}

/// Execution dependency between subpasses. `None` is external to the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    pub src_subpass: Option<u32>,
    pub dst_subpass: Option<u32>,
}

/// Full description of a native render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassDescription {
    pub label: Option<String>,
    pub attachments: Vec<AttachmentDescription>,
    pub subpasses: Vec<SubpassDescription>,
    pub dependencies: Vec<SubpassDependency>,
}

/// GPU device capabilities consumed by the frame graph.
///
/// Methods take `&self`; implementations synchronize internally. Creation
/// failures are reported as [`GraphicsError`] and abort the current frame.
pub trait Device: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    fn create_texture(&self, descriptor: &TextureDescriptor)
    -> Result<TextureHandle, GraphicsError>;

    fn destroy_texture(&self, texture: TextureHandle);

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GraphicsError>;

    fn destroy_buffer(&self, buffer: BufferHandle);

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        view_type: TextureViewType,
        range: SubresourceRange,
    ) -> Result<TextureViewHandle, GraphicsError>;

    fn destroy_texture_view(&self, view: TextureViewHandle);

    fn create_render_pass(
        &self,
        description: &RenderPassDescription,
    ) -> Result<RenderPassHandle, GraphicsError>;

    fn destroy_render_pass(&self, render_pass: RenderPassHandle);

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        extent: Extent3d,
        attachments: &[TextureViewHandle],
    ) -> Result<FramebufferHandle, GraphicsError>;

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    /// Create a command buffer in the initial state.
    fn create_command_buffer(&self, label: &str, level: CommandBufferLevel) -> CommandBuffer {
        CommandBuffer::new(label, level)
    }

    /// Create an unsignaled fence.
    fn create_fence(&self) -> Fence;

    fn create_semaphore(&self) -> Semaphore;

    /// Submit a finished command buffer to the queue.
    fn submit(&self, command_buffer: CommandBuffer, info: SubmitInfo)
    -> Result<(), GraphicsError>;

    /// Block until `fence` is signaled.
    fn wait_fence(&self, fence: &Fence);
}
