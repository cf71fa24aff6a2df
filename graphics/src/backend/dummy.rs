//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! handles, records every call as a [`DeviceEvent`], keeps submissions in an
//! in-order queue and only signals their fences when the queue is retired,
//! either explicitly ([`DummyDevice::retire_next`], [`DummyDevice::retire_all`])
//! or through [`Device::wait_fence`].

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::scheduler::{Fence, Semaphore, SubmitInfo};
use crate::types::{
    BufferDescriptor, Extent3d, SubresourceRange, TextureDescriptor, TextureViewType,
};

use super::{
    BufferHandle, Command, CommandBuffer, Device, FramebufferHandle, RenderPassDescription,
    RenderPassHandle, TextureHandle, TextureViewHandle,
};

/// A call observed by the dummy device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    CreateTexture {
        id: u64,
        label: Option<String>,
    },
    DestroyTexture(u64),
    CreateBuffer {
        id: u64,
        label: Option<String>,
    },
    DestroyBuffer(u64),
    CreateTextureView {
        id: u64,
        texture: u64,
    },
    DestroyTextureView(u64),
    CreateRenderPass {
        id: u64,
        description: RenderPassDescription,
    },
    DestroyRenderPass(u64),
    CreateFramebuffer {
        id: u64,
        extent: Extent3d,
        attachments: Vec<u64>,
    },
    DestroyFramebuffer(u64),
    Submit {
        label: String,
    },
    Retire {
        label: String,
    },
}

/// A submission accepted by the dummy device.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub label: String,
    pub commands: Vec<Command>,
    pub wait_semaphores: Vec<Semaphore>,
    pub signal_semaphores: Vec<Semaphore>,
    pub fence: Option<Fence>,
    pub retired: bool,
}

#[derive(Debug, Default)]
struct DummyState {
    next_id: u64,
    live_textures: HashSet<u64>,
    live_buffers: HashSet<u64>,
    live_views: HashSet<u64>,
    live_render_passes: HashSet<u64>,
    live_framebuffers: HashSet<u64>,
    /// Indices into `submissions` that have not retired yet, oldest first.
    pending: VecDeque<usize>,
    submissions: Vec<SubmissionRecord>,
    events: Vec<DeviceEvent>,
    fail_allocations: bool,
}

impl DummyState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn retire_next(&mut self) -> bool {
        let Some(index) = self.pending.pop_front() else {
            return false;
        };
        let submission = &mut self.submissions[index];
        submission.retired = true;
        if let Some(fence) = &submission.fence {
            fence.signal();
        }
        log::trace!("DummyDevice: retired '{}'", submission.label);
        let label = submission.label.clone();
        self.events.push(DeviceEvent::Retire { label });
        true
    }
}

/// Dummy GPU device.
#[derive(Debug, Default)]
pub struct DummyDevice {
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent texture/buffer creation fail with
    /// [`GraphicsError::OutOfMemory`].
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.lock().fail_allocations = fail;
    }

    /// Retire the oldest pending submission, signaling its fence.
    ///
    /// Returns `false` if nothing was pending.
    pub fn retire_next(&self) -> bool {
        self.state.lock().retire_next()
    }

    /// Retire every pending submission.
    pub fn retire_all(&self) {
        let mut state = self.state.lock();
        while state.retire_next() {}
    }

    /// Number of submissions that have not retired.
    pub fn pending_submissions(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Every submission so far, in submission order.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    /// Every recorded call so far.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().events.clone()
    }

    /// Forget recorded events and submissions. Live objects are kept.
    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.events.clear();
        let pending: Vec<SubmissionRecord> = state
            .pending
            .iter()
            .map(|&index| state.submissions[index].clone())
            .collect();
        state.pending = (0..pending.len()).collect();
        state.submissions = pending;
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.lock().live_textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().live_buffers.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.state.lock().live_views.len()
    }

    pub fn live_render_pass_count(&self) -> usize {
        self.state.lock().live_render_passes.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.state.lock().live_framebuffers.len()
    }

    /// Whether `texture` was created by this device and not destroyed.
    pub fn is_texture_alive(&self, texture: TextureHandle) -> bool {
        self.state.lock().live_textures.contains(&texture.0)
    }

    /// Whether `buffer` was created by this device and not destroyed.
    pub fn is_buffer_alive(&self, buffer: BufferHandle) -> bool {
        self.state.lock().live_buffers.contains(&buffer.0)
    }
}

impl Device for DummyDevice {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, GraphicsError> {
        let mut state = self.state.lock();
        if state.fail_allocations {
            return Err(GraphicsError::OutOfMemory);
        }
        let id = state.allocate_id();
        log::trace!(
            "DummyDevice: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        state.live_textures.insert(id);
        state.events.push(DeviceEvent::CreateTexture {
            id,
            label: descriptor.label.clone(),
        });
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut state = self.state.lock();
        assert!(
            state.live_textures.remove(&texture.0),
            "destroying unknown texture {texture:?}"
        );
        state.events.push(DeviceEvent::DestroyTexture(texture.0));
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GraphicsError> {
        let mut state = self.state.lock();
        if state.fail_allocations {
            return Err(GraphicsError::OutOfMemory);
        }
        let id = state.allocate_id();
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        state.live_buffers.insert(id);
        state.events.push(DeviceEvent::CreateBuffer {
            id,
            label: descriptor.label.clone(),
        });
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        assert!(
            state.live_buffers.remove(&buffer.0),
            "destroying unknown buffer {buffer:?}"
        );
        state.events.push(DeviceEvent::DestroyBuffer(buffer.0));
    }

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        _view_type: TextureViewType,
        _range: SubresourceRange,
    ) -> Result<TextureViewHandle, GraphicsError> {
        let mut state = self.state.lock();
        if !state.live_textures.contains(&texture.0) {
            return Err(GraphicsError::InvalidParameter(format!(
                "view of unknown texture {texture:?}"
            )));
        }
        let id = state.allocate_id();
        state.live_views.insert(id);
        state.events.push(DeviceEvent::CreateTextureView {
            id,
            texture: texture.0,
        });
        Ok(TextureViewHandle(id))
    }

    fn destroy_texture_view(&self, view: TextureViewHandle) {
        let mut state = self.state.lock();
        assert!(
            state.live_views.remove(&view.0),
            "destroying unknown view {view:?}"
        );
        state.events.push(DeviceEvent::DestroyTextureView(view.0));
    }

    fn create_render_pass(
        &self,
        description: &RenderPassDescription,
    ) -> Result<RenderPassHandle, GraphicsError> {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.live_render_passes.insert(id);
        state.events.push(DeviceEvent::CreateRenderPass {
            id,
            description: description.clone(),
        });
        Ok(RenderPassHandle(id))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        let mut state = self.state.lock();
        assert!(
            state.live_render_passes.remove(&render_pass.0),
            "destroying unknown render pass {render_pass:?}"
        );
        state
            .events
            .push(DeviceEvent::DestroyRenderPass(render_pass.0));
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        extent: Extent3d,
        attachments: &[TextureViewHandle],
    ) -> Result<FramebufferHandle, GraphicsError> {
        let mut state = self.state.lock();
        if !state.live_render_passes.contains(&render_pass.0) {
            return Err(GraphicsError::InvalidParameter(format!(
                "framebuffer for unknown render pass {render_pass:?}"
            )));
        }
        if let Some(view) = attachments
            .iter()
            .find(|view| !state.live_views.contains(&view.0))
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "framebuffer attachment {view:?} is not a live view"
            )));
        }
        let id = state.allocate_id();
        state.live_framebuffers.insert(id);
        state.events.push(DeviceEvent::CreateFramebuffer {
            id,
            extent,
            attachments: attachments.iter().map(|view| view.0).collect(),
        });
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        let mut state = self.state.lock();
        assert!(
            state.live_framebuffers.remove(&framebuffer.0),
            "destroying unknown framebuffer {framebuffer:?}"
        );
        state
            .events
            .push(DeviceEvent::DestroyFramebuffer(framebuffer.0));
    }

    fn create_fence(&self) -> Fence {
        Fence::new_unsignaled()
    }

    fn create_semaphore(&self) -> Semaphore {
        let id = self.state.lock().allocate_id();
        Semaphore::new(id)
    }

    fn submit(
        &self,
        command_buffer: CommandBuffer,
        info: SubmitInfo,
    ) -> Result<(), GraphicsError> {
        if !command_buffer.is_executable() {
            return Err(GraphicsError::SubmissionFailed(format!(
                "command buffer '{}' was not ended",
                command_buffer.label()
            )));
        }
        let mut state = self.state.lock();
        let label = command_buffer.label().to_string();
        log::trace!(
            "DummyDevice: submitting '{}' ({} commands)",
            label,
            command_buffer.commands().len()
        );
        let index = state.submissions.len();
        state.submissions.push(SubmissionRecord {
            label: label.clone(),
            commands: command_buffer.into_commands(),
            wait_semaphores: info.wait_semaphores,
            signal_semaphores: info.signal_semaphores,
            fence: info.fence,
            retired: false,
        });
        state.pending.push_back(index);
        state.events.push(DeviceEvent::Submit { label });
        Ok(())
    }

    fn wait_fence(&self, fence: &Fence) {
        let mut state = self.state.lock();
        while !fence.is_signaled() {
            if !state.retire_next() {
                log::warn!("DummyDevice: waiting on a fence that was never submitted");
                fence.signal();
            }
        }
    }
}
