//! Backend-agnostic command recording.
//!
//! A [`CommandBuffer`] records [`Command`]s on the CPU; the device translates
//! them to native commands on [`Device::submit`](super::Device::submit).

use std::ops::Range;

use crate::types::{ClearValue, Extent3d, SubresourceRange};

use super::{BufferHandle, FramebufferHandle, ImageLayout, RenderPassHandle, TextureHandle};

/// Whether a command buffer is submitted directly or executed from another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

/// How the commands of a subpass are provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpassContents {
    /// Commands are recorded directly in the primary command buffer.
    Inline,
    /// Commands come from secondary command buffers only.
    SecondaryCommandBuffers,
}

/// Synchronization barrier between two uses of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Barrier {
    /// Layout transition of a texture.
    Texture {
        texture: TextureHandle,
        range: SubresourceRange,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    },
    /// Make prior writes to a buffer visible to later reads.
    Buffer { buffer: BufferHandle },
}

/// A recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent3d,
        clear_values: Vec<ClearValue>,
        contents: SubpassContents,
    },
    NextSubpass {
        contents: SubpassContents,
    },
    EndRenderPass,
    PipelineBarrier(Vec<Barrier>),
    /// Commands of a secondary command buffer.
    ExecuteCommands(Vec<Command>),
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    SetScissor {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    Initial,
    Recording,
    Executable,
}

/// A command buffer recording commands for one submission.
///
/// Recording follows `begin` → commands → `end`. Render pass scopes must be
/// balanced before `end`.
#[derive(Debug)]
pub struct CommandBuffer {
    label: String,
    level: CommandBufferLevel,
    state: RecordingState,
    in_render_pass: bool,
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create an empty command buffer.
    pub fn new(label: impl Into<String>, level: CommandBufferLevel) -> Self {
        Self {
            label: label.into(),
            level,
            state: RecordingState::Initial,
            in_render_pass: false,
            commands: Vec::new(),
        }
    }

    /// Debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Command buffer level.
    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Recorded commands.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Take the recorded commands, consuming the buffer.
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// Whether `end` has been called.
    pub fn is_executable(&self) -> bool {
        self.state == RecordingState::Executable
    }

    /// Whether a render pass is currently open.
    pub fn is_inside_render_pass(&self) -> bool {
        self.in_render_pass
    }

    /// Start recording.
    pub fn begin(&mut self) {
        assert_eq!(
            self.state,
            RecordingState::Initial,
            "command buffer '{}' already begun",
            self.label
        );
        self.state = RecordingState::Recording;
    }

    /// Finish recording.
    pub fn end(&mut self) {
        self.assert_recording();
        assert!(
            !self.in_render_pass,
            "command buffer '{}' ended inside a render pass",
            self.label
        );
        self.state = RecordingState::Executable;
    }

    pub fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent3d,
        clear_values: Vec<ClearValue>,
        contents: SubpassContents,
    ) {
        self.assert_recording();
        assert!(!self.in_render_pass, "render passes cannot be nested");
        self.in_render_pass = true;
        self.commands.push(Command::BeginRenderPass {
            render_pass,
            framebuffer,
            extent,
            clear_values,
            contents,
        });
    }

    pub fn next_subpass(&mut self, contents: SubpassContents) {
        self.assert_recording();
        assert!(self.in_render_pass, "next_subpass outside of a render pass");
        self.commands.push(Command::NextSubpass { contents });
    }

    pub fn end_render_pass(&mut self) {
        self.assert_recording();
        assert!(self.in_render_pass, "end_render_pass without begin");
        self.in_render_pass = false;
        self.commands.push(Command::EndRenderPass);
    }

    /// Record barriers. Empty barrier lists are dropped.
    pub fn pipeline_barrier(&mut self, barriers: Vec<Barrier>) {
        self.assert_recording();
        if !barriers.is_empty() {
            self.commands.push(Command::PipelineBarrier(barriers));
        }
    }

    /// Execute a finished secondary command buffer.
    pub fn execute_commands(&mut self, secondary: CommandBuffer) {
        self.assert_recording();
        assert_eq!(secondary.level, CommandBufferLevel::Secondary);
        assert!(
            secondary.is_executable(),
            "secondary command buffer '{}' was not ended",
            secondary.label
        );
        self.commands.push(Command::ExecuteCommands(secondary.commands));
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.push(Command::SetViewport {
            x,
            y,
            width,
            height,
        });
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.push(Command::SetScissor {
            x,
            y,
            width,
            height,
        });
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.push(Command::Draw {
            vertices,
            instances,
        });
    }

    pub fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch { x, y, z });
    }

    pub fn push_debug_group(&mut self, label: impl Into<String>) {
        self.push(Command::PushDebugGroup(label.into()));
    }

    pub fn pop_debug_group(&mut self) {
        self.push(Command::PopDebugGroup);
    }

    pub fn insert_debug_marker(&mut self, label: impl Into<String>) {
        self.push(Command::InsertDebugMarker(label.into()));
    }

    fn push(&mut self, command: Command) {
        self.assert_recording();
        self.commands.push(command);
    }

    fn assert_recording(&self) {
        assert_eq!(
            self.state,
            RecordingState::Recording,
            "command buffer '{}' is not recording",
            self.label
        );
    }
}
