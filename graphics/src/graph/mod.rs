//! Frame graph infrastructure.
//!
//! The frame graph is rebuilt every frame from declarative passes. Each pass
//! declares the textures and buffers it creates, reads and writes; the graph
//! then:
//!
//! - culls passes whose output nobody consumes ([`Culler`])
//! - orders the surviving passes into steps and computes the minimal
//!   lifetime of every transient resource ([`TimelineBuilder`])
//! - derives render passes, framebuffers, load/store operations, layouts and
//!   barriers ([`GpuObjectBuilder`])
//! - records and submits the steps, releasing transient resources once the
//!   GPU is done with them ([`Executor`])
//!
//! # Example
//!
//! ```ignore
//! use lilium_graphics::{FrameGraph, TextureDescriptor, TextureFormat, TextureUsage};
//!
//! #[derive(Default)]
//! struct GBufferData {
//!     albedo: ResourceHandle,
//! }
//!
//! let mut graph = FrameGraph::new(device.clone());
//! let backbuffer = graph.present_to("backbuffer", present_target);
//!
//! let gbuffer = graph.add_pass::<GBufferData, _, _>(
//!     "gbuffer",
//!     |builder, data| {
//!         data.albedo = builder.create_texture("albedo", albedo_desc);
//!     },
//!     |data, resources, cmd| {
//!         cmd.draw(0..3, 0..1);
//!     },
//! );
//! let albedo = gbuffer.data().albedo;
//!
//! graph.add_pass::<(), _, _>(
//!     "compose",
//!     |builder, _| {
//!         builder.read(albedo);
//!         builder.write(backbuffer);
//!     },
//!     |_, _, cmd| cmd.draw(0..3, 0..1),
//! );
//!
//! graph.compile();
//! graph.execute()?;
//! graph.reset();
//! ```

mod builder;
mod cull;
mod executor;
mod gpu_objects;
mod graphviz;
mod handle;
mod pass;
mod resource;
mod timeline;

pub use builder::Builder;
pub use cull::{CullResult, Culler};
pub use executor::{DerealizeEntry, Executor, Resources};
pub use gpu_objects::{GpuObjectBuilder, PlannedBarrier, StepObjects};
pub use graphviz::Graphviz;
pub use handle::{PassId, ResourceHandle};
pub use pass::{CommandCallback, Pass, PassRef, PassRegistry};
pub use resource::{GpuResource, Resource, ResourceKind, ResourceRegistry};
pub use timeline::{Step, TimelineBuilder};

use std::sync::Arc;

use crate::backend::{BufferHandle, CommandBuffer, Device, TextureHandle};
use crate::error::GraphicsError;
use crate::scheduler::{Fence, Semaphore};
use crate::types::{BufferDescriptor, ClearValue, TextureDescriptor, TextureFormat};

use executor::FinalSubmit;

/// Frame graph configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGraphConfig {
    /// Wrap every step and pass in a debug group named after it.
    pub debug_labels: bool,
    /// Clear value of color attachments without an explicit one.
    pub clear_color: ClearValue,
    /// Depth clear value of depth attachments without an explicit one.
    pub clear_depth: f32,
    /// Stencil clear value of stencil attachments without an explicit one.
    pub clear_stencil: u32,
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            debug_labels: false,
            clear_color: ClearValue::color(0.0, 0.0, 0.0, 1.0),
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

impl FrameGraphConfig {
    /// Clear value used for an attachment of `format` without an explicit one.
    pub fn default_clear_value(&self, format: TextureFormat) -> ClearValue {
        if format.has_stencil() {
            ClearValue::depth_stencil(self.clear_depth, self.clear_stencil)
        } else if format.is_depth_stencil() {
            ClearValue::depth(self.clear_depth)
        } else {
            self.clear_color
        }
    }
}

/// Swapchain image the frame ends in, with the synchronization of the final
/// submission.
#[derive(Debug, Clone)]
pub struct PresentTarget {
    pub texture: TextureHandle,
    pub descriptor: TextureDescriptor,
    /// Waited on by the final submission, e.g. image acquisition.
    pub wait_semaphores: Vec<Semaphore>,
    /// Signaled by the final submission, e.g. for the present queue.
    pub signal_semaphores: Vec<Semaphore>,
    /// Signaled when the final submission retires.
    pub fence: Option<Fence>,
}

impl PresentTarget {
    pub fn new(texture: TextureHandle, descriptor: TextureDescriptor) -> Self {
        Self {
            texture,
            descriptor,
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
            fence: None,
        }
    }

    pub fn with_wait_semaphore(mut self, semaphore: Semaphore) -> Self {
        self.wait_semaphores.push(semaphore);
        self
    }

    pub fn with_signal_semaphore(mut self, semaphore: Semaphore) -> Self {
        self.signal_semaphores.push(semaphore);
        self
    }

    pub fn with_fence(mut self, fence: Fence) -> Self {
        self.fence = Some(fence);
        self
    }
}

struct Compiled {
    cull: CullResult,
    steps: Vec<Step>,
}

/// Per-frame dependency graph of GPU passes.
///
/// Declare passes and imported resources, `compile()`, `execute()`, then
/// `reset()` before declaring the next frame. A compiled graph can be
/// executed more than once.
///
/// Dropping the graph blocks until every submission it made has retired.
pub struct FrameGraph {
    device: Arc<dyn Device>,
    config: FrameGraphConfig,
    passes: PassRegistry,
    resources: ResourceRegistry,
    present: Option<(ResourceHandle, FinalSubmit)>,
    culler: Culler,
    compiled: Option<Compiled>,
    executor: Executor,
}

impl FrameGraph {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self::with_config(device, FrameGraphConfig::default())
    }

    pub fn with_config(device: Arc<dyn Device>, config: FrameGraphConfig) -> Self {
        log::debug!("Creating frame graph on '{}'", device.name());
        Self {
            device,
            config,
            passes: PassRegistry::new(),
            resources: ResourceRegistry::new(),
            present: None,
            culler: Culler::new(),
            compiled: None,
            executor: Executor::new(),
        }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn config(&self) -> &FrameGraphConfig {
        &self.config
    }

    /// Declare a pass.
    ///
    /// `setup` runs immediately and declares the pass's resources through the
    /// [`Builder`], filling in the pass data `D`. `execute` records the pass
    /// body every time the graph is executed.
    ///
    /// # Panics
    ///
    /// Panics if the graph is compiled.
    pub fn add_pass<D, S, E>(
        &mut self,
        name: impl Into<String>,
        setup: S,
        execute: E,
    ) -> PassRef<'_, D>
    where
        D: Default + 'static,
        S: FnOnce(&mut Builder<'_>, &mut D),
        E: Fn(&D, &Resources<'_>, &mut CommandBuffer) + 'static,
    {
        let name = name.into();
        self.assert_not_compiled(&name);

        let id = self.passes.next_id();
        let mut data = D::default();
        let mut pass = Pass::new(id, name, D::default(), execute);
        setup(&mut Builder::new(&mut pass, &mut self.resources), &mut data);
        pass.set_data(data);
        log::trace!(
            "Declared pass {} '{}': {} reads, {} writes",
            id,
            pass.name(),
            pass.reads().len(),
            pass.writes().len()
        );
        PassRef::new(self.passes.push(pass))
    }

    /// Wrap a caller-owned texture as a retained resource.
    ///
    /// If the first pass using the texture loads it as an attachment, the
    /// texture must already be in that attachment's layout. Any other first
    /// use is planned from `ImageLayout::Undefined`.
    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        descriptor: TextureDescriptor,
        texture: TextureHandle,
    ) -> ResourceHandle {
        let name = name.into();
        self.assert_not_compiled(&name);
        self.resources.import(
            name,
            ResourceKind::Texture(descriptor),
            GpuResource::Texture(texture),
        )
    }

    /// Wrap a caller-owned buffer as a retained resource.
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        descriptor: BufferDescriptor,
        buffer: BufferHandle,
    ) -> ResourceHandle {
        let name = name.into();
        self.assert_not_compiled(&name);
        self.resources.import(
            name,
            ResourceKind::Buffer(descriptor),
            GpuResource::Buffer(buffer),
        )
    }

    /// Declare the texture the frame is presented from.
    ///
    /// The returned resource is retained and is transitioned for presentation
    /// by its last writer. The last submission of the frame waits on and
    /// signals the target's semaphores and signals its fence. The layout the
    /// target enters the graph in follows [`import_texture`](Self::import_texture).
    ///
    /// # Panics
    ///
    /// Panics if a present target was already declared.
    pub fn present_to(&mut self, name: impl Into<String>, target: PresentTarget) -> ResourceHandle {
        let name = name.into();
        assert!(
            self.present.is_none(),
            "present target already declared, cannot present to '{name}'"
        );
        let handle = self.import_texture(name, target.descriptor, target.texture);
        let submit = FinalSubmit {
            wait_semaphores: target.wait_semaphores,
            signal_semaphores: target.signal_semaphores,
            fence: target.fence,
        };
        self.present = Some((handle, submit));
        handle
    }

    /// Resource returned by [`present_to`](Self::present_to).
    pub fn present_resource(&self) -> Option<ResourceHandle> {
        self.present.as_ref().map(|(handle, _)| *handle)
    }

    /// Cull, build the timeline and plan GPU objects.
    ///
    /// Compiling again without `reset()` first waits for all submitted work.
    ///
    /// # Panics
    ///
    /// Panics if a present target is declared but no surviving pass writes it.
    pub fn compile(&mut self) {
        crate::profile_scope!("FrameGraph::compile");

        if self.compiled.take().is_some() {
            self.executor.drain(self.device.as_ref(), &self.resources);
        }

        let cull = self.culler.cull(&self.passes, &self.resources);
        if let Some(present) = self.present_resource() {
            assert!(
                cull.surviving_passes()
                    .any(|id| self.passes.get(id).writes_resource(present)),
                "no surviving pass writes the present target '{}'",
                self.resources.get(present).name()
            );
        }
        let mut steps = TimelineBuilder::new(&self.passes, &self.resources, &cull).build();
        GpuObjectBuilder::new(
            &self.passes,
            &self.resources,
            &cull,
            &self.config,
            self.present_resource(),
        )
        .build(&mut steps);

        log::debug!(
            "Compiled frame graph: {} passes ({} culled), {} resources ({} culled), {} steps",
            self.passes.len(),
            cull.culled_pass_count(),
            self.resources.len(),
            cull.culled_resource_count(),
            steps.len()
        );
        crate::profile_plot!("frame_graph_steps", steps.len());
        self.compiled = Some(Compiled { cull, steps });
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Record and submit every step.
    ///
    /// On error the graph has to be `reset()` before it is used again.
    ///
    /// # Panics
    ///
    /// Panics if the graph is not compiled.
    pub fn execute(&mut self) -> Result<(), GraphicsError> {
        let Some(compiled) = &self.compiled else {
            panic!("frame graph must be compiled before execute");
        };
        let final_submit = self
            .present
            .as_ref()
            .map(|(_, submit)| submit.clone())
            .unwrap_or_default();
        self.executor.execute(
            self.device.as_ref(),
            &self.config,
            &self.passes,
            &self.resources,
            &compiled.steps,
            &final_submit,
        )
    }

    /// Wait for all submitted work, free every GPU object and forget all
    /// declarations.
    pub fn reset(&mut self) {
        crate::profile_scope!("FrameGraph::reset");
        self.executor.drain(self.device.as_ref(), &self.resources);
        self.passes.clear();
        self.resources.clear();
        self.present = None;
        self.compiled = None;
    }

    /// DOT description of the graph, see [`Graphviz`].
    ///
    /// Before `compile()` the culling shown is computed on the fly.
    pub fn export_graphviz(&self) -> String {
        if let Some(compiled) = &self.compiled {
            return Graphviz::new(&self.passes, &self.resources, &compiled.cull).to_string();
        }
        let cull = Culler::new().cull(&self.passes, &self.resources);
        Graphviz::new(&self.passes, &self.resources, &cull).to_string()
    }

    /// Steps of the compiled timeline, empty before `compile()`.
    pub fn steps(&self) -> &[Step] {
        self.compiled
            .as_ref()
            .map_or(&[], |compiled| compiled.steps.as_slice())
    }

    /// # Panics
    ///
    /// Panics if the graph is not compiled.
    pub fn is_pass_culled(&self, id: PassId) -> bool {
        self.compiled_state().cull.is_pass_culled(id)
    }

    /// # Panics
    ///
    /// Panics if the graph is not compiled.
    pub fn is_resource_culled(&self, handle: ResourceHandle) -> bool {
        self.compiled_state().cull.is_resource_culled(handle)
    }

    pub fn pass(&self, id: PassId) -> &Pass {
        self.passes.get(id)
    }

    pub fn resource(&self, handle: ResourceHandle) -> &Resource {
        self.resources.get(handle)
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Derealization entries still waiting for their fence.
    pub fn pending_derealizations(&self) -> usize {
        self.executor.pending_count()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn compiled_state(&self) -> &Compiled {
        let Some(compiled) = &self.compiled else {
            panic!("frame graph is not compiled");
        };
        compiled
    }

    fn assert_not_compiled(&self, name: &str) {
        assert!(
            self.compiled.is_none(),
            "cannot declare '{name}' in a compiled frame graph, call reset() first"
        );
    }
}

impl Drop for FrameGraph {
    fn drop(&mut self) {
        self.executor.drain(self.device.as_ref(), &self.resources);
    }
}
