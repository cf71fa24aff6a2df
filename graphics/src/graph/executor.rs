//! Timeline execution and transient resource lifetime.
//!
//! Every step is recorded into its own primary command buffer and submitted
//! with a fence. Resources released by a step, together with the step's
//! framebuffer and attachment views, are queued behind that fence and only
//! destroyed once it is signaled. Steps releasing nothing queue nothing.
//! The queue is strictly FIFO: the head is checked once per executed step,
//! and [`Executor::drain`] blocks on every remaining fence.

use std::collections::VecDeque;

use crate::backend::{
    Barrier, BufferHandle, CommandBuffer, CommandBufferLevel, Device, FramebufferHandle,
    RenderPassHandle, SubpassContents, TextureHandle, TextureViewHandle,
};
use crate::error::GraphicsError;
use crate::scheduler::{Fence, Semaphore, SubmitInfo};
use crate::types::SubresourceRange;

use super::FrameGraphConfig;
use super::gpu_objects::PlannedBarrier;
use super::handle::ResourceHandle;
use super::pass::{Pass, PassRegistry};
use super::resource::{GpuResource, Resource, ResourceKind, ResourceRegistry};
use super::timeline::Step;

/// GPU objects of the resources realized for the step being recorded.
///
/// Passed to every execute and pre/post-execute callback.
pub struct Resources<'a> {
    registry: &'a ResourceRegistry,
    realized: &'a [Option<GpuResource>],
}

impl<'a> Resources<'a> {
    pub(crate) fn new(
        registry: &'a ResourceRegistry,
        realized: &'a [Option<GpuResource>],
    ) -> Self {
        Self { registry, realized }
    }

    /// Declaration of a resource.
    pub fn resource(&self, handle: ResourceHandle) -> &'a Resource {
        self.registry.get(handle)
    }

    /// GPU object of `handle`, `None` if it is not realized.
    pub fn get(&self, handle: ResourceHandle) -> Option<GpuResource> {
        self.realized.get(handle.index()).copied().flatten()
    }

    /// GPU texture of `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not a realized texture.
    pub fn texture(&self, handle: ResourceHandle) -> TextureHandle {
        match self.get(handle) {
            Some(GpuResource::Texture(texture)) => texture,
            _ => panic!(
                "'{}' is not a realized texture",
                self.registry.get(handle).name()
            ),
        }
    }

    /// GPU buffer of `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not a realized buffer.
    pub fn buffer(&self, handle: ResourceHandle) -> BufferHandle {
        match self.get(handle) {
            Some(GpuResource::Buffer(buffer)) => buffer,
            _ => panic!(
                "'{}' is not a realized buffer",
                self.registry.get(handle).name()
            ),
        }
    }
}

/// Objects waiting for a submission to retire before they are destroyed.
#[derive(Debug)]
pub struct DerealizeEntry {
    fence: Fence,
    resources: Vec<(ResourceHandle, GpuResource)>,
    framebuffer: Option<FramebufferHandle>,
    views: Vec<TextureViewHandle>,
}

impl DerealizeEntry {
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Released resources with the GPU objects that backed them.
    pub fn resources(&self) -> &[(ResourceHandle, GpuResource)] {
        &self.resources
    }

    fn free(self, device: &dyn Device) {
        if let Some(framebuffer) = self.framebuffer {
            device.destroy_framebuffer(framebuffer);
        }
        for view in self.views {
            device.destroy_texture_view(view);
        }
        for (handle, object) in self.resources {
            log::trace!("Derealizing {:?}", handle);
            destroy(device, object);
        }
    }
}

fn destroy(device: &dyn Device, object: GpuResource) {
    match object {
        GpuResource::Texture(texture) => device.destroy_texture(texture),
        GpuResource::Buffer(buffer) => device.destroy_buffer(buffer),
    }
}

/// Semaphores and fence the last submission of a frame synchronizes with.
#[derive(Debug, Default, Clone)]
pub(crate) struct FinalSubmit {
    pub wait_semaphores: Vec<Semaphore>,
    pub signal_semaphores: Vec<Semaphore>,
    pub fence: Option<Fence>,
}

/// Native objects the render pass scope of one step is recorded against.
#[derive(Default)]
struct StepTargets {
    render_pass: Option<RenderPassHandle>,
    framebuffer: Option<FramebufferHandle>,
    views: Vec<TextureViewHandle>,
}

impl StepTargets {
    /// Destroy objects that were never submitted. The render pass is cached.
    fn destroy(self, device: &dyn Device) {
        if let Some(framebuffer) = self.framebuffer {
            device.destroy_framebuffer(framebuffer);
        }
        for view in self.views {
            device.destroy_texture_view(view);
        }
    }
}

/// Drives a compiled timeline against a [`Device`].
#[derive(Debug, Default)]
pub struct Executor {
    realized: Vec<Option<GpuResource>>,
    render_passes: Vec<Option<RenderPassHandle>>,
    pending: VecDeque<DerealizeEntry>,
    /// Fence of the most recent submission, entry or not.
    last_submitted: Option<Fence>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries still waiting for their fence, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &DerealizeEntry> {
        self.pending.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of native render passes created so far.
    pub fn render_pass_count(&self) -> usize {
        self.render_passes.iter().flatten().count()
    }

    pub(crate) fn execute(
        &mut self,
        device: &dyn Device,
        config: &FrameGraphConfig,
        passes: &PassRegistry,
        resources: &ResourceRegistry,
        steps: &[Step],
        final_submit: &FinalSubmit,
    ) -> Result<(), GraphicsError> {
        crate::profile_scope!("FrameGraph::execute");

        self.realized.resize(resources.len(), None);
        self.render_passes.resize(steps.len(), None);

        let last = steps.len().saturating_sub(1);
        for (index, step) in steps.iter().enumerate() {
            let final_submit = (index == last).then_some(final_submit);
            self.execute_step(device, config, passes, resources, index, step, final_submit)?;
        }
        crate::profile_plot!("frame_graph_pending_derealizations", self.pending.len());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_step(
        &mut self,
        device: &dyn Device,
        config: &FrameGraphConfig,
        passes: &PassRegistry,
        resources: &ResourceRegistry,
        index: usize,
        step: &Step,
        final_submit: Option<&FinalSubmit>,
    ) -> Result<(), GraphicsError> {
        crate::profile_scope!("FrameGraph::execute_step");

        self.collect_retired(device);

        for &handle in step.realize() {
            self.realize(device, resources.get(handle), handle)?;
        }

        let targets = self.create_targets(device, resources, index, step)?;
        let cmd = self.record(device, config, passes, resources, step, &targets);

        let fence = final_submit
            .and_then(|submit| submit.fence.clone())
            .unwrap_or_else(|| device.create_fence());
        let info = match final_submit {
            Some(submit) => SubmitInfo {
                wait_semaphores: submit.wait_semaphores.clone(),
                signal_semaphores: submit.signal_semaphores.clone(),
                fence: Some(fence.clone()),
            },
            None => SubmitInfo::with_fence(fence.clone()),
        };

        log::trace!("Submitting step {} '{}'", index, step.label());
        if let Err(err) = device.submit(cmd, info) {
            targets.destroy(device);
            return Err(err);
        }

        self.last_submitted = Some(fence.clone());

        let released: Vec<_> = step
            .derealize()
            .iter()
            .filter_map(|handle| {
                self.realized[handle.index()]
                    .take()
                    .map(|object| (*handle, object))
            })
            .collect();
        if released.is_empty() && targets.framebuffer.is_none() && targets.views.is_empty() {
            return Ok(());
        }
        self.pending.push_back(DerealizeEntry {
            fence,
            resources: released,
            framebuffer: targets.framebuffer,
            views: targets.views,
        });
        Ok(())
    }

    /// Free the oldest entry if its fence has been signaled.
    fn collect_retired(&mut self, device: &dyn Device) {
        let retired = self
            .pending
            .front()
            .is_some_and(|entry| entry.fence.is_signaled());
        if !retired {
            return;
        }
        if let Some(entry) = self.pending.pop_front() {
            entry.free(device);
        }
    }

    fn realize(
        &mut self,
        device: &dyn Device,
        resource: &Resource,
        handle: ResourceHandle,
    ) -> Result<(), GraphicsError> {
        if let Some(imported) = resource.imported() {
            self.realized[handle.index()] = Some(imported);
            return Ok(());
        }
        if self.realized[handle.index()].is_some() {
            log::warn!("'{}' is already realized", resource.name());
            return Ok(());
        }

        log::trace!("Realizing '{}'", resource.name());
        let object = match resource.kind() {
            ResourceKind::Texture(desc) => {
                let mut desc = desc.clone();
                desc.label.get_or_insert_with(|| resource.name().to_string());
                GpuResource::Texture(device.create_texture(&desc)?)
            }
            ResourceKind::Buffer(desc) => {
                let mut desc = desc.clone();
                desc.label.get_or_insert_with(|| resource.name().to_string());
                GpuResource::Buffer(device.create_buffer(&desc)?)
            }
        };
        self.realized[handle.index()] = Some(object);
        Ok(())
    }

    fn create_targets(
        &mut self,
        device: &dyn Device,
        resources: &ResourceRegistry,
        index: usize,
        step: &Step,
    ) -> Result<StepTargets, GraphicsError> {
        let objects = step.objects();
        let Some(description) = &objects.render_pass else {
            return Ok(StepTargets::default());
        };

        let render_pass = match self.render_passes[index] {
            Some(render_pass) => render_pass,
            None => {
                let render_pass = device.create_render_pass(description)?;
                self.render_passes[index] = Some(render_pass);
                render_pass
            }
        };

        let mut targets = StepTargets {
            render_pass: Some(render_pass),
            ..StepTargets::default()
        };
        for &handle in &objects.attachments {
            let resource = resources.get(handle);
            let (Some(desc), Some(GpuResource::Texture(texture))) =
                (resource.texture_descriptor(), self.realized[handle.index()])
            else {
                panic!("attachment '{}' is not a realized texture", resource.name());
            };
            let view = device.create_texture_view(
                texture,
                desc.default_view_type(),
                SubresourceRange::whole(desc),
            );
            match view {
                Ok(view) => targets.views.push(view),
                Err(err) => {
                    targets.destroy(device);
                    return Err(err);
                }
            }
        }

        match device.create_framebuffer(render_pass, objects.framebuffer_extent, &targets.views) {
            Ok(framebuffer) => targets.framebuffer = Some(framebuffer),
            Err(err) => {
                targets.destroy(device);
                return Err(err);
            }
        }
        Ok(targets)
    }

    fn record(
        &self,
        device: &dyn Device,
        config: &FrameGraphConfig,
        passes: &PassRegistry,
        resources: &ResourceRegistry,
        step: &Step,
        targets: &StepTargets,
    ) -> CommandBuffer {
        let view = Resources::new(resources, &self.realized);
        let objects = step.objects();

        let mut cmd = device.create_command_buffer(step.label(), CommandBufferLevel::Primary);
        cmd.begin();
        if config.debug_labels {
            cmd.push_debug_group(step.label());
        }
        cmd.pipeline_barrier(self.resolve_barriers(resources, &objects.barriers));

        for &id in &objects.pre_execute {
            passes.get(id).pre_execute(&view, &mut cmd);
        }

        match (targets.render_pass, targets.framebuffer) {
            (Some(render_pass), Some(framebuffer)) => {
                for (subpass, &id) in step.passes().iter().enumerate() {
                    let pass = passes.get(id);
                    let contents = if pass.uses_sub_command_buffers() {
                        SubpassContents::SecondaryCommandBuffers
                    } else {
                        SubpassContents::Inline
                    };
                    if subpass == 0 {
                        cmd.begin_render_pass(
                            render_pass,
                            framebuffer,
                            objects.framebuffer_extent,
                            objects.clear_values.clone(),
                            contents,
                        );
                    } else {
                        cmd.next_subpass(contents);
                    }
                    record_body(device, config, pass, &view, &mut cmd);
                }
                cmd.end_render_pass();
            }
            _ => {
                for &id in step.passes() {
                    record_body(device, config, passes.get(id), &view, &mut cmd);
                }
            }
        }

        for &id in &objects.post_execute {
            passes.get(id).post_execute(&view, &mut cmd);
        }
        cmd.pipeline_barrier(self.resolve_barriers(resources, &objects.trailing_barriers));
        if config.debug_labels {
            cmd.pop_debug_group();
        }
        cmd.end();
        cmd
    }

    fn resolve_barriers(
        &self,
        resources: &ResourceRegistry,
        planned: &[PlannedBarrier],
    ) -> Vec<Barrier> {
        planned
            .iter()
            .filter_map(|barrier| match *barrier {
                PlannedBarrier::Texture {
                    resource,
                    old_layout,
                    new_layout,
                } => {
                    let desc = resources.get(resource).texture_descriptor()?;
                    match self.realized[resource.index()]? {
                        GpuResource::Texture(texture) => Some(Barrier::Texture {
                            texture,
                            range: SubresourceRange::whole(desc),
                            old_layout,
                            new_layout,
                        }),
                        GpuResource::Buffer(_) => None,
                    }
                }
                PlannedBarrier::Buffer { resource } => match self.realized[resource.index()]? {
                    GpuResource::Buffer(buffer) => Some(Barrier::Buffer { buffer }),
                    GpuResource::Texture(_) => None,
                },
            })
            .collect()
    }

    /// Block on every queued fence and free everything the executor owns.
    ///
    /// Retained resources are unbound, never destroyed.
    pub(crate) fn drain(&mut self, device: &dyn Device, resources: &ResourceRegistry) {
        crate::profile_scope!("FrameGraph::drain");

        let entries = self.pending.len();
        while let Some(entry) = self.pending.pop_front() {
            if !entry.fence.is_signaled() {
                device.wait_fence(&entry.fence);
            }
            entry.free(device);
        }
        if let Some(fence) = self.last_submitted.take() {
            if !fence.is_signaled() {
                device.wait_fence(&fence);
            }
        }
        for (index, slot) in self.realized.drain(..).enumerate() {
            let Some(object) = slot else {
                continue;
            };
            let handle = ResourceHandle::new(index);
            if resources.contains(handle) && resources.get(handle).is_transient() {
                log::trace!("Derealizing {:?} left behind by a failed execute", handle);
                destroy(device, object);
            }
        }
        for render_pass in self.render_passes.drain(..).flatten() {
            device.destroy_render_pass(render_pass);
        }
        if entries > 0 {
            log::debug!("Drained {} pending derealizations", entries);
        }
    }
}

fn record_body(
    device: &dyn Device,
    config: &FrameGraphConfig,
    pass: &Pass,
    resources: &Resources<'_>,
    cmd: &mut CommandBuffer,
) {
    if pass.uses_sub_command_buffers() {
        let mut secondary =
            device.create_command_buffer(pass.name(), CommandBufferLevel::Secondary);
        secondary.begin();
        record_labeled(config, pass, resources, &mut secondary);
        secondary.end();
        cmd.execute_commands(secondary);
    } else {
        record_labeled(config, pass, resources, cmd);
    }
}

fn record_labeled(
    config: &FrameGraphConfig,
    pass: &Pass,
    resources: &Resources<'_>,
    cmd: &mut CommandBuffer,
) {
    if config.debug_labels {
        cmd.push_debug_group(pass.name());
    }
    pass.execute(resources, cmd);
    if config.debug_labels {
        cmd.pop_debug_group();
    }
}
