//! Render pass, framebuffer and barrier planning.
//!
//! Runs after the timeline is built and walks the steps in order, tracking
//! the layout every texture is left in and the last step writing every
//! storage texture and buffer. Everything is planned in terms of frame graph handles; the
//! executor maps them to GPU objects once the resources are realized.

use crate::backend::{
    AttachmentDescription, AttachmentReference, ImageLayout, LoadOp, RenderPassDescription,
    StoreOp, SubpassDependency, SubpassDescription,
};
use crate::types::{ClearValue, Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

use super::FrameGraphConfig;
use super::cull::CullResult;
use super::handle::{PassId, ResourceHandle};
use super::pass::{Pass, PassRegistry};
use super::resource::{ResourceKind, ResourceRegistry};
use super::timeline::Step;

/// Synchronization planned between two uses of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedBarrier {
    Texture {
        resource: ResourceHandle,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    },
    Buffer {
        resource: ResourceHandle,
    },
}

/// GPU objects derived for one step.
#[derive(Debug, Clone, Default)]
pub struct StepObjects {
    /// Attachments in framebuffer slot order.
    pub attachments: Vec<ResourceHandle>,
    /// `None` when no grouped pass writes an attachment.
    pub render_pass: Option<RenderPassDescription>,
    pub framebuffer_extent: Extent3d,
    /// Aligned with `attachments`.
    pub clear_values: Vec<ClearValue>,
    /// Recorded before the pre-execute callbacks.
    pub barriers: Vec<PlannedBarrier>,
    /// Recorded after the post-execute callbacks.
    pub trailing_barriers: Vec<PlannedBarrier>,
    /// Passes whose pre-execute callback runs, in declaration order.
    pub pre_execute: Vec<PassId>,
    /// Passes whose post-execute callback runs, in declaration order.
    pub post_execute: Vec<PassId>,
}

impl StepObjects {
    pub fn has_render_pass(&self) -> bool {
        self.render_pass.is_some()
    }

    /// Attachment slot of `handle`, if it is an attachment of the step.
    pub fn attachment_index(&self, handle: ResourceHandle) -> Option<usize> {
        self.attachments.iter().position(|attachment| *attachment == handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Color,
    DepthStencil,
    Resolve,
}

/// Per-resource state carried from one step to the next.
struct StateTracker {
    layouts: Vec<ImageLayout>,
    /// Last step with a shader write, for storage textures and buffers.
    last_write: Vec<Option<usize>>,
    /// No access was synchronized against `last_write` yet.
    unsynced: Vec<bool>,
}

impl StateTracker {
    fn new(resource_count: usize) -> Self {
        Self {
            layouts: vec![ImageLayout::Undefined; resource_count],
            last_write: vec![None; resource_count],
            unsynced: vec![false; resource_count],
        }
    }

    fn transition(
        &mut self,
        resource: ResourceHandle,
        new_layout: ImageLayout,
        barriers: &mut Vec<PlannedBarrier>,
    ) {
        let old_layout = self.layouts[resource.index()];
        if old_layout != new_layout {
            barriers.push(PlannedBarrier::Texture {
                resource,
                old_layout,
                new_layout,
            });
            self.layouts[resource.index()] = new_layout;
            self.unsynced[resource.index()] = false;
        }
    }

    /// Whether an earlier step wrote `resource` with no barrier since.
    fn has_unsynced_write(&self, resource: ResourceHandle, step_index: usize) -> bool {
        let index = resource.index();
        self.unsynced[index] && self.last_write[index].is_some_and(|step| step < step_index)
    }

    fn record_write(&mut self, resource: ResourceHandle, step_index: usize) {
        self.last_write[resource.index()] = Some(step_index);
        self.unsynced[resource.index()] = true;
    }

    /// Move a texture to `layout`, or keep it there behind a barrier when
    /// an earlier step wrote it in that layout.
    fn access_texture(
        &mut self,
        resource: ResourceHandle,
        layout: ImageLayout,
        step_index: usize,
        barriers: &mut Vec<PlannedBarrier>,
    ) {
        if self.layouts[resource.index()] == layout {
            if self.has_unsynced_write(resource, step_index) {
                barriers.push(PlannedBarrier::Texture {
                    resource,
                    old_layout: layout,
                    new_layout: layout,
                });
                self.unsynced[resource.index()] = false;
            }
        } else {
            self.transition(resource, layout, barriers);
        }
    }
}

/// Derives the render pass, framebuffer and barriers of every step.
pub struct GpuObjectBuilder<'a> {
    passes: &'a PassRegistry,
    resources: &'a ResourceRegistry,
    cull: &'a CullResult,
    config: &'a FrameGraphConfig,
    present: Option<ResourceHandle>,
}

impl<'a> GpuObjectBuilder<'a> {
    pub fn new(
        passes: &'a PassRegistry,
        resources: &'a ResourceRegistry,
        cull: &'a CullResult,
        config: &'a FrameGraphConfig,
        present: Option<ResourceHandle>,
    ) -> Self {
        Self {
            passes,
            resources,
            cull,
            config,
            present,
        }
    }

    pub fn build(&self, steps: &mut [Step]) {
        crate::profile_function!();

        let mut tracker = StateTracker::new(self.resources.len());
        let present_step = self.present.and_then(|present| {
            steps.iter().rposition(|step| {
                step.passes()
                    .iter()
                    .any(|id| self.passes.get(*id).writes_resource(present))
            })
        });

        for (index, step) in steps.iter_mut().enumerate() {
            let presents = present_step == Some(index);
            let objects = self.build_step(index, step, &mut tracker, presents);
            log::trace!(
                "Step {} '{}': {} attachments, {} barriers",
                index,
                step.label(),
                objects.attachments.len(),
                objects.barriers.len() + objects.trailing_barriers.len()
            );
            step.objects = objects;
        }
    }

    fn build_step(
        &self,
        step_index: usize,
        step: &Step,
        tracker: &mut StateTracker,
        presents: bool,
    ) -> StepObjects {
        let mut objects = StepObjects::default();
        let mut descriptions: Vec<AttachmentDescription> = Vec::new();
        let mut subpasses: Vec<SubpassDescription> = Vec::new();

        for &id in step.passes() {
            let pass = self.passes.get(id);
            let mut subpass = SubpassDescription::default();
            let mut multisampled = Vec::new();
            let mut resolves = Vec::new();
            for &handle in pass.writes() {
                let Some((desc, slot)) = self.attachment_slot(pass, handle) else {
                    continue;
                };
                let layout = attachment_layout(desc.format);
                let index = match objects.attachment_index(handle) {
                    Some(index) => index,
                    None => {
                        objects.attachments.push(handle);
                        objects.clear_values.push(self.clear_value(handle, desc.format));
                        descriptions.push(self.describe_attachment(pass, handle, desc, slot));
                        objects.attachments.len() - 1
                    }
                };
                let reference = AttachmentReference {
                    attachment: index as u32,
                    layout,
                };
                match slot {
                    Slot::Color => {
                        subpass.color_attachments.push(reference);
                        multisampled.push(desc.sample_count > 1);
                    }
                    Slot::Resolve => resolves.push(reference),
                    Slot::DepthStencil => {
                        assert!(
                            subpass.depth_stencil_attachment.is_none(),
                            "pass '{}' writes more than one depth-stencil attachment",
                            pass.name()
                        );
                        subpass.depth_stencil_attachment = Some(reference);
                    }
                }
            }
            subpass.resolve_attachments = align_resolves(pass, &multisampled, resolves);
            subpasses.push(subpass);

            if pass.has_pre_execute_callback() {
                objects.pre_execute.push(id);
            }
            if pass.has_post_execute_callback() {
                objects.post_execute.push(id);
            }
        }

        // Barriers are evaluated against the state left by earlier steps.
        for &id in step.passes() {
            let pass = self.passes.get(id);
            self.plan_pass_barriers(
                step_index,
                pass,
                &objects.attachments,
                tracker,
                &mut objects.barriers,
            );
        }
        for (handle, desc) in objects.attachments.iter().zip(&descriptions) {
            if desc.load_op == LoadOp::Load {
                // Undefined here means an imported texture on its first use,
                // which enters the graph in its attachment layout.
                let previous = tracker.layouts[handle.index()];
                if previous != ImageLayout::Undefined {
                    tracker.transition(*handle, desc.initial_layout, &mut objects.barriers);
                }
            }
        }

        if let Some(present) = self.present.filter(|_| presents) {
            match objects.attachment_index(present) {
                Some(index) => descriptions[index].final_layout = ImageLayout::PresentSrc,
                // Written outside a render pass, e.g. by a storage write or copy.
                None => tracker.transition(
                    present,
                    ImageLayout::PresentSrc,
                    &mut objects.trailing_barriers,
                ),
            }
        }

        for (handle, desc) in objects.attachments.iter().zip(&descriptions) {
            tracker.layouts[handle.index()] = desc.final_layout;
        }

        if !objects.attachments.is_empty() {
            objects.framebuffer_extent = objects
                .attachments
                .iter()
                .filter_map(|handle| self.resources.get(*handle).extent())
                .fold(Extent3d::default(), Extent3d::max);

            let dependencies = (1..subpasses.len() as u32)
                .map(|dst| SubpassDependency {
                    src_subpass: Some(dst - 1),
                    dst_subpass: Some(dst),
                })
                .collect();
            objects.render_pass = Some(RenderPassDescription {
                label: Some(step.label().to_string()),
                attachments: descriptions,
                subpasses,
                dependencies,
            });
        }

        objects
    }

    fn attachment_slot(
        &self,
        pass: &Pass,
        handle: ResourceHandle,
    ) -> Option<(&'a TextureDescriptor, Slot)> {
        let desc = self.resources.get(handle).texture_descriptor()?;
        if !desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            return None;
        }
        let slot = if pass.resolves().contains(&handle) {
            Slot::Resolve
        } else if desc.format.is_depth_stencil() {
            Slot::DepthStencil
        } else {
            Slot::Color
        };
        Some((desc, slot))
    }

    fn describe_attachment(
        &self,
        pass: &Pass,
        handle: ResourceHandle,
        desc: &TextureDescriptor,
        slot: Slot,
    ) -> AttachmentDescription {
        let load_op = if slot == Slot::Resolve {
            LoadOp::DontCare
        } else if pass.reads_resource(handle) {
            LoadOp::Load
        } else if pass.creates_resource(handle) {
            LoadOp::Clear
        } else {
            LoadOp::DontCare
        };

        let resource = self.resources.get(handle);
        let is_read = resource
            .read_in()
            .iter()
            .any(|reader| !self.cull.is_pass_culled(*reader));
        let store_op = if is_read || resource.is_retained() {
            StoreOp::Store
        } else {
            StoreOp::DontCare
        };

        let (stencil_load_op, stencil_store_op) = if desc.format.has_stencil() {
            (load_op, store_op)
        } else {
            (LoadOp::DontCare, StoreOp::DontCare)
        };

        let layout = attachment_layout(desc.format);
        AttachmentDescription {
            format: desc.format,
            sample_count: desc.sample_count,
            load_op,
            store_op,
            stencil_load_op,
            stencil_store_op,
            initial_layout: if load_op == LoadOp::Load {
                layout
            } else {
                ImageLayout::Undefined
            },
            final_layout: layout,
        }
    }

    fn plan_pass_barriers(
        &self,
        step_index: usize,
        pass: &Pass,
        attachments: &[ResourceHandle],
        tracker: &mut StateTracker,
        barriers: &mut Vec<PlannedBarrier>,
    ) {
        for &handle in pass.reads() {
            if attachments.contains(&handle) {
                continue;
            }
            match self.resources.get(handle).kind() {
                ResourceKind::Texture(desc) => {
                    if let Some(layout) = read_layout(desc) {
                        tracker.access_texture(handle, layout, step_index, barriers);
                    }
                }
                ResourceKind::Buffer(_) => {
                    if tracker.has_unsynced_write(handle, step_index) {
                        barriers.push(PlannedBarrier::Buffer { resource: handle });
                        tracker.unsynced[handle.index()] = false;
                    }
                }
            }
        }

        for &handle in pass.writes() {
            if attachments.contains(&handle) {
                continue;
            }
            match self.resources.get(handle).kind() {
                ResourceKind::Texture(desc) => {
                    if desc.usage.contains(TextureUsage::STORAGE_BINDING) {
                        tracker.access_texture(handle, ImageLayout::General, step_index, barriers);
                        tracker.record_write(handle, step_index);
                    }
                }
                ResourceKind::Buffer(_) => tracker.record_write(handle, step_index),
            }
        }
    }

    fn clear_value(&self, handle: ResourceHandle, format: TextureFormat) -> ClearValue {
        self.resources
            .get(handle)
            .clear_value()
            .unwrap_or_else(|| self.config.default_clear_value(format))
    }
}

/// Pair resolve targets with the multisampled color attachments of `pass`,
/// in declaration order.
fn align_resolves(
    pass: &Pass,
    multisampled: &[bool],
    resolves: Vec<AttachmentReference>,
) -> Vec<Option<AttachmentReference>> {
    if resolves.is_empty() {
        return Vec::new();
    }
    let sources = multisampled.iter().filter(|ms| **ms).count();
    assert!(
        sources == resolves.len(),
        "pass '{}' resolves {} attachments but writes {} multisampled color attachments",
        pass.name(),
        resolves.len(),
        sources
    );
    let mut resolves = resolves.into_iter();
    multisampled
        .iter()
        .map(|ms| if *ms { resolves.next() } else { None })
        .collect()
}

fn attachment_layout(format: TextureFormat) -> ImageLayout {
    if format.is_depth_stencil() {
        ImageLayout::DepthStencilAttachmentOptimal
    } else {
        ImageLayout::ColorAttachmentOptimal
    }
}

/// Layout a non-attachment read expects, `None` for copies.
fn read_layout(desc: &TextureDescriptor) -> Option<ImageLayout> {
    if desc.usage.contains(TextureUsage::TEXTURE_BINDING) {
        if desc.format.is_depth_stencil() {
            Some(ImageLayout::DepthStencilReadOnlyOptimal)
        } else {
            Some(ImageLayout::ShaderReadOnlyOptimal)
        }
    } else if desc.usage.contains(TextureUsage::STORAGE_BINDING) {
        Some(ImageLayout::General)
    } else {
        None
    }
}
