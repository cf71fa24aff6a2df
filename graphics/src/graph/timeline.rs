//! Linear execution timeline.
//!
//! Surviving passes keep their declaration order. Each becomes its own
//! [`Step`] unless it asked to be merged with the previous one, in which case
//! it becomes the next subpass of that step's render pass.
//!
//! A resource is realized in the first step touching it and released after
//! the last step touching it, where "touching" covers the creator, every
//! reader and every writer. Retained resources are bound instead of created
//! and are never released.

use super::cull::CullResult;
use super::gpu_objects::StepObjects;
use super::handle::{PassId, ResourceHandle};
use super::pass::PassRegistry;
use super::resource::ResourceRegistry;

/// A group of passes recorded into one command buffer and one submission.
#[derive(Debug, Clone, Default)]
pub struct Step {
    label: String,
    passes: Vec<PassId>,
    realize: Vec<ResourceHandle>,
    derealize: Vec<ResourceHandle>,
    pub(crate) objects: StepObjects,
}

impl Step {
    /// Names of the grouped passes joined with `+`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Grouped passes in declaration order.
    pub fn passes(&self) -> &[PassId] {
        &self.passes
    }

    /// Resources that must exist before the step executes.
    pub fn realize(&self) -> &[ResourceHandle] {
        &self.realize
    }

    /// Resources released once the step's submission has retired.
    pub fn derealize(&self) -> &[ResourceHandle] {
        &self.derealize
    }

    /// Attachments, render pass and barriers derived for the step.
    pub fn objects(&self) -> &StepObjects {
        &self.objects
    }
}

/// Builds the timeline of a culled graph.
pub struct TimelineBuilder<'a> {
    passes: &'a PassRegistry,
    resources: &'a ResourceRegistry,
    cull: &'a CullResult,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(
        passes: &'a PassRegistry,
        resources: &'a ResourceRegistry,
        cull: &'a CullResult,
    ) -> Self {
        Self {
            passes,
            resources,
            cull,
        }
    }

    pub fn build(&self) -> Vec<Step> {
        crate::profile_function!();

        let mut steps: Vec<Step> = Vec::new();
        let mut step_of_pass: Vec<Option<usize>> = vec![None; self.passes.len()];

        for id in self.cull.surviving_passes() {
            let pass = self.passes.get(id);
            match steps.last_mut() {
                Some(step) if pass.merges_with_previous() => {
                    step.label.push('+');
                    step.label.push_str(pass.name());
                    step.passes.push(id);
                }
                _ => {
                    if pass.merges_with_previous() {
                        log::debug!(
                            "{}: nothing to merge with, starting a new step",
                            pass.name()
                        );
                    }
                    steps.push(Step {
                        label: pass.name().to_string(),
                        passes: vec![id],
                        ..Step::default()
                    });
                }
            }
            step_of_pass[id.index()] = Some(steps.len() - 1);
        }

        for (handle, resource) in self.resources.iter() {
            if self.cull.is_resource_culled(handle) {
                continue;
            }

            let mut users = resource
                .created_by()
                .into_iter()
                .chain(resource.read_in().iter().copied())
                .chain(resource.write_in().iter().copied())
                .filter_map(|pass| step_of_pass[pass.index()]);
            let Some(first_use) = users.next() else {
                continue;
            };
            let (first, last) = users.fold((first_use, first_use), |(first, last), step| {
                (first.min(step), last.max(step))
            });

            steps[first].realize.push(handle);
            if resource.is_transient() {
                steps[last].derealize.push(handle);
            }
        }

        log::debug!(
            "Timeline: {} steps from {} surviving passes",
            steps.len(),
            self.passes.len() - self.cull.culled_pass_count()
        );
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureHandle;
    use crate::graph::builder::Builder;
    use crate::graph::cull::Culler;
    use crate::graph::pass::Pass;
    use crate::graph::resource::{GpuResource, ResourceKind};
    use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

    fn desc() -> TextureDescriptor {
        TextureDescriptor::new_2d(
            8,
            8,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
    }

    #[derive(Default)]
    struct Graph {
        passes: PassRegistry,
        resources: ResourceRegistry,
    }

    impl Graph {
        fn pass(&mut self, name: &str, setup: impl FnOnce(&mut Builder)) -> PassId {
            let id = self.passes.next_id();
            let pass = self.passes.push(Pass::new(id, name, (), |_, _, _| {}));
            setup(&mut Builder::new(pass, &mut self.resources));
            id
        }

        fn steps(&self) -> Vec<Step> {
            let cull = Culler::new().cull(&self.passes, &self.resources);
            TimelineBuilder::new(&self.passes, &self.resources, &cull).build()
        }
    }

    #[test]
    fn test_chain_with_immune_sink() {
        let mut graph = Graph::default();
        let mut t1 = ResourceHandle::INVALID;
        let mut t2 = ResourceHandle::INVALID;
        let a = graph.pass("A", |b| t1 = b.create_texture("T1", desc()));
        let bp = graph.pass("B", |b| {
            b.read(t1);
            t2 = b.create_texture("T2", desc());
        });
        let c = graph.pass("C", |b| {
            b.read(t2);
        });
        graph.passes.get_mut(c).set_cull_immune(true);

        let steps = graph.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].passes(), &[a]);
        assert_eq!(steps[1].passes(), &[bp]);
        assert_eq!(steps[2].passes(), &[c]);
        assert_eq!(steps[0].realize(), &[t1]);
        assert!(steps[0].derealize().is_empty());
        assert_eq!(steps[1].realize(), &[t2]);
        assert_eq!(steps[1].derealize(), &[t1]);
        assert_eq!(steps[2].derealize(), &[t2]);
    }

    #[test]
    fn test_unused_output_of_immune_pass_is_released_in_place() {
        let mut graph = Graph::default();
        let mut t4 = ResourceHandle::INVALID;
        let e = graph.pass("E", |b| t4 = b.create_texture("T4", desc()));
        graph.passes.get_mut(e).set_cull_immune(true);

        let steps = graph.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].realize(), &[t4]);
        assert_eq!(steps[0].derealize(), &[t4]);
    }

    #[test]
    fn test_later_writer_extends_lifetime() {
        let mut graph = Graph::default();
        let mut t1 = ResourceHandle::INVALID;
        graph.pass("create", |b| t1 = b.create_texture("T1", desc()));
        let read = graph.pass("read", |b| {
            b.read(t1);
        });
        let annotate = graph.pass("annotate", |b| {
            b.write(t1);
        });
        graph.passes.get_mut(read).set_cull_immune(true);
        graph.passes.get_mut(annotate).set_cull_immune(true);

        let steps = graph.steps();
        assert_eq!(steps.len(), 3);
        assert!(steps[1].derealize().is_empty());
        assert_eq!(steps[2].derealize(), &[t1]);
    }

    #[test]
    fn test_merged_passes_share_a_step() {
        let mut graph = Graph::default();
        let mut gbuffer = ResourceHandle::INVALID;
        let geometry = graph.pass("geometry", |b| gbuffer = b.create_texture("gbuffer", desc()));
        let lighting = graph.pass("lighting", |b| {
            b.read(gbuffer);
        });
        graph.passes.get_mut(lighting).set_cull_immune(true).set_merge_with_previous(true);

        let steps = graph.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].passes(), &[geometry, lighting]);
        assert_eq!(steps[0].label(), "geometry+lighting");
        assert_eq!(steps[0].realize(), &[gbuffer]);
        assert_eq!(steps[0].derealize(), &[gbuffer]);
    }

    #[test]
    fn test_retained_resource_is_never_released() {
        let mut graph = Graph::default();
        let backbuffer = graph.resources.import(
            "backbuffer",
            ResourceKind::Texture(desc()),
            GpuResource::Texture(TextureHandle(3)),
        );
        graph.pass("draw", |b| {
            b.write(backbuffer);
        });

        let steps = graph.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].realize(), &[backbuffer]);
        assert!(steps[0].derealize().is_empty());
    }

    #[test]
    fn test_culled_creator_realizes_at_first_survivor() {
        let mut graph = Graph::default();
        let mut t1 = ResourceHandle::INVALID;
        graph.pass("A", |b| t1 = b.create_texture("T1", desc()));
        let debug = graph.pass("debug", |b| {
            b.write(t1);
        });
        graph.passes.get_mut(debug).set_cull_immune(true);

        let steps = graph.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].passes(), &[debug]);
        assert_eq!(steps[0].realize(), &[t1]);
        assert_eq!(steps[0].derealize(), &[t1]);
    }
}
