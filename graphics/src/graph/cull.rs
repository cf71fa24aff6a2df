//! Reference-counting culling of passes and resources.
//!
//! A pass is referenced once per resource it writes, a resource once per pass
//! reading it. Starting from the transient resources nobody reads, the culler
//! walks backwards: releasing a resource releases one reference of each pass
//! producing it, and a pass that loses all references releases the resources
//! it reads. Retained resources are never released, so everything that feeds
//! them survives.
//!
//! Only reads keep a resource alive. A pass whose output leaves the graph by
//! other means has to be marked cull-immune.

use super::handle::{PassId, ResourceHandle};
use super::pass::PassRegistry;
use super::resource::ResourceRegistry;

/// Which passes and resources were removed by a cull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CullResult {
    culled_passes: Vec<bool>,
    culled_resources: Vec<bool>,
}

impl CullResult {
    pub fn is_pass_culled(&self, id: PassId) -> bool {
        self.culled_passes[id.index()]
    }

    pub fn is_resource_culled(&self, handle: ResourceHandle) -> bool {
        self.culled_resources[handle.index()]
    }

    /// Passes that survived, in declaration order.
    pub fn surviving_passes(&self) -> impl Iterator<Item = PassId> + '_ {
        self.culled_passes
            .iter()
            .enumerate()
            .filter(|(_, culled)| !**culled)
            .map(|(index, _)| PassId::new(index))
    }

    pub fn culled_pass_count(&self) -> usize {
        self.culled_passes.iter().filter(|culled| **culled).count()
    }

    pub fn culled_resource_count(&self) -> usize {
        self.culled_resources.iter().filter(|culled| **culled).count()
    }
}

/// Runs the culling worklist.
///
/// Reference counts live in scratch arrays owned by the culler and rebuilt on
/// every call, so repeated compiles never observe counts from an earlier run.
#[derive(Debug, Default)]
pub struct Culler {
    pass_refs: Vec<u32>,
    resource_refs: Vec<u32>,
    stack: Vec<ResourceHandle>,
}

impl Culler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cull(&mut self, passes: &PassRegistry, resources: &ResourceRegistry) -> CullResult {
        crate::profile_function!();

        self.pass_refs.clear();
        self.pass_refs
            .extend(passes.iter().map(|pass| pass.writes().len() as u32));

        self.resource_refs.clear();
        self.resource_refs
            .extend(resources.iter().map(|(_, res)| res.read_in().len() as u32));

        self.stack.clear();
        self.stack.extend(
            resources
                .iter()
                .filter(|(handle, res)| {
                    res.is_transient() && self.resource_refs[handle.index()] == 0
                })
                .map(|(handle, _)| handle),
        );

        while let Some(handle) = self.stack.pop() {
            let resource = resources.get(handle);
            for producer in resource.created_by().iter().chain(resource.write_in()) {
                let refs = &mut self.pass_refs[producer.index()];
                debug_assert!(*refs > 0, "pass {producer} released twice");
                *refs -= 1;
                if *refs != 0 {
                    continue;
                }

                let pass = passes.get(*producer);
                if pass.is_cull_immune() {
                    continue;
                }
                for read in pass.reads() {
                    let refs = &mut self.resource_refs[read.index()];
                    *refs -= 1;
                    if *refs == 0 && resources.get(*read).is_transient() {
                        self.stack.push(*read);
                    }
                }
            }
        }

        let culled_passes: Vec<bool> = passes
            .iter()
            .map(|pass| self.pass_refs[pass.id().index()] == 0 && !pass.is_cull_immune())
            .collect();

        let mut used = vec![false; resources.len()];
        for pass in passes.iter().filter(|pass| !culled_passes[pass.id().index()]) {
            for handle in pass.reads().iter().chain(pass.writes()) {
                used[handle.index()] = true;
            }
        }
        let culled_resources = resources
            .iter()
            .map(|(handle, res)| res.is_transient() && !used[handle.index()])
            .collect();

        let result = CullResult {
            culled_passes,
            culled_resources,
        };
        log::debug!(
            "Culled {}/{} passes and {}/{} resources",
            result.culled_pass_count(),
            passes.len(),
            result.culled_resource_count(),
            resources.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureHandle;
    use crate::graph::builder::Builder;
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

    fn declare(
        passes: &mut PassRegistry,
        resources: &mut ResourceRegistry,
        name: &str,
        setup: impl FnOnce(&mut Builder),
    ) -> PassId {
        let id = passes.next_id();
        let pass = passes.push(Pass::new(id, name, (), |_, _, _| {}));
        setup(&mut Builder::new(pass, resources));
        id
    }

    #[test]
    fn test_unread_output_is_culled() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        let mut t3 = ResourceHandle::INVALID;
        let d = declare(&mut passes, &mut resources, "D", |b| {
            t3 = b.create_texture("T3", desc());
        });

        let result = Culler::new().cull(&passes, &resources);
        assert!(result.is_pass_culled(d));
        assert!(result.is_resource_culled(t3));
        assert_eq!(result.surviving_passes().count(), 0);
    }

    #[test]
    fn test_culling_propagates_through_reads() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        let mut t1 = ResourceHandle::INVALID;
        let mut t2 = ResourceHandle::INVALID;
        let a = declare(&mut passes, &mut resources, "A", |b| {
            t1 = b.create_texture("T1", desc());
        });
        let bp = declare(&mut passes, &mut resources, "B", |b| {
            b.read(t1);
            t2 = b.create_texture("T2", desc());
        });

        let result = Culler::new().cull(&passes, &resources);
        assert!(result.is_pass_culled(a));
        assert!(result.is_pass_culled(bp));
        assert!(result.is_resource_culled(t1));
        assert!(result.is_resource_culled(t2));
    }

    #[test]
    fn test_pass_without_writes_is_culled() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        let mut t1 = ResourceHandle::INVALID;
        let a = declare(&mut passes, &mut resources, "A", |b| {
            t1 = b.create_texture("T1", desc());
        });
        let c = declare(&mut passes, &mut resources, "C", |b| {
            b.read(t1);
        });

        let result = Culler::new().cull(&passes, &resources);
        assert!(result.is_pass_culled(c));
        // C never had a reference to lose, so it never releases T1.
        assert!(!result.is_pass_culled(a));
    }

    #[test]
    fn test_immune_pass_keeps_its_inputs() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        let mut t1 = ResourceHandle::INVALID;
        let a = declare(&mut passes, &mut resources, "A", |b| {
            t1 = b.create_texture("T1", desc());
        });
        let c = declare(&mut passes, &mut resources, "C", |b| {
            b.read(t1);
        });
        let unused = declare(&mut passes, &mut resources, "unused", |b| {
            b.create_texture("scratch", desc());
        });
        passes.get_mut(c).set_cull_immune(true);

        let result = Culler::new().cull(&passes, &resources);
        assert!(!result.is_pass_culled(a));
        assert!(!result.is_pass_culled(c));
        assert!(!result.is_resource_culled(t1));
        assert!(result.is_pass_culled(unused));
    }

    #[test]
    fn test_writer_of_retained_resource_survives() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        let backbuffer = resources.import(
            "backbuffer",
            ResourceKind::Texture(desc()),
            GpuResource::Texture(TextureHandle(1)),
        );
        let mut t1 = ResourceHandle::INVALID;
        let a = declare(&mut passes, &mut resources, "A", |b| {
            t1 = b.create_texture("T1", desc());
        });
        let blit = declare(&mut passes, &mut resources, "blit", |b| {
            b.read(t1);
            b.write(backbuffer);
        });

        let result = Culler::new().cull(&passes, &resources);
        assert!(!result.is_pass_culled(a));
        assert!(!result.is_pass_culled(blit));
        assert!(!result.is_resource_culled(backbuffer));
        assert_eq!(result.culled_pass_count(), 0);
    }

    #[test]
    fn test_writes_do_not_keep_resource_alive() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        let mut t1 = ResourceHandle::INVALID;
        let a = declare(&mut passes, &mut resources, "A", |b| {
            t1 = b.create_texture("T1", desc());
        });
        let overwrite = declare(&mut passes, &mut resources, "overwrite", |b| {
            b.write(t1);
        });

        let result = Culler::new().cull(&passes, &resources);
        assert!(result.is_pass_culled(a));
        assert!(result.is_pass_culled(overwrite));
        assert!(result.is_resource_culled(t1));
    }

    #[test]
    fn test_immune_pass_keeps_resource_of_culled_creator() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        let mut t1 = ResourceHandle::INVALID;
        let a = declare(&mut passes, &mut resources, "A", |b| {
            t1 = b.create_texture("T1", desc());
        });
        let debug = declare(&mut passes, &mut resources, "debug", |b| {
            b.write(t1);
        });
        passes.get_mut(debug).set_cull_immune(true);

        let result = Culler::new().cull(&passes, &resources);
        assert!(result.is_pass_culled(a));
        assert!(!result.is_pass_culled(debug));
        assert!(!result.is_resource_culled(t1));
    }

    #[test]
    fn test_counts_are_rebuilt_per_call() {
        let mut passes = PassRegistry::new();
        let mut resources = ResourceRegistry::new();
        declare(&mut passes, &mut resources, "D", |b| {
            b.create_texture("T3", desc());
        });

        let mut culler = Culler::new();
        let first = culler.cull(&passes, &resources);
        let second = culler.cull(&passes, &resources);
        assert_eq!(first, second);
    }
}
