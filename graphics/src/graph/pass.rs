//! Frame graph passes.
//!
//! A [`Pass`] owns the typed data its setup closure filled in, together with
//! the type-erased execute callback operating on that data. Callers get the
//! typed view back through [`PassRef`].

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::backend::CommandBuffer;

use super::executor::Resources;
use super::handle::{PassId, ResourceHandle};

/// Erased pass body: receives the pass data as `&dyn Any`.
pub(crate) type ExecuteFn = Box<dyn Fn(&dyn Any, &Resources<'_>, &mut CommandBuffer)>;

/// Callback recorded before or after the render pass scope of a step.
pub type CommandCallback = Box<dyn Fn(&Resources<'_>, &mut CommandBuffer)>;

/// A unit of GPU work declared in the frame graph.
pub struct Pass {
    id: PassId,
    name: String,
    reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
    creates: Vec<ResourceHandle>,
    resolves: Vec<ResourceHandle>,
    cull_immune: bool,
    merge_with_previous: bool,
    uses_sub_command_buffers: bool,
    data: Box<dyn Any>,
    execute: ExecuteFn,
    pre_execute: Option<CommandCallback>,
    post_execute: Option<CommandCallback>,
}

impl Pass {
    pub(crate) fn new<D: 'static>(
        id: PassId,
        name: impl Into<String>,
        data: D,
        execute: impl Fn(&D, &Resources<'_>, &mut CommandBuffer) + 'static,
    ) -> Self {
        let execute: ExecuteFn = Box::new(move |data, resources, cmd| {
            let Some(data) = data.downcast_ref::<D>() else {
                unreachable!("pass data type is fixed at construction");
            };
            execute(data, resources, cmd);
        });
        Self {
            id,
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            creates: Vec::new(),
            resolves: Vec::new(),
            cull_immune: false,
            merge_with_previous: false,
            uses_sub_command_buffers: false,
            data: Box::new(data),
            execute,
            pre_execute: None,
            post_execute: None,
        }
    }

    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resources read by the pass, in declaration order.
    pub fn reads(&self) -> &[ResourceHandle] {
        &self.reads
    }

    /// Resources written by the pass, including the ones it created or resolves into.
    pub fn writes(&self) -> &[ResourceHandle] {
        &self.writes
    }

    pub fn creates(&self) -> &[ResourceHandle] {
        &self.creates
    }

    /// Multisample resolve targets written by the pass.
    pub fn resolves(&self) -> &[ResourceHandle] {
        &self.resolves
    }

    pub fn reads_resource(&self, handle: ResourceHandle) -> bool {
        self.reads.contains(&handle)
    }

    pub fn writes_resource(&self, handle: ResourceHandle) -> bool {
        self.writes.contains(&handle)
    }

    pub fn creates_resource(&self, handle: ResourceHandle) -> bool {
        self.creates.contains(&handle)
    }

    /// Whether the pass touches `handle` in any way.
    pub fn uses_resource(&self, handle: ResourceHandle) -> bool {
        self.reads_resource(handle) || self.writes_resource(handle)
    }

    pub fn is_cull_immune(&self) -> bool {
        self.cull_immune
    }

    pub fn merges_with_previous(&self) -> bool {
        self.merge_with_previous
    }

    pub fn uses_sub_command_buffers(&self) -> bool {
        self.uses_sub_command_buffers
    }

    pub fn has_pre_execute_callback(&self) -> bool {
        self.pre_execute.is_some()
    }

    pub fn has_post_execute_callback(&self) -> bool {
        self.post_execute.is_some()
    }

    /// Keep the pass even if nothing reads what it writes.
    ///
    /// Passes with side effects outside the graph (readback, presentation)
    /// must be marked immune or they are culled.
    pub fn set_cull_immune(&mut self, immune: bool) -> &mut Self {
        self.cull_immune = immune;
        self
    }

    /// Group the pass with the previous surviving pass into one step, as the
    /// next subpass of the same render pass.
    pub fn set_merge_with_previous(&mut self, merge: bool) -> &mut Self {
        self.merge_with_previous = merge;
        self
    }

    /// Record the body into a secondary command buffer.
    pub fn set_uses_sub_command_buffers(&mut self, enabled: bool) -> &mut Self {
        self.uses_sub_command_buffers = enabled;
        self
    }

    /// Record `callback` before the render pass of the step containing this pass.
    pub fn set_pre_execute_callback(
        &mut self,
        callback: impl Fn(&Resources<'_>, &mut CommandBuffer) + 'static,
    ) -> &mut Self {
        self.pre_execute = Some(Box::new(callback));
        self
    }

    /// Record `callback` after the render pass of the step containing this pass.
    pub fn set_post_execute_callback(
        &mut self,
        callback: impl Fn(&Resources<'_>, &mut CommandBuffer) + 'static,
    ) -> &mut Self {
        self.post_execute = Some(Box::new(callback));
        self
    }

    pub(crate) fn record_read(&mut self, handle: ResourceHandle) {
        insert_ordered(&mut self.reads, handle);
    }

    pub(crate) fn record_write(&mut self, handle: ResourceHandle) {
        insert_ordered(&mut self.writes, handle);
    }

    pub(crate) fn record_create(&mut self, handle: ResourceHandle) {
        insert_ordered(&mut self.creates, handle);
        insert_ordered(&mut self.writes, handle);
    }

    pub(crate) fn record_resolve(&mut self, handle: ResourceHandle) {
        insert_ordered(&mut self.resolves, handle);
        insert_ordered(&mut self.writes, handle);
    }

    /// Replace the pass data. `D` must be the type the pass was created with.
    pub(crate) fn set_data<D: 'static>(&mut self, data: D) {
        debug_assert!(self.data.is::<D>(), "pass data type changed");
        self.data = Box::new(data);
    }

    pub(crate) fn execute(&self, resources: &Resources<'_>, cmd: &mut CommandBuffer) {
        (self.execute)(self.data.as_ref(), resources, cmd);
    }

    pub(crate) fn pre_execute(&self, resources: &Resources<'_>, cmd: &mut CommandBuffer) {
        if let Some(callback) = &self.pre_execute {
            callback(resources, cmd);
        }
    }

    pub(crate) fn post_execute(&self, resources: &Resources<'_>, cmd: &mut CommandBuffer) {
        if let Some(callback) = &self.post_execute {
            callback(resources, cmd);
        }
    }
}

fn insert_ordered(set: &mut Vec<ResourceHandle>, handle: ResourceHandle) {
    if !set.contains(&handle) {
        set.push(handle);
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("creates", &self.creates)
            .field("resolves", &self.resolves)
            .field("cull_immune", &self.cull_immune)
            .field("merge_with_previous", &self.merge_with_previous)
            .finish_non_exhaustive()
    }
}

/// Typed access to a pass returned by `FrameGraph::add_pass`.
///
/// Dereferences to [`Pass`] for configuration.
pub struct PassRef<'a, D> {
    pass: &'a mut Pass,
    _data: PhantomData<D>,
}

impl<'a, D: 'static> PassRef<'a, D> {
    pub(crate) fn new(pass: &'a mut Pass) -> Self {
        Self {
            pass,
            _data: PhantomData,
        }
    }

    /// The data filled in by the setup closure.
    pub fn data(&self) -> &D {
        let Some(data) = self.pass.data.downcast_ref::<D>() else {
            unreachable!("pass data type is fixed at construction");
        };
        data
    }
}

impl<D> Deref for PassRef<'_, D> {
    type Target = Pass;

    fn deref(&self) -> &Pass {
        self.pass
    }
}

impl<D> DerefMut for PassRef<'_, D> {
    fn deref_mut(&mut self) -> &mut Pass {
        self.pass
    }
}

/// Owns every pass declared for one compile/execute cycle, in declaration order.
#[derive(Debug, Default)]
pub struct PassRegistry {
    passes: Vec<Pass>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next pushed pass will get.
    pub(crate) fn next_id(&self) -> PassId {
        PassId::new(self.passes.len())
    }

    pub(crate) fn push(&mut self, pass: Pass) -> &mut Pass {
        debug_assert_eq!(pass.id, self.next_id());
        self.passes.push(pass);
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    /// Look up a pass.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn get(&self, id: PassId) -> &Pass {
        assert!(
            id.index() < self.passes.len(),
            "invalid pass id {id} ({} passes declared)",
            self.passes.len()
        );
        &self.passes[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: PassId) -> &mut Pass {
        assert!(
            id.index() < self.passes.len(),
            "invalid pass id {id} ({} passes declared)",
            self.passes.len()
        );
        &mut self.passes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pass> {
        self.passes.iter()
    }

    pub fn clear(&mut self) {
        self.passes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Data {
        value: u32,
    }

    #[test]
    fn test_create_records_write() {
        let mut pass = Pass::new(PassId::new(0), "gbuffer", Data::default(), |_, _, _| {});
        let handle = ResourceHandle::new(0);
        pass.record_create(handle);
        pass.record_write(handle.with_version(1));

        assert_eq!(pass.creates(), &[handle]);
        assert_eq!(pass.writes().len(), 1);
        assert!(pass.writes_resource(handle));
        assert!(!pass.reads_resource(handle));
    }

    #[test]
    fn test_resolve_records_write() {
        let mut pass = Pass::new(PassId::new(0), "msaa", Data::default(), |_, _, _| {});
        pass.record_resolve(ResourceHandle::new(2));
        assert_eq!(pass.resolves(), &[ResourceHandle::new(2)]);
        assert_eq!(pass.writes(), &[ResourceHandle::new(2)]);
    }

    #[test]
    fn test_pass_ref_data() {
        let mut registry = PassRegistry::new();
        let id = registry.next_id();
        let pass = registry.push(Pass::new(id, "p", Data { value: 7 }, |_, _, _| {}));
        let mut pass_ref = PassRef::<Data>::new(pass);
        pass_ref.set_cull_immune(true);

        assert_eq!(pass_ref.data().value, 7);
        assert!(registry.get(id).is_cull_immune());
    }

    #[test]
    #[should_panic(expected = "invalid pass id")]
    fn test_invalid_pass_id_panics() {
        let registry = PassRegistry::new();
        registry.get(PassId::new(0));
    }
}
