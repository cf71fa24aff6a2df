//! Resource declarations made from a pass setup closure.

use crate::types::{BufferDescriptor, ClearValue, TextureDescriptor};

use super::handle::{PassId, ResourceHandle};
use super::pass::Pass;
use super::resource::{Resource, ResourceKind, ResourceRegistry};

/// Declares the resources a pass creates, reads and writes.
///
/// Handed to the setup closure of `FrameGraph::add_pass`. Every declaration
/// is recorded both on the pass and on the resource, which is what the
/// culling and timeline algorithms walk.
pub struct Builder<'a> {
    pass: &'a mut Pass,
    resources: &'a mut ResourceRegistry,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(pass: &'a mut Pass, resources: &'a mut ResourceRegistry) -> Self {
        Self { pass, resources }
    }

    /// Id of the pass being declared.
    pub fn pass_id(&self) -> PassId {
        self.pass.id()
    }

    /// Look up a declared resource.
    pub fn resource(&self, handle: ResourceHandle) -> &Resource {
        self.resources.get(handle)
    }

    /// Declare a transient texture owned by this pass.
    pub fn create_texture(
        &mut self,
        name: impl Into<String>,
        descriptor: TextureDescriptor,
    ) -> ResourceHandle {
        self.create(name.into(), ResourceKind::Texture(descriptor))
    }

    /// Declare a transient buffer owned by this pass.
    pub fn create_buffer(
        &mut self,
        name: impl Into<String>,
        descriptor: BufferDescriptor,
    ) -> ResourceHandle {
        self.create(name.into(), ResourceKind::Buffer(descriptor))
    }

    fn create(&mut self, name: String, kind: ResourceKind) -> ResourceHandle {
        log::trace!("{}: creates '{}'", self.pass.name(), name);
        let handle = self.resources.create(name, kind, self.pass.id());
        self.pass.record_create(handle);
        handle
    }

    /// Declare a read of `handle`.
    pub fn read(&mut self, handle: ResourceHandle) -> ResourceHandle {
        self.check_version(handle, "read");
        self.resources.get_mut(handle).add_reader(self.pass.id());
        self.pass.record_read(handle);
        handle
    }

    /// Declare a write of `handle`.
    ///
    /// Returns the handle with its version bumped; later passes should read
    /// the returned value.
    pub fn write(&mut self, handle: ResourceHandle) -> ResourceHandle {
        self.check_version(handle, "write");
        let resource = self.resources.get_mut(handle);
        resource.add_writer(self.pass.id());
        let version = resource.bump_version();
        self.pass.record_write(handle);
        handle.with_version(version)
    }

    /// Declare `handle` as the multisample resolve target of this pass.
    pub fn resolve(&mut self, handle: ResourceHandle) -> ResourceHandle {
        self.check_version(handle, "resolve");
        let resource = self.resources.get_mut(handle);
        assert!(
            resource.is_texture(),
            "cannot resolve into buffer '{}'",
            resource.name()
        );
        resource.add_writer(self.pass.id());
        let version = resource.bump_version();
        self.pass.record_resolve(handle);
        handle.with_version(version)
    }

    /// Override the clear value used when this resource is cleared as an attachment.
    pub fn set_clear_value(&mut self, handle: ResourceHandle, value: ClearValue) {
        self.resources.get_mut(handle).set_clear_value(value);
    }

    fn check_version(&self, handle: ResourceHandle, access: &str) {
        let resource = self.resources.get(handle);
        if handle.version() != resource.version() {
            log::warn!(
                "{}: {} of '{}' through stale handle {:?} (latest version {})",
                self.pass.name(),
                access,
                resource.name(),
                handle,
                resource.version()
            );
        }
    }
}
