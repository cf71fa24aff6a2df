//! Frame graph resources and their registry.

use crate::backend::{BufferHandle, TextureHandle};
use crate::types::{BufferDescriptor, ClearValue, Extent3d, TextureDescriptor};

use super::handle::{PassId, ResourceHandle};

/// What a frame graph resource is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Texture(TextureDescriptor),
    Buffer(BufferDescriptor),
}

/// A GPU object backing a frame graph resource.
///
/// Supplied by the caller for retained resources, created by the executor
/// for transient ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

/// A texture or buffer declared in the frame graph.
#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    kind: ResourceKind,
    created_by: Option<PassId>,
    imported: Option<GpuResource>,
    read_in: Vec<PassId>,
    write_in: Vec<PassId>,
    version: u32,
    clear_value: Option<ClearValue>,
}

impl Resource {
    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn is_texture(&self) -> bool {
        matches!(self.kind, ResourceKind::Texture(_))
    }

    pub fn texture_descriptor(&self) -> Option<&TextureDescriptor> {
        match &self.kind {
            ResourceKind::Texture(desc) => Some(desc),
            ResourceKind::Buffer(_) => None,
        }
    }

    pub fn buffer_descriptor(&self) -> Option<&BufferDescriptor> {
        match &self.kind {
            ResourceKind::Buffer(desc) => Some(desc),
            ResourceKind::Texture(_) => None,
        }
    }

    /// Extent of a texture, `None` for buffers.
    pub fn extent(&self) -> Option<Extent3d> {
        self.texture_descriptor().map(|desc| desc.size)
    }

    /// Whether the frame graph owns the GPU allocation.
    pub fn is_transient(&self) -> bool {
        self.imported.is_none()
    }

    /// Whether the frame graph wraps a caller-owned GPU object.
    pub fn is_retained(&self) -> bool {
        self.imported.is_some()
    }

    /// Pass whose setup created the resource. `None` for retained resources.
    pub fn created_by(&self) -> Option<PassId> {
        self.created_by
    }

    /// Caller-owned GPU object of a retained resource.
    pub fn imported(&self) -> Option<GpuResource> {
        self.imported
    }

    /// Passes that read the resource, in declaration order.
    pub fn read_in(&self) -> &[PassId] {
        &self.read_in
    }

    /// Passes other than the creator that write the resource, in declaration order.
    pub fn write_in(&self) -> &[PassId] {
        &self.write_in
    }

    /// Latest handle version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Clear value used when the resource is cleared as an attachment.
    pub fn clear_value(&self) -> Option<ClearValue> {
        self.clear_value
    }

    pub(crate) fn set_clear_value(&mut self, value: ClearValue) {
        self.clear_value = Some(value);
    }

    pub(crate) fn add_reader(&mut self, pass: PassId) {
        if !self.read_in.contains(&pass) {
            self.read_in.push(pass);
        }
    }

    pub(crate) fn add_writer(&mut self, pass: PassId) {
        if self.created_by != Some(pass) && !self.write_in.contains(&pass) {
            self.write_in.push(pass);
        }
    }

    pub(crate) fn bump_version(&mut self) -> u32 {
        self.version += 1;
        self.version
    }
}

/// Owns every resource declared for one compile/execute cycle.
///
/// Resources are only ever appended; [`clear`](Self::clear) empties the
/// registry and restarts handle indices at zero.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transient resource created by `creator`.
    pub(crate) fn create(
        &mut self,
        name: impl Into<String>,
        kind: ResourceKind,
        creator: PassId,
    ) -> ResourceHandle {
        self.push(Resource {
            name: name.into(),
            kind,
            created_by: Some(creator),
            imported: None,
            read_in: Vec::new(),
            write_in: Vec::new(),
            version: 0,
            clear_value: None,
        })
    }

    /// Append a retained resource backed by a caller-owned GPU object.
    pub(crate) fn import(
        &mut self,
        name: impl Into<String>,
        kind: ResourceKind,
        imported: GpuResource,
    ) -> ResourceHandle {
        match (&kind, imported) {
            (ResourceKind::Texture(_), GpuResource::Texture(_))
            | (ResourceKind::Buffer(_), GpuResource::Buffer(_)) => {}
            _ => panic!("imported GPU object does not match the resource kind"),
        }
        self.push(Resource {
            name: name.into(),
            kind,
            created_by: None,
            imported: Some(imported),
            read_in: Vec::new(),
            write_in: Vec::new(),
            version: 0,
            clear_value: None,
        })
    }

    fn push(&mut self, resource: Resource) -> ResourceHandle {
        let handle = ResourceHandle::new(self.resources.len());
        self.resources.push(resource);
        handle
    }

    /// Whether `handle` refers to a resource of this registry.
    pub fn contains(&self, handle: ResourceHandle) -> bool {
        handle.is_valid() && handle.index() < self.resources.len()
    }

    /// Look up a resource.
    ///
    /// # Panics
    ///
    /// Panics if the handle is invalid or was not issued by this registry.
    pub fn get(&self, handle: ResourceHandle) -> &Resource {
        assert!(
            self.contains(handle),
            "invalid resource handle {handle:?} ({} resources declared)",
            self.resources.len()
        );
        &self.resources[handle.index()]
    }

    pub(crate) fn get_mut(&mut self, handle: ResourceHandle) -> &mut Resource {
        assert!(
            self.contains(handle),
            "invalid resource handle {handle:?} ({} resources declared)",
            self.resources.len()
        );
        &mut self.resources[handle.index()]
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterate resources with their handles, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceHandle, &Resource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(index, resource)| {
                (
                    ResourceHandle::new(index).with_version(resource.version),
                    resource,
                )
            })
    }

    pub fn clear(&mut self) {
        self.resources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    fn color_desc() -> ResourceKind {
        ResourceKind::Texture(TextureDescriptor::new_2d(
            8,
            8,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        ))
    }

    #[test]
    fn test_create_and_import() {
        let mut registry = ResourceRegistry::new();
        let transient = registry.create("color", color_desc(), PassId::new(0));
        let retained = registry.import(
            "history",
            ResourceKind::Buffer(BufferDescriptor::new(64, BufferUsage::STORAGE)),
            GpuResource::Buffer(BufferHandle(9)),
        );

        assert_eq!(registry.len(), 2);
        assert!(registry.get(transient).is_transient());
        assert_eq!(registry.get(transient).created_by(), Some(PassId::new(0)));
        assert!(registry.get(retained).is_retained());
        assert_eq!(registry.get(retained).created_by(), None);
        assert_eq!(registry.get(retained).extent(), None);
    }

    #[test]
    fn test_creator_is_not_recorded_as_writer() {
        let mut registry = ResourceRegistry::new();
        let handle = registry.create("color", color_desc(), PassId::new(0));
        let resource = registry.get_mut(handle);
        resource.add_writer(PassId::new(0));
        resource.add_writer(PassId::new(2));
        resource.add_writer(PassId::new(2));
        resource.add_reader(PassId::new(1));
        resource.add_reader(PassId::new(1));

        assert_eq!(resource.write_in(), &[PassId::new(2)]);
        assert_eq!(resource.read_in(), &[PassId::new(1)]);
    }

    #[test]
    fn test_clear_restarts_indices() {
        let mut registry = ResourceRegistry::new();
        registry.create("a", color_desc(), PassId::new(0));
        registry.clear();
        assert!(registry.is_empty());
        let handle = registry.create("b", color_desc(), PassId::new(0));
        assert_eq!(handle.index(), 0);
    }

    #[test]
    #[should_panic(expected = "invalid resource handle")]
    fn test_invalid_handle_panics() {
        let registry = ResourceRegistry::new();
        registry.get(ResourceHandle::INVALID);
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_import_kind_mismatch_panics() {
        let mut registry = ResourceRegistry::new();
        registry.import(
            "bad",
            color_desc(),
            GpuResource::Buffer(BufferHandle(1)),
        );
    }
}
