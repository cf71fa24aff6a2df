//! Common utilities for frame graph integration tests.
//!
//! Graphs are declared from a compact table of [`PassDecl`]s so the same
//! property checks can run over many topologies with `rstest` cases.

use std::collections::HashMap;
use std::sync::Arc;

use lilium_graphics::{
    Device, DummyDevice, FrameGraph, PassId, PresentTarget, ResourceHandle, TextureDescriptor,
    TextureFormat, TextureUsage,
};

/// Name of the present target declared by [`Declared::present`].
pub const BACKBUFFER: &str = "backbuffer";

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A fresh graph on a dummy device, keeping the concrete device for inspection.
pub fn dummy_graph() -> (Arc<DummyDevice>, FrameGraph) {
    init_logging();
    let device = Arc::new(DummyDevice::new());
    let graph = FrameGraph::new(device.clone());
    (device, graph)
}

/// A sampled color render target.
pub fn color_target(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        width,
        height,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
}

// ============================================================================
// Pass tables
// ============================================================================

/// One row of a pass table.
#[derive(Debug, Clone, Copy)]
pub struct PassDecl {
    pub name: &'static str,
    pub creates: &'static [&'static str],
    pub reads: &'static [&'static str],
    pub writes: &'static [&'static str],
    pub cull_immune: bool,
    pub merge: bool,
}

impl PassDecl {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            creates: &[],
            reads: &[],
            writes: &[],
            cull_immune: false,
            merge: false,
        }
    }

    pub const fn creates(mut self, names: &'static [&'static str]) -> Self {
        self.creates = names;
        self
    }

    pub const fn reads(mut self, names: &'static [&'static str]) -> Self {
        self.reads = names;
        self
    }

    pub const fn writes(mut self, names: &'static [&'static str]) -> Self {
        self.writes = names;
        self
    }

    pub const fn immune(mut self) -> Self {
        self.cull_immune = true;
        self
    }

    pub const fn merged(mut self) -> Self {
        self.merge = true;
        self
    }
}

/// Handles and pass ids of a declared table, by name.
#[derive(Debug, Default)]
pub struct Declared {
    pub resources: HashMap<String, ResourceHandle>,
    pub passes: HashMap<String, PassId>,
    /// Pass ids in declaration order.
    pub order: Vec<PassId>,
}

impl Declared {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare [`BACKBUFFER`] as the present target, backed by a texture the
    /// test owns.
    pub fn present(&mut self, device: &DummyDevice, graph: &mut FrameGraph) -> ResourceHandle {
        let desc = color_target(64, 64);
        let texture = device
            .create_texture(&desc)
            .expect("dummy device creates the swapchain image");
        let handle = graph.present_to(BACKBUFFER, PresentTarget::new(texture, desc));
        self.resources.insert(BACKBUFFER.to_string(), handle);
        handle
    }

    /// Declare every pass of `table` in order.
    ///
    /// Reads are declared before writes, and every write replaces the stored
    /// handle with the bumped version.
    pub fn declare(&mut self, graph: &mut FrameGraph, table: &[PassDecl]) {
        for decl in table {
            let resources = &mut self.resources;
            let mut pass = graph.add_pass::<(), _, _>(
                decl.name,
                |builder, _| {
                    for name in decl.reads {
                        builder.read(resources[*name]);
                    }
                    for name in decl.creates {
                        let handle = builder.create_texture(*name, color_target(64, 64));
                        resources.insert(name.to_string(), handle);
                    }
                    for name in decl.writes {
                        let handle = builder.write(resources[*name]);
                        resources.insert(name.to_string(), handle);
                    }
                },
                |_, _, cmd| cmd.draw(0..3, 0..1),
            );
            pass.set_cull_immune(decl.cull_immune)
                .set_merge_with_previous(decl.merge);
            let id = pass.id();
            self.passes.insert(decl.name.to_string(), id);
            self.order.push(id);
        }
    }

    pub fn resource(&self, name: &str) -> ResourceHandle {
        self.resources[name]
    }

    pub fn pass(&self, name: &str) -> PassId {
        self.passes[name]
    }
}

// ============================================================================
// Topologies
// ============================================================================

/// Three passes, the last one cull-immune.
pub const SCENARIO_A: &[PassDecl] = &[
    PassDecl::new("A").creates(&["T1"]),
    PassDecl::new("B").reads(&["T1"]).creates(&["T2"]),
    PassDecl::new("C").reads(&["T2"]).immune(),
];

/// A pass nobody depends on.
pub const SCENARIO_D: &[PassDecl] = &[PassDecl::new("D").creates(&["T3"])];

/// A cull-immune pass creating a texture nobody reads.
pub const SCENARIO_E: &[PassDecl] = &[PassDecl::new("E").creates(&["T4"]).immune()];

/// Deferred renderer ending in [`BACKBUFFER`], with a dead debug branch.
pub const DEFERRED: &[PassDecl] = &[
    PassDecl::new("shadow").creates(&["shadow_map"]),
    PassDecl::new("gbuffer").creates(&["albedo", "normal", "depth"]),
    PassDecl::new("debug_normals")
        .reads(&["normal"])
        .creates(&["normal_vis"]),
    PassDecl::new("lighting")
        .reads(&["albedo", "normal", "depth", "shadow_map"])
        .creates(&["hdr"]),
    PassDecl::new("bloom").reads(&["hdr"]).creates(&["bloom"]),
    PassDecl::new("tonemap")
        .reads(&["hdr", "bloom"])
        .writes(&[BACKBUFFER]),
    PassDecl::new("ui")
        .reads(&[BACKBUFFER])
        .writes(&[BACKBUFFER])
        .merged(),
];

/// Chain where a later pass only writes an earlier resource.
pub const OVERWRITE: &[PassDecl] = &[
    PassDecl::new("produce").creates(&["scratch"]),
    PassDecl::new("consume")
        .reads(&["scratch"])
        .creates(&["result"]),
    PassDecl::new("stamp").writes(&["scratch"]),
    PassDecl::new("present").reads(&["result"]).writes(&[BACKBUFFER]),
];

/// Two independent chains, only one of which reaches a cull-immune pass.
pub const FORKED: &[PassDecl] = &[
    PassDecl::new("left_0").creates(&["left_a"]),
    PassDecl::new("right_0").creates(&["right_a"]),
    PassDecl::new("left_1").reads(&["left_a"]).creates(&["left_b"]),
    PassDecl::new("right_1")
        .reads(&["right_a"])
        .creates(&["right_b"]),
    PassDecl::new("left_2").reads(&["left_b"]).immune(),
    PassDecl::new("right_2").reads(&["right_b"]).creates(&["right_c"]),
];

/// Whether `table` references [`BACKBUFFER`].
pub fn uses_backbuffer(table: &[PassDecl]) -> bool {
    table.iter().any(|decl| {
        decl.reads.contains(&BACKBUFFER) || decl.writes.contains(&BACKBUFFER)
    })
}

/// Declare `table` on a fresh dummy graph, with a present target if the
/// table references one.
pub fn declare_table(table: &[PassDecl]) -> (Arc<DummyDevice>, FrameGraph, Declared) {
    let (device, mut graph) = dummy_graph();
    let mut declared = Declared::new();
    if uses_backbuffer(table) {
        declared.present(&device, &mut graph);
    }
    declared.declare(&mut graph, table);
    (device, graph, declared)
}
