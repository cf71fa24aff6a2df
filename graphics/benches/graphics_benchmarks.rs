use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use lilium_graphics::{
    BufferDescriptor, BufferUsage, Device, DummyDevice, FrameGraph, PresentTarget,
    ResourceHandle, TextureDescriptor, TextureFormat, TextureUsage,
};

fn color_target(name: &str) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        1920,
        1080,
        TextureFormat::Rgba16Float,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
    .with_label(name)
}

/// Shadow, gbuffer, lighting, post chain and a dead debug branch, ending in
/// the present target.
fn declare_deferred(graph: &mut FrameGraph, backbuffer: ResourceHandle) {
    let shadow = *graph
        .add_pass::<ResourceHandle, _, _>(
            "shadow",
            |builder, shadow| {
                *shadow = builder.create_texture(
                    "shadow_map",
                    TextureDescriptor::new_2d(
                        2048,
                        2048,
                        TextureFormat::Depth32Float,
                        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                    ),
                )
            },
            |_, _, cmd| cmd.draw(0..3, 0..1),
        )
        .data();

    let gbuffer = *graph
        .add_pass::<[ResourceHandle; 3], _, _>(
            "gbuffer",
            |builder, targets| {
                *targets = [
                    builder.create_texture("albedo", color_target("albedo")),
                    builder.create_texture("normal", color_target("normal")),
                    builder.create_texture("material", color_target("material")),
                ];
            },
            |_, _, cmd| cmd.draw(0..3, 0..1),
        )
        .data();

    graph.add_pass::<(), _, _>(
        "debug_normals",
        move |builder, _| {
            builder.read(gbuffer[1]);
            builder.create_texture("normal_vis", color_target("normal_vis"));
        },
        |_, _, cmd| cmd.draw(0..3, 0..1),
    );

    let mut hdr = *graph
        .add_pass::<ResourceHandle, _, _>(
            "lighting",
            move |builder, hdr| {
                for target in gbuffer {
                    builder.read(target);
                }
                builder.read(shadow);
                *hdr = builder.create_texture("hdr", color_target("hdr"));
            },
            |_, _, cmd| cmd.draw(0..3, 0..1),
        )
        .data();

    for index in 0..8 {
        let input = hdr;
        hdr = *graph
            .add_pass::<ResourceHandle, _, _>(
                format!("post_{index}"),
                move |builder, output| {
                    builder.read(input);
                    *output = builder.create_texture("post", color_target("post"));
                },
                |_, _, cmd| cmd.draw(0..3, 0..1),
            )
            .data();
    }

    graph.add_pass::<(), _, _>(
        "tonemap",
        move |builder, _| {
            builder.read(hdr);
            builder.write(backbuffer);
        },
        |_, _, cmd| cmd.draw(0..3, 0..1),
    );
}

/// A long chain of compute passes passing a buffer along.
fn declare_chain(graph: &mut FrameGraph, length: usize) {
    let mut buffer = *graph
        .add_pass::<ResourceHandle, _, _>(
            "seed",
            |builder, buffer| {
                *buffer = builder
                    .create_buffer("data_0", BufferDescriptor::new(4096, BufferUsage::STORAGE))
            },
            |_, _, cmd| cmd.dispatch(64, 1, 1),
        )
        .data();
    for index in 1..length {
        let input = buffer;
        buffer = *graph
            .add_pass::<ResourceHandle, _, _>(
                format!("step_{index}"),
                move |builder, output| {
                    builder.read(input);
                    *output = builder.create_buffer(
                        format!("data_{index}"),
                        BufferDescriptor::new(4096, BufferUsage::STORAGE),
                    );
                },
                |_, _, cmd| cmd.dispatch(64, 1, 1),
            )
            .data();
    }
    graph
        .add_pass::<(), _, _>(
            "readback",
            move |builder, _| {
                builder.read(buffer);
            },
            |_, _, cmd| cmd.dispatch(1, 1, 1),
        )
        .set_cull_immune(true);
}

/// Swapchain image owned by the benchmark, presented every iteration.
fn swapchain(device: &DummyDevice) -> PresentTarget {
    let desc = TextureDescriptor::new_2d(
        1920,
        1080,
        TextureFormat::Bgra8UnormSrgb,
        TextureUsage::RENDER_ATTACHMENT,
    );
    let texture = device.create_texture(&desc).unwrap();
    PresentTarget::new(texture, desc)
}

// ---------------------------------------------------------------------------
// Frame graph declaration and compilation
// ---------------------------------------------------------------------------

fn bench_declare_deferred(c: &mut Criterion) {
    let device = Arc::new(DummyDevice::new());
    let target = swapchain(&device);
    let mut graph = FrameGraph::new(device);

    c.bench_function("frame_graph_declare_deferred", |b| {
        b.iter(|| {
            let backbuffer = graph.present_to("backbuffer", target.clone());
            declare_deferred(&mut graph, backbuffer);
            black_box(graph.pass_count());
            graph.reset();
        });
    });
}

fn bench_compile_deferred(c: &mut Criterion) {
    let device = Arc::new(DummyDevice::new());
    let target = swapchain(&device);
    let mut graph = FrameGraph::new(device);

    c.bench_function("frame_graph_compile_deferred", |b| {
        b.iter(|| {
            let backbuffer = graph.present_to("backbuffer", target.clone());
            declare_deferred(&mut graph, backbuffer);
            graph.compile();
            black_box(graph.steps().len());
            graph.reset();
        });
    });
}

fn bench_compile_chain(c: &mut Criterion) {
    let mut graph = FrameGraph::new(Arc::new(DummyDevice::new()));

    c.bench_function("frame_graph_compile_256_pass_chain", |b| {
        b.iter(|| {
            declare_chain(&mut graph, 256);
            graph.compile();
            black_box(graph.steps().len());
            graph.reset();
        });
    });
}

// ---------------------------------------------------------------------------
// Execution on the dummy device
// ---------------------------------------------------------------------------

fn bench_execute_deferred(c: &mut Criterion) {
    let device = Arc::new(DummyDevice::new());
    let mut graph = FrameGraph::new(device.clone());
    let backbuffer = graph.present_to("backbuffer", swapchain(&device));
    declare_deferred(&mut graph, backbuffer);
    graph.compile();

    c.bench_function("frame_graph_execute_deferred", |b| {
        b.iter(|| {
            graph.execute().unwrap();
            device.retire_all();
            device.clear_history();
        });
    });
}

criterion_group!(
    benches,
    bench_declare_deferred,
    bench_compile_deferred,
    bench_compile_chain,
    bench_execute_deferred,
);
criterion_main!(benches);
