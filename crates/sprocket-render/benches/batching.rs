//! Benchmarks for per-frame batching work against the recording backend

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::Vec2;
use sprocket_render::{Graphic, RecordingBackend, Renderer2D, RendererDescriptor, TextureRegion, Viewport};

fn populated(count: usize, textures: u32) -> (Renderer2D<RecordingBackend>, Vec<sprocket_render::GraphicId>) {
    let mut renderer = Renderer2D::new(
        RecordingBackend::new(1920, 1080),
        RendererDescriptor::new().with_capacity(count, count * 3),
    );
    let regions: Vec<_> = (1..=textures)
        .map(|id| Arc::new(TextureRegion::loaded(id, false, [0.0, 0.0, 1.0, 1.0])))
        .collect();
    let ids = (0..count)
        .map(|i| {
            let texture = regions[i % regions.len()].clone();
            renderer.add(
                Graphic::sprite(Some(texture))
                    .with_position(Vec2::new((i % 100) as f32 * 10.0, (i / 100) as f32 * 10.0))
                    .with_size(Vec2::splat(8.0)),
            )
        })
        .collect();
    (renderer, ids)
}

fn frame(renderer: &mut Renderer2D<RecordingBackend>) {
    let viewport = Viewport::full(1920, 1080);
    renderer.backend_mut().clear_calls();
    if renderer.begin_frame().is_ok() {
        renderer.render_pass(viewport);
        renderer.end_frame(None);
    }
}

fn bench_static_scene(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_scene_frame");

    for count in [1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        let (mut renderer, _) = populated(count, 8);
        frame(&mut renderer);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| frame(black_box(&mut renderer)));
        });
    }

    group.finish();
}

fn bench_moving_scene(c: &mut Criterion) {
    let mut group = c.benchmark_group("moving_scene_frame");

    for count in [1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        let (mut renderer, ids) = populated(count, 8);
        frame(&mut renderer);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            let mut angle = 0.0;
            b.iter(|| {
                angle += 0.01;
                for &id in &ids {
                    if let Some(graphic) = renderer.graphic_mut(id) {
                        graphic.set_rotation(angle);
                    }
                }
                frame(&mut renderer);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_static_scene, bench_moving_scene);
criterion_main!(benches);
