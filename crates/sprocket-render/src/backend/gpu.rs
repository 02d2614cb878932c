//! wgpu implementation of [`RendererBackend`].
//!
//! Instances are drawn as triangle strips of four vertices. The vertex shader looks up
//! the static record through the order index array (`instance_index` includes the
//! batch's base instance), so one draw per batch covers any run of instances.
//!
//! Masks are drawn into two `R32Uint` targets the size of the surface. Each mask batch
//! renders into the write target and is then copied into the read target, which every
//! shader samples for its reading-mask test.

use std::sync::Arc;

use sprocket_core::{alloc::HashMap, profiling::profile_function};
use sprocket_test_utils::RenderContext;

use super::{BackendConfig, BackendError, OverlayRenderer, PassKind, PassResources, RendererBackend};
use crate::{
    context::GraphicsContext,
    frame::{FrameUniforms, Viewport},
    instance::InstanceTransport,
    render_list::DrawBatch,
    texture::TextureId,
    window::WindowContext,
};

const MASK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

const FRAME_STRUCTS: &str = r#"
struct Frame {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    viewport_size: vec2<f32>,
    time: f32,
    _padding: f32,
};

struct Instance {
    model: mat4x4<f32>,
    uv_rect: vec4<f32>,
    kind: u32,
    data_offset: u32,
    writing_mask: u32,
    reading_mask: u32,
};

@group(0) @binding(0) var<uniform> frame: Frame;
"#;

const STORAGE_PRELUDE: &str = r#"
@group(1) @binding(0) var<storage, read> statics: array<Instance>;
@group(1) @binding(1) var<storage, read> dynamics: array<f32>;
@group(1) @binding(2) var<storage, read> order: array<u32>;

fn load_order(i: u32) -> u32 {
    return order[i];
}

fn load_instance(slot: u32) -> Instance {
    return statics[slot];
}

fn load_dynamic(i: u32) -> f32 {
    return dynamics[i];
}
"#;

// Texels are raw u32 words; floats are bitcast back so no value goes through float
// sampling or conversion.
const TEXTURE_PRELUDE: &str = r#"
@group(1) @binding(0) var statics: texture_2d<u32>;
@group(1) @binding(1) var dynamics: texture_2d<u32>;
@group(1) @binding(2) var order: texture_2d<u32>;

fn texel(index: u32, width: u32) -> vec2<i32> {
    return vec2<i32>(i32(index % width), i32(index / width));
}

fn load_order(i: u32) -> u32 {
    let width = textureDimensions(order).x;
    return textureLoad(order, texel(i, width), 0).x;
}

fn load_instance(slot: u32) -> Instance {
    let width = textureDimensions(statics).x;
    let base = slot * 6u;
    let c0 = textureLoad(statics, texel(base, width), 0);
    let c1 = textureLoad(statics, texel(base + 1u, width), 0);
    let c2 = textureLoad(statics, texel(base + 2u, width), 0);
    let c3 = textureLoad(statics, texel(base + 3u, width), 0);
    let uv = textureLoad(statics, texel(base + 4u, width), 0);
    let tail = textureLoad(statics, texel(base + 5u, width), 0);

    var instance: Instance;
    instance.model = mat4x4<f32>(
        bitcast<vec4<f32>>(c0),
        bitcast<vec4<f32>>(c1),
        bitcast<vec4<f32>>(c2),
        bitcast<vec4<f32>>(c3),
    );
    instance.uv_rect = bitcast<vec4<f32>>(uv);
    instance.kind = tail.x;
    instance.data_offset = tail.y;
    instance.writing_mask = tail.z;
    instance.reading_mask = tail.w;
    return instance;
}

fn load_dynamic(i: u32) -> f32 {
    let width = textureDimensions(dynamics).x;
    let words = textureLoad(dynamics, texel(i / 4u, width), 0);
    return bitcast<f32>(words[i % 4u]);
}
"#;

const SHADER_BODY: &str = r#"
@group(2) @binding(0) var color_texture: texture_2d<f32>;
@group(2) @binding(1) var color_sampler: sampler;
@group(3) @binding(0) var mask_texture: texture_2d<u32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec3<f32>,
    @location(2) smoothness: f32,
    @location(3) @interpolate(flat) kind: u32,
    @location(4) @interpolate(flat) reading_mask: u32,
    @location(5) @interpolate(flat) writing_mask: u32,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
) -> VertexOutput {
    var out: VertexOutput;
    let instance = load_instance(load_order(instance_index));
    out.kind = instance.kind;
    if instance.kind == 0u {
        // Outside the clip volume: the quad is culled.
        out.position = vec4<f32>(2.0, 2.0, 2.0, 1.0);
        return out;
    }

    let corner = vec2<f32>(f32(vertex_index & 1u), f32(vertex_index >> 1u));
    out.position = frame.projection * frame.view * instance.model * vec4<f32>(corner, 0.0, 1.0);
    out.uv = mix(instance.uv_rect.xy, instance.uv_rect.zw, corner);

    let offset = instance.data_offset;
    out.color = vec3<f32>(load_dynamic(offset), load_dynamic(offset + 1u), load_dynamic(offset + 2u));
    if instance.kind == 2u {
        out.smoothness = load_dynamic(offset + 3u);
    }
    out.reading_mask = instance.reading_mask;
    out.writing_mask = instance.writing_mask;
    return out;
}

fn passes_mask(position: vec4<f32>, reading_mask: u32) -> bool {
    if reading_mask == 0u {
        return true;
    }
    let value = textureLoad(mask_texture, vec2<i32>(position.xy), 0).x;
    return value == reading_mask;
}

fn shade(in: VertexOutput, sampled: vec4<f32>) -> vec4<f32> {
    if in.kind == 2u {
        let alpha = smoothstep(0.5 - in.smoothness, 0.5 + in.smoothness, sampled.r);
        return vec4<f32>(in.color, alpha);
    }
    return vec4<f32>(sampled.rgb * in.color, sampled.a);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let sampled = textureSample(color_texture, color_sampler, in.uv);
    if !passes_mask(in.position, in.reading_mask) {
        discard;
    }
    return shade(in, sampled);
}

@fragment
fn fs_mask(in: VertexOutput) -> @location(0) u32 {
    let sampled = textureSample(color_texture, color_sampler, in.uv);
    if !passes_mask(in.position, in.reading_mask) || shade(in, sampled).a < 0.5 {
        discard;
    }
    return in.writing_mask;
}
"#;

/// Full WGSL source for `transport`.
pub(crate) fn shader_source(transport: InstanceTransport) -> String {
    let prelude = match transport {
        InstanceTransport::StorageBuffers => STORAGE_PRELUDE,
        InstanceTransport::DataTexture { .. } => TEXTURE_PRELUDE,
    };
    format!("{FRAME_STRUCTS}{prelude}{SHADER_BODY}")
}

/// The frame being recorded, as seen by overlays.
pub struct GpuFrame {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub encoder: wgpu::CommandEncoder,
    /// View of the surface texture. Overlays load it and draw on top.
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
    surface: wgpu::SurfaceTexture,
}

struct MaskTargets {
    write: wgpu::Texture,
    write_view: wgpu::TextureView,
    read: wgpu::Texture,
    read_bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

const INITIAL_UNIFORM_SLOTS: u32 = 8;

/// Distance between two uniform slots: `FrameUniforms` rounded up to the device's
/// dynamic offset alignment.
fn uniform_stride(alignment: u32) -> u64 {
    (std::mem::size_of::<FrameUniforms>() as u64).next_multiple_of(alignment.max(1) as u64)
}

/// One `FrameUniforms` slot per pass, bound with a dynamic offset.
///
/// Slots are handed out in pass order and reset every frame, so passes recorded into
/// the same encoder never see each other's uniforms.
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: u32,
    next: u32,
}

impl UniformRing {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, stride: u64, capacity: u32) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprocket Frame Uniforms"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sprocket Frame Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<FrameUniforms>() as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            stride,
            capacity,
            next: 0,
        }
    }

    /// Writes `uniforms` into the next free slot, doubling the ring when the frame has
    /// used every slot. Passes already recorded keep the bind group they were given.
    fn push(
        &mut self,
        context: &GraphicsContext,
        layout: &wgpu::BindGroupLayout,
        uniforms: &FrameUniforms,
    ) -> (wgpu::BindGroup, u32) {
        if self.next == self.capacity {
            let next = self.next;
            tracing::debug!(slots = self.capacity * 2, "Growing frame uniform ring");
            *self = Self::new(context.device(), layout, self.stride, self.capacity * 2);
            self.next = next;
        }
        let offset = self.next as u64 * self.stride;
        context
            .queue()
            .write_buffer(&self.buffer, offset, bytemuck::bytes_of(uniforms));
        self.next += 1;
        (self.bind_group.clone(), offset as u32)
    }
}

struct Pipelines {
    normal: Option<wgpu::RenderPipeline>,
    mask: Option<wgpu::RenderPipeline>,
    instance_layout: wgpu::BindGroupLayout,
}

struct ActivePass {
    kind: PassKind,
    viewport: Viewport,
    instances: wgpu::BindGroup,
    uniforms: wgpu::BindGroup,
    uniform_offset: u32,
    /// Only normal passes keep one render pass open; mask batches each get their own.
    render: Option<wgpu::RenderPass<'static>>,
}

#[derive(Default)]
struct FrameClears {
    surface: bool,
    masks: bool,
}

/// Draws render lists into a window surface.
pub struct WgpuBackend {
    context: Arc<GraphicsContext>,
    window: WindowContext,
    config: Option<BackendConfig>,
    pipelines: Option<Pipelines>,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    mask_layout: wgpu::BindGroupLayout,
    uniforms: UniformRing,
    sampler: wgpu::Sampler,
    white_texture: wgpu::BindGroup,
    empty_mask: wgpu::BindGroup,
    textures: HashMap<TextureId, wgpu::BindGroup>,
    instance_bind_groups: [Option<((u64, u64, u64), wgpu::BindGroup)>; 2],
    masks: Option<MaskTargets>,
    readback: wgpu::Buffer,
    frame: Option<GpuFrame>,
    pass: Option<ActivePass>,
    clears: FrameClears,
}

fn slot(kind: PassKind) -> usize {
    match kind {
        PassKind::Normal => 0,
        PassKind::Mask => 1,
    }
}

impl WgpuBackend {
    pub fn new(context: Arc<GraphicsContext>, window: WindowContext) -> Self {
        let device = context.device();

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sprocket Frame Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<FrameUniforms>() as u64),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sprocket Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let mask_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sprocket Mask Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Uint,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let stride = uniform_stride(device.limits().min_uniform_buffer_offset_alignment);
        let uniforms = UniformRing::new(device, &uniform_layout, stride, INITIAL_UNIFORM_SLOTS);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprocket Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white = Self::single_texel(&context, "Sprocket White Texture", wgpu::TextureFormat::Rgba8Unorm, &[255; 4]);
        let white_texture = Self::texture_bind_group(device, &texture_layout, &sampler, &white);

        let empty = Self::single_texel(&context, "Sprocket Empty Mask", MASK_FORMAT, &[0; 4]);
        let empty_mask = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sprocket Empty Mask Bind Group"),
            layout: &mask_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&empty),
            }],
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprocket Mask Readback"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            context,
            window,
            config: None,
            pipelines: None,
            uniform_layout,
            texture_layout,
            mask_layout,
            uniforms,
            sampler,
            white_texture,
            empty_mask,
            textures: HashMap::default(),
            instance_bind_groups: [None, None],
            masks: None,
            readback,
            frame: None,
            pass: None,
            clears: FrameClears::default(),
        }
    }

    fn single_texel(
        context: &GraphicsContext,
        label: &'static str,
        format: wgpu::TextureFormat,
        texel: &[u8; 4],
    ) -> wgpu::TextureView {
        let size = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let texture = context.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        context.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texel,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            size,
        );
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn texture_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sprocket Texture Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Binds `view` to `id`. Graphics whose texture or font reports `id` sample it.
    pub fn register_texture(&mut self, id: TextureId, view: &wgpu::TextureView) {
        let bind_group = Self::texture_bind_group(self.context.device(), &self.texture_layout, &self.sampler, view);
        self.textures.insert(id, bind_group);
    }

    pub fn unregister_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    pub fn window(&self) -> &WindowContext {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut WindowContext {
        &mut self.window
    }

    pub fn graphics_context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    fn instance_layout(&self, transport: InstanceTransport) -> wgpu::BindGroupLayout {
        let ty = match transport {
            InstanceTransport::StorageBuffers => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            InstanceTransport::DataTexture { .. } => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Uint,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
        };
        let entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty,
            count: None,
        };
        self.context.device().create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sprocket Instance Bind Group Layout"),
            entries: &[entry(0), entry(1), entry(2)],
        })
    }

    fn create_pipeline(
        &self,
        label: &'static str,
        layout: &wgpu::PipelineLayout,
        shader: &wgpu::ShaderModule,
        fragment_entry: &'static str,
        target: wgpu::ColorTargetState,
    ) -> wgpu::RenderPipeline {
        self.context.device().create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some(fragment_entry),
                targets: &[Some(target)],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn ensure_mask_targets(&mut self) {
        let size = self.window.size();
        if self.masks.as_ref().is_some_and(|masks| masks.size == size) {
            return;
        }
        if size.0 == 0 || size.1 == 0 {
            self.masks = None;
            return;
        }

        let device = self.context.device();
        let descriptor = |label| wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MASK_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        };
        let write = device.create_texture(&descriptor("Sprocket Mask Write Target"));
        let read = device.create_texture(&descriptor("Sprocket Mask Read Target"));
        let write_view = write.create_view(&wgpu::TextureViewDescriptor::default());
        let read_view = read.create_view(&wgpu::TextureViewDescriptor::default());
        let read_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sprocket Mask Read Bind Group"),
            layout: &self.mask_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&read_view),
            }],
        });

        tracing::debug!(width = size.0, height = size.1, "Created mask targets");
        self.masks = Some(MaskTargets {
            write,
            write_view,
            read,
            read_bind_group,
            size,
        });
    }

    /// Clears both mask targets.
    fn clear_masks(&mut self) {
        let (Some(frame), Some(masks)) = (self.frame.as_mut(), self.masks.as_ref()) else {
            return;
        };
        let clear = wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            store: wgpu::StoreOp::Store,
        };
        let read_view = masks.read.create_view(&wgpu::TextureViewDescriptor::default());
        for view in [&masks.write_view, &read_view] {
            frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprocket Mask Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: clear,
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        self.clears.masks = true;
    }

    fn instance_bind_group(&mut self, kind: PassKind, resources: &PassResources<'_>) -> Option<wgpu::BindGroup> {
        let key = resources.binding_key();
        if let Some((cached, bind_group)) = &self.instance_bind_groups[slot(kind)]
            && *cached == key
        {
            return Some(bind_group.clone());
        }

        let layout = &self.pipelines.as_ref()?.instance_layout;
        let targets = [resources.statics, resources.dynamics, resources.order];
        let views: Vec<wgpu::TextureView> = targets
            .iter()
            .filter_map(|target| target.texture())
            .map(|texture| texture.as_wgpu().create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();

        let entries: Vec<wgpu::BindGroupEntry> = if views.len() == targets.len() {
            views
                .iter()
                .enumerate()
                .map(|(binding, view)| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: wgpu::BindingResource::TextureView(view),
                })
                .collect()
        } else {
            targets
                .iter()
                .enumerate()
                .map(|(binding, target)| {
                    target.buffer().map(|buffer| wgpu::BindGroupEntry {
                        binding: binding as u32,
                        resource: buffer.as_wgpu().as_entire_binding(),
                    })
                })
                .collect::<Option<Vec<_>>>()?
        };

        let bind_group = self.context.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sprocket Instance Bind Group"),
            layout,
            entries: &entries,
        });
        self.instance_bind_groups[slot(kind)] = Some((key, bind_group.clone()));
        Some(bind_group)
    }

    fn bind_common(&self, render: &mut wgpu::RenderPass<'static>, pass: &ActivePass, texture_id: TextureId) {
        render.set_bind_group(0, &pass.uniforms, &[pass.uniform_offset]);
        render.set_bind_group(1, &pass.instances, &[]);
        render.set_bind_group(2, self.textures.get(&texture_id).unwrap_or(&self.white_texture), &[]);
        let mask = self.masks.as_ref().map_or(&self.empty_mask, |masks| &masks.read_bind_group);
        render.set_bind_group(3, mask, &[]);
        render.set_viewport(
            pass.viewport.x,
            pass.viewport.y,
            pass.viewport.width,
            pass.viewport.height,
            0.0,
            1.0,
        );
    }

    fn draw_mask_batch(&mut self, pass: &ActivePass, batch: &DrawBatch) {
        let Some(pipeline) = self.pipelines.as_ref().and_then(|pipelines| pipelines.mask.as_ref()) else {
            return;
        };
        let (Some(frame), Some(masks)) = (self.frame.as_mut(), self.masks.as_ref()) else {
            return;
        };

        let mut render = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprocket Mask Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &masks.write_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            })
            .forget_lifetime();
        render.set_pipeline(pipeline);
        self.bind_common(&mut render, pass, batch.texture_id);
        render.draw(0..4, batch.first..batch.first + batch.count);
        drop(render);

        let (Some(frame), Some(masks)) = (self.frame.as_mut(), self.masks.as_ref()) else {
            return;
        };
        frame.encoder.copy_texture_to_texture(
            masks.write.as_image_copy(),
            masks.read.as_image_copy(),
            wgpu::Extent3d {
                width: masks.size.0,
                height: masks.size.1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Clamps `viewport` to the surface. wgpu rejects viewports outside the target.
    fn clamp_viewport(&self, viewport: Viewport) -> Viewport {
        let (width, height) = self.frame.as_ref().map_or((0, 0), |frame| frame.size);
        let x = viewport.x.clamp(0.0, width as f32);
        let y = viewport.y.clamp(0.0, height as f32);
        Viewport::new(
            x,
            y,
            viewport.width.min(width as f32 - x),
            viewport.height.min(height as f32 - y),
        )
    }
}

impl RendererBackend for WgpuBackend {
    type Frame = GpuFrame;

    fn render_context(&self) -> &dyn RenderContext {
        self.context.as_ref()
    }

    fn supports_storage_buffers(&self) -> bool {
        self.context.supports_vertex_storage_buffers()
    }

    fn max_texture_dimension(&self) -> u32 {
        self.context.max_texture_dimension_2d()
    }

    fn configure(&mut self, config: &BackendConfig) {
        profile_function!();
        let device = self.context.device().clone();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let instance_layout = self.instance_layout(config.transport);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sprocket Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source(config.transport).into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sprocket Pipeline Layout"),
            bind_group_layouts: &[
                &self.uniform_layout,
                &instance_layout,
                &self.texture_layout,
                &self.mask_layout,
            ],
            push_constant_ranges: &[],
        });

        let normal = self.create_pipeline(
            "Sprocket Pipeline",
            &layout,
            &shader,
            "fs_main",
            wgpu::ColorTargetState {
                format: self.window.format(),
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            },
        );
        let mask = self.create_pipeline(
            "Sprocket Mask Pipeline",
            &layout,
            &shader,
            "fs_mask",
            wgpu::ColorTargetState {
                format: MASK_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            },
        );

        let valid = match pollster::block_on(device.pop_error_scope()) {
            Some(err) => {
                tracing::error!("Shader validation failed, nothing will be drawn: {}", err);
                false
            }
            None => true,
        };

        tracing::info!(transport = ?config.transport, "Configured renderer backend");
        self.pipelines = Some(Pipelines {
            normal: valid.then_some(normal),
            mask: valid.then_some(mask),
            instance_layout,
        });
        self.instance_bind_groups = [None, None];
        self.config = Some(*config);
    }

    fn surface_size(&self) -> (u32, u32) {
        self.window.size()
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        profile_function!();
        if self.frame.is_some() {
            return Err(BackendError::FrameInProgress);
        }

        let surface = self.window.acquire()?;
        self.ensure_mask_targets();
        self.context.device().push_error_scope(wgpu::ErrorFilter::Validation);

        let view = surface.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self.context.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Sprocket Frame Encoder"),
        });
        let size = (surface.texture.width(), surface.texture.height());
        self.frame = Some(GpuFrame {
            device: self.context.device().clone(),
            queue: self.context.queue().clone(),
            encoder,
            view,
            size,
            surface,
        });
        self.clears = FrameClears::default();
        self.uniforms.next = 0;
        Ok(())
    }

    fn begin_pass(
        &mut self,
        kind: PassKind,
        viewport: Viewport,
        uniforms: &FrameUniforms,
        resources: PassResources<'_>,
    ) -> bool {
        profile_function!();
        if self.frame.is_none() || self.pass.is_some() {
            tracing::warn!(?kind, "begin_pass outside of a frame or inside another pass");
            return false;
        }
        if !resources.is_complete() {
            return false;
        }
        if kind == PassKind::Mask && self.masks.is_none() {
            tracing::error!("Mask targets are incomplete, skipping mask pass");
            return false;
        }
        let viewport = self.clamp_viewport(viewport);
        if viewport.is_empty() {
            return false;
        }
        let Some(instances) = self.instance_bind_group(kind, &resources) else {
            return false;
        };

        let (uniforms, uniform_offset) = self.uniforms.push(&self.context, &self.uniform_layout, uniforms);
        // Every mask pass starts from empty targets; a normal pass only needs last
        // frame's masks gone.
        if kind == PassKind::Mask || !self.clears.masks {
            self.clear_masks();
        }

        let render = match kind {
            PassKind::Mask => None,
            PassKind::Normal => {
                let Some(pipeline) = self.pipelines.as_ref().and_then(|pipelines| pipelines.normal.clone()) else {
                    return false;
                };
                let load = if self.clears.surface {
                    wgpu::LoadOp::Load
                } else {
                    let [r, g, b, a] = self.config.map_or([0.0; 4], |config| config.clear_color);
                    wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    })
                };
                self.clears.surface = true;

                let Some(frame) = self.frame.as_mut() else {
                    return false;
                };
                frame.encoder.push_debug_group("sprocket normal pass");
                let mut render = frame
                    .encoder
                    .begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Sprocket Pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &frame.view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load,
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        occlusion_query_set: None,
                        timestamp_writes: None,
                    })
                    .forget_lifetime();
                render.set_pipeline(&pipeline);
                Some(render)
            }
        };

        self.pass = Some(ActivePass {
            kind,
            viewport,
            instances,
            uniforms,
            uniform_offset,
            render,
        });
        true
    }

    fn draw_batch(&mut self, batch: &DrawBatch) {
        let Some(mut pass) = self.pass.take() else {
            tracing::warn!("draw_batch outside of a pass");
            return;
        };
        match pass.kind {
            PassKind::Normal => {
                if let Some(mut render) = pass.render.take() {
                    self.bind_common(&mut render, &pass, batch.texture_id);
                    render.draw(0..4, batch.first..batch.first + batch.count);
                    pass.render = Some(render);
                }
            }
            PassKind::Mask => self.draw_mask_batch(&pass, batch),
        }
        self.pass = Some(pass);
    }

    fn end_pass(&mut self) {
        if let Some(pass) = self.pass.take() {
            let normal = pass.render.is_some();
            drop(pass);
            if normal && let Some(frame) = self.frame.as_mut() {
                frame.encoder.pop_debug_group();
            }
        }
    }

    fn read_mask_pixel(&mut self, x: u32, y: u32) -> Option<u32> {
        profile_function!();
        let masks = self.masks.as_ref()?;
        if x >= masks.size.0 || y >= masks.size.1 || self.pass.is_some() {
            return None;
        }
        let frame = self.frame.as_mut()?;

        // Submit what was recorded so far so the copy sees the finished mask pass.
        let mut encoder = std::mem::replace(
            &mut frame.encoder,
            frame.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sprocket Frame Encoder"),
            }),
        );
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &masks.read,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        frame.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.readback.slice(..4);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = frame.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        match rx.recv() {
            Ok(Ok(())) => {
                let value = {
                    let data = slice.get_mapped_range();
                    u32::from_ne_bytes([data[0], data[1], data[2], data[3]])
                };
                self.readback.unmap();
                Some(value)
            }
            _ => {
                tracing::warn!("Failed to map the mask readback buffer");
                None
            }
        }
    }

    fn end_frame(&mut self, overlay: Option<&mut dyn OverlayRenderer<GpuFrame>>) {
        profile_function!();
        self.end_pass();
        let Some(mut frame) = self.frame.take() else {
            return;
        };

        if !self.clears.surface {
            // Nothing drew this frame; present the clear color rather than garbage.
            let [r, g, b, a] = self.config.map_or([0.0; 4], |config| config.clear_color);
            frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprocket Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }

        if let Some(overlay) = overlay {
            overlay.render_overlay(&mut frame);
        }

        let GpuFrame {
            queue,
            encoder,
            surface,
            ..
        } = frame;
        queue.submit(std::iter::once(encoder.finish()));
        surface.present();

        if let Some(err) = pollster::block_on(self.context.device().pop_error_scope()) {
            tracing::error!("GPU validation error during frame: {}", err);
        }
    }
}
