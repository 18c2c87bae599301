use std::collections::HashMap;
use std::ops::Range;

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wgpu::{
    vertex_attr_array, AddressMode, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, Buffer, BufferBindingType,
    BufferUsages, ColorTargetState, ColorWrites, CommandEncoder, CommandEncoderDescriptor, CompositeAlphaMode,
    DeviceDescriptor, Extent3d, FilterMode, FragmentState, Instance, LoadOp, MultisampleState, Operations,
    Origin3d, PipelineLayoutDescriptor, PresentMode, PrimitiveState, PrimitiveTopology,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    RequestAdapterOptions, Sampler, SamplerBindingType, SamplerDescriptor, ShaderModule, ShaderModuleDescriptor,
    ShaderSource, SurfaceConfiguration, TexelCopyBufferLayout, TexelCopyTextureInfo, Texture, TextureAspect,
    TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType, TextureUsages, TextureView,
    TextureViewDescriptor, TextureViewDimension, VertexState,
};

use super::{ClearMask, LightUniforms, LightingBackend, RenderTarget, ScissorRect, Technique};
use crate::error::LightingError;
use crate::light::LightTextureId;
use crate::math::{Color, Vec2};
use crate::shadow::ShadowPolygon;

// Uniform slots for mask, marker, clear-alpha and scene draws per frame.
const MAX_SOLID_DRAWS_PER_FRAME: usize = 4096;
const LIGHTMAP_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Where the composited frame ends up.
pub enum WgpuTarget<'window> {
    Surface {
        surface: wgpu::Surface<'window>,
        config: SurfaceConfiguration,
        present_mode: PresentMode,
    },
    /// Offscreen output, for tools and capture.
    Headless {
        texture: Texture,
        view: TextureView,
        format: TextureFormat,
    },
}

impl WgpuTarget<'_> {
    fn format(&self) -> TextureFormat {
        match self {
            WgpuTarget::Surface { config, .. } => config.format,
            WgpuTarget::Headless { format, .. } => *format,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SolidVertex {
    position: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuLightUniforms {
    mvp: [[f32; 4]; 4],
    // rgb + intensity factor
    color: [f32; 4],
    // direction angle, half angle, decay, technique
    cone: [f32; 4],
    // texture rotation
    params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SolidUniforms {
    mvp: [[f32; 4]; 4],
    color: [f32; 4],
}

/// Uniform ring with dynamic offsets, reset every frame.
struct UniformRing {
    buffer: Buffer,
    bind_group: BindGroup,
    alignment: u64,
    capacity: usize,
    used: usize,
}

impl UniformRing {
    fn new(device: &wgpu::Device, layout: &BindGroupLayout, label: &str, item_size: u64, capacity: usize) -> Self {
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let aligned = (item_size + alignment - 1) & !(alignment - 1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: aligned * capacity as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: std::num::NonZeroU64::new(item_size),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            alignment: aligned,
            capacity,
            used: 0,
        }
    }

    fn push<T: Pod>(&mut self, queue: &wgpu::Queue, value: &T) -> Result<u32> {
        if self.used >= self.capacity {
            return Err(anyhow!("Too many draws in one frame (max: {})", self.capacity));
        }
        let offset = self.used as u64 * self.alignment;
        queue.write_buffer(&self.buffer, offset, bytemuck::bytes_of(value));
        self.used += 1;
        Ok(offset as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SolidKind {
    Mask,
    Outline,
    Scene,
}

/// Queued backend call, replayed in order at `end_frame`.
enum Command {
    Clear { target: RenderTarget, color: Color },
    Bind(Option<RenderTarget>),
    Scissor(Option<ScissorRect>),
    Solid {
        kind: SolidKind,
        uniform_offset: u32,
        vertices: Range<u32>,
    },
    Light {
        masked: bool,
        uniform_offset: u32,
        texture: Option<LightTextureId>,
    },
    Present(RenderTarget),
}

impl Command {
    fn opens_pass(&self) -> bool {
        matches!(self, Command::Clear { .. } | Command::Bind(_))
    }
}

struct LightTexture {
    /// Must be kept alive for the view/bind group to be valid.
    #[allow(dead_code)]
    texture: Texture,
    bind_group: BindGroup,
    size: (u32, u32),
}

struct OffscreenTargets {
    #[allow(dead_code)]
    scene: Texture,
    scene_view: TextureView,
    #[allow(dead_code)]
    lightmap: Texture,
    lightmap_view: TextureView,
    present_scene: BindGroup,
    present_lightmap: BindGroup,
}

struct Pipelines {
    light_masked: RenderPipeline,
    light_unmasked: RenderPipeline,
    mask: RenderPipeline,
    outline: RenderPipeline,
    scene: RenderPipeline,
    present_scene: RenderPipeline,
    present_lightmap: RenderPipeline,
    uniform_layout: BindGroupLayout,
    texture_layout: BindGroupLayout,
    light_quad: Buffer,
    fullscreen_quad: Buffer,
    sampler: Sampler,
}

struct FrameState {
    surface_texture: Option<wgpu::SurfaceTexture>,
    view: Option<TextureView>,
}

/// GPU implementation of [`LightingBackend`].
///
/// Calls are recorded into a command list and replayed at `end_frame` into
/// one encoder: each bind or clear opens a render pass, draws in between share
/// it. The lightmap is `Rgba16Float` so accumulated light can exceed 1.
pub struct WgpuBackend<'window> {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: WgpuTarget<'window>,
    size: (u32, u32),
    pipelines: Pipelines,
    offscreen: OffscreenTargets,
    light_uniforms: UniformRing,
    solid_uniforms: UniformRing,
    textures: HashMap<LightTextureId, LightTexture>,
    white_texture: LightTexture,
    next_texture_id: u32,
    commands: Vec<Command>,
    vertices: Vec<SolidVertex>,
    bound: Option<RenderTarget>,
    frame: Option<FrameState>,
}

impl<'window> WgpuBackend<'window> {
    /// Present into a window surface.
    pub fn new(
        window: impl Into<wgpu::SurfaceTarget<'window>>,
        width: u32,
        height: u32,
        vsync: bool,
        max_lights: usize,
    ) -> Result<Self> {
        let instance = Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter)?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no formats"))?;

        let present_mode = choose_present_mode(&capabilities.present_modes, vsync);
        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode: choose_alpha_mode(&capabilities.alpha_modes),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let target = WgpuTarget::Surface {
            surface,
            config,
            present_mode,
        };
        Ok(Self::with_device(device, queue, target, (width, height), max_lights))
    }

    /// Render into an offscreen RGBA8 texture instead of a window.
    pub fn headless(width: u32, height: u32, max_lights: usize) -> Result<Self> {
        let instance = Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter)?;

        let format = TextureFormat::Rgba8UnormSrgb;
        let (texture, view) = create_target_texture(
            &device,
            "umbra2d-headless-output",
            (width.max(1), height.max(1)),
            format,
            TextureUsages::COPY_SRC,
        );
        let target = WgpuTarget::Headless { texture, view, format };
        Ok(Self::with_device(device, queue, target, (width, height), max_lights))
    }

    fn with_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: WgpuTarget<'window>,
        size: (u32, u32),
        max_lights: usize,
    ) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let pipelines = create_pipelines(&device, target.format());
        let offscreen = create_offscreen_targets(&device, &pipelines, size, target.format());

        let light_uniforms = UniformRing::new(
            &device,
            &pipelines.uniform_layout,
            "light-uniform-buffer",
            std::mem::size_of::<GpuLightUniforms>() as u64,
            max_lights.max(1),
        );
        let solid_uniforms = UniformRing::new(
            &device,
            &pipelines.uniform_layout,
            "solid-uniform-buffer",
            std::mem::size_of::<SolidUniforms>() as u64,
            MAX_SOLID_DRAWS_PER_FRAME,
        );
        let white_texture = upload_light_texture(&device, &queue, &pipelines, &[255; 4], 1, 1);

        log::debug!("wgpu lighting backend ready: {}x{}, {:?}", size.0, size.1, target.format());
        Self {
            device,
            queue,
            target,
            size,
            pipelines,
            offscreen,
            light_uniforms,
            solid_uniforms,
            textures: HashMap::new(),
            white_texture,
            next_texture_id: 1,
            commands: Vec::new(),
            vertices: Vec::new(),
            bound: None,
            frame: None,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        match &mut self.target {
            WgpuTarget::Surface {
                surface,
                config,
                present_mode,
            } => {
                config.width = width;
                config.height = height;
                config.present_mode = *present_mode;
                surface.configure(&self.device, config);
            }
            WgpuTarget::Headless { texture, view, format } => {
                let (new_texture, new_view) = create_target_texture(
                    &self.device,
                    "umbra2d-headless-output",
                    self.size,
                    *format,
                    TextureUsages::COPY_SRC,
                );
                *texture = new_texture;
                *view = new_view;
            }
        }
        self.offscreen = create_offscreen_targets(&self.device, &self.pipelines, self.size, self.target.format());
    }

    /// Upload raw RGBA8 data as a light texture.
    pub fn load_light_texture_from_rgba(&mut self, data: &[u8], width: u32, height: u32) -> Result<LightTextureId> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * 4 {
            return Err(anyhow!("Light texture data does not match {width}x{height} RGBA8"));
        }
        let texture = upload_light_texture(&self.device, &self.queue, &self.pipelines, data, width, height);
        let id = LightTextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id, texture);
        Ok(id)
    }

    /// Decode an encoded image (PNG) and upload it as a light texture.
    pub fn load_light_texture_from_bytes(&mut self, bytes: &[u8]) -> Result<LightTextureId> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        self.load_light_texture_from_rgba(&image, width, height)
    }

    pub fn light_texture_size(&self, id: LightTextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(|texture| texture.size)
    }

    /// Fill a world-space polygon into the bound scene target.
    pub fn draw_scene_polygon(&mut self, points: &[Vec2], color: Color, world_view_projection: Mat4) -> Result<()> {
        if self.bound != Some(RenderTarget::Scene) {
            return Err(anyhow!("Scene polygons need the scene target bound"));
        }
        let mut triangles = Vec::new();
        crate::geometry::triangulate(points, &mut triangles);
        let start = self.vertices.len() as u32;
        self.vertices.extend(
            triangles
                .iter()
                .flatten()
                .map(|p| SolidVertex { position: [p.x, p.y] }),
        );
        self.push_solid(SolidKind::Scene, world_view_projection, color.to_array(), start)
    }

    fn push_solid(&mut self, kind: SolidKind, mvp: Mat4, color: [f32; 4], start: u32) -> Result<()> {
        let end = self.vertices.len() as u32;
        if end == start {
            return Ok(());
        }
        let uniforms = SolidUniforms {
            mvp: mvp.to_cols_array_2d(),
            color,
        };
        let uniform_offset = self.solid_uniforms.push(&self.queue, &uniforms)?;
        self.commands.push(Command::Solid {
            kind,
            uniform_offset,
            vertices: start..end,
        });
        Ok(())
    }

    fn require_lightmap(&self, what: &str) -> Result<()> {
        if self.bound != Some(RenderTarget::Lightmap) {
            return Err(anyhow!("{what} needs the lightmap target bound"));
        }
        Ok(())
    }

    fn target_view(&self, target: Option<RenderTarget>) -> Result<&TextureView> {
        match target {
            Some(RenderTarget::Scene) => Ok(&self.offscreen.scene_view),
            Some(RenderTarget::Lightmap) => Ok(&self.offscreen.lightmap_view),
            None => self
                .frame
                .as_ref()
                .and_then(|frame| frame.view.as_ref())
                .ok_or_else(|| anyhow!("Frame not started")),
        }
    }

    fn acquire_frame(&mut self) -> Result<FrameState> {
        let surface = match &self.target {
            WgpuTarget::Headless { view, .. } => {
                return Ok(FrameState {
                    surface_texture: None,
                    view: Some(view.clone()),
                })
            }
            WgpuTarget::Surface { surface, .. } => surface,
        };
        loop {
            match surface.get_current_texture() {
                Ok(surface_texture) => {
                    let view = surface_texture.texture.create_view(&TextureViewDescriptor::default());
                    return Ok(FrameState {
                        surface_texture: Some(surface_texture),
                        view: Some(view),
                    });
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    if let WgpuTarget::Surface { surface, config, .. } = &self.target {
                        surface.configure(&self.device, config);
                    }
                }
                Err(wgpu::SurfaceError::Timeout) => continue,
                Err(wgpu::SurfaceError::OutOfMemory) => return Err(anyhow!("Surface ran out of memory")),
                Err(wgpu::SurfaceError::Other) => return Err(anyhow!("Surface error: Other")),
            }
        }
    }

    /// Replay the queued commands: every `Clear` or `Bind` opens a new pass.
    fn flush(&mut self, encoder: &mut CommandEncoder) -> Result<()> {
        let commands = std::mem::take(&mut self.commands);
        let vertex_buffer = (!self.vertices.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("solid-vertex-buffer"),
                contents: bytemuck::cast_slice(&self.vertices),
                usage: BufferUsages::VERTEX,
            })
        });

        let mut bound = None;
        let mut scissor = None;
        let mut i = 0;
        while i < commands.len() {
            let load = match &commands[i] {
                Command::Bind(target) => {
                    bound = *target;
                    LoadOp::Load
                }
                Command::Clear { target, color } => {
                    // A clear is a pass of its own on its target.
                    let view = self.target_view(Some(*target))?;
                    let pass = encoder.begin_render_pass(&RenderPassDescriptor {
                        label: Some("clear-target-pass"),
                        color_attachments: &[Some(RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: Operations {
                                load: LoadOp::Clear(wgpu::Color {
                                    r: color.r as f64,
                                    g: color.g as f64,
                                    b: color.b as f64,
                                    a: color.a as f64,
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        multiview_mask: None,
                        occlusion_query_set: None,
                        timestamp_writes: None,
                    });
                    drop(pass);
                    i += 1;
                    continue;
                }
                _ => LoadOp::Load,
            };
            if commands[i].opens_pass() {
                i += 1;
            }
            let end = commands[i..]
                .iter()
                .position(Command::opens_pass)
                .map_or(commands.len(), |offset| i + offset);
            let run = &commands[i..end];
            i = end;
            if run.iter().all(|command| matches!(command, Command::Scissor(_))) {
                if let Some(Command::Scissor(rect)) = run.last() {
                    scissor = *rect;
                }
                continue;
            }

            let view = self.target_view(bound)?;
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(match bound {
                    Some(RenderTarget::Scene) => "scene-pass",
                    Some(RenderTarget::Lightmap) => "lightmap-pass",
                    None => "composite-pass",
                }),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            apply_scissor(&mut pass, scissor, self.size);

            for command in run {
                match command {
                    Command::Scissor(rect) => {
                        scissor = *rect;
                        apply_scissor(&mut pass, scissor, self.size);
                    }
                    Command::Solid {
                        kind,
                        uniform_offset,
                        vertices,
                    } => {
                        let Some(buffer) = &vertex_buffer else {
                            continue;
                        };
                        let pipeline = match kind {
                            SolidKind::Mask => &self.pipelines.mask,
                            SolidKind::Outline => &self.pipelines.outline,
                            SolidKind::Scene => &self.pipelines.scene,
                        };
                        pass.set_pipeline(pipeline);
                        pass.set_bind_group(0, &self.solid_uniforms.bind_group, &[*uniform_offset]);
                        pass.set_vertex_buffer(0, buffer.slice(..));
                        pass.draw(vertices.clone(), 0..1);
                    }
                    Command::Light {
                        masked,
                        uniform_offset,
                        texture,
                    } => {
                        let pipeline = if *masked {
                            &self.pipelines.light_masked
                        } else {
                            &self.pipelines.light_unmasked
                        };
                        let texture = texture
                            .and_then(|id| self.textures.get(&id))
                            .unwrap_or(&self.white_texture);
                        pass.set_pipeline(pipeline);
                        pass.set_bind_group(0, &self.light_uniforms.bind_group, &[*uniform_offset]);
                        pass.set_bind_group(1, &texture.bind_group, &[]);
                        pass.set_vertex_buffer(0, self.pipelines.light_quad.slice(..));
                        pass.draw(0..6, 0..1);
                    }
                    Command::Present(source) => {
                        let (pipeline, bind_group) = match source {
                            RenderTarget::Scene => (&self.pipelines.present_scene, &self.offscreen.present_scene),
                            RenderTarget::Lightmap => {
                                (&self.pipelines.present_lightmap, &self.offscreen.present_lightmap)
                            }
                        };
                        pass.set_pipeline(pipeline);
                        pass.set_bind_group(0, bind_group, &[]);
                        pass.set_vertex_buffer(0, self.pipelines.fullscreen_quad.slice(..));
                        pass.draw(0..6, 0..1);
                    }
                    Command::Clear { .. } | Command::Bind(_) => {}
                }
            }
            drop(pass);
        }
        Ok(())
    }
}

impl LightingBackend for WgpuBackend<'_> {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn begin_frame(&mut self) -> crate::error::Result<()> {
        self.light_uniforms.used = 0;
        self.solid_uniforms.used = 0;
        self.commands.clear();
        self.vertices.clear();
        self.bound = None;
        self.frame = Some(self.acquire_frame()?);
        Ok(())
    }

    fn clear_target(&mut self, target: RenderTarget, color: Color, mask: ClearMask) -> crate::error::Result<()> {
        // Targets carry no depth/stencil attachment; the shadow mask lives in alpha.
        if mask.color {
            self.commands.push(Command::Clear { target, color });
        }
        Ok(())
    }

    fn bind_target(&mut self, target: Option<RenderTarget>) -> crate::error::Result<()> {
        self.bound = target;
        self.commands.push(Command::Bind(target));
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) -> crate::error::Result<()> {
        self.commands.push(Command::Scissor(rect));
        Ok(())
    }

    fn fill_shadow_mask(&mut self, polygons: &[ShadowPolygon], world_view_projection: Mat4) -> crate::error::Result<()> {
        self.require_lightmap("Shadow mask")?;
        let start = self.vertices.len() as u32;
        let mut triangles = Vec::new();
        for polygon in polygons {
            polygon.triangulate_into(&mut triangles);
        }
        self.vertices.extend(
            triangles
                .iter()
                .flatten()
                .map(|p| SolidVertex { position: [p.x, p.y] }),
        );
        self.push_solid(SolidKind::Mask, world_view_projection, [0.0; 4], start)?;
        Ok(())
    }

    fn draw_light_quad(&mut self, technique: Technique, uniforms: &LightUniforms, masked: bool) -> crate::error::Result<()> {
        self.require_lightmap("Light quad")?;
        let mode = match technique {
            Technique::PointLight => 0.0,
            Technique::SpotLight => 1.0,
            Technique::TexturedLight => 2.0,
            other => return Err(LightingError::Backend(format!("{other:?} is not a light technique"))),
        };
        let cone = uniforms
            .cone
            .map_or([0.0, 0.0, 0.0, mode], |cone| [cone.direction_angle, cone.half_angle, cone.decay, mode]);
        let gpu = GpuLightUniforms {
            mvp: uniforms.model_view_projection().to_cols_array_2d(),
            color: [
                uniforms.color[0],
                uniforms.color[1],
                uniforms.color[2],
                uniforms.intensity_factor,
            ],
            cone,
            params: [uniforms.texture_rotation, 0.0, 0.0, 0.0],
        };
        let uniform_offset = self.light_uniforms.push(&self.queue, &gpu)?;
        self.commands.push(Command::Light {
            masked,
            uniform_offset,
            texture: uniforms.texture,
        });
        Ok(())
    }

    fn draw_circle_outline(
        &mut self,
        center: Vec2,
        radius: f32,
        color: Color,
        world_view_projection: Mat4,
        segments: u32,
    ) -> crate::error::Result<()> {
        self.require_lightmap("Debug outline")?;
        let segments = segments.max(3);
        let step = std::f32::consts::TAU / segments as f32;
        let ring: Vec<Vec2> = (0..segments)
            .map(|i| center + Vec2::from_angle(step * i as f32) * radius)
            .collect();
        let start = self.vertices.len() as u32;
        for (a, b) in crate::geometry::edges(&ring) {
            self.vertices.push(SolidVertex { position: [a.x, a.y] });
            self.vertices.push(SolidVertex { position: [b.x, b.y] });
        }
        self.push_solid(SolidKind::Outline, world_view_projection, color.to_array(), start)?;
        Ok(())
    }

    fn clear_alpha(&mut self) -> crate::error::Result<()> {
        self.require_lightmap("Alpha clear")?;
        let start = self.vertices.len() as u32;
        self.vertices.extend(
            [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]]
                .map(|position| SolidVertex { position }),
        );
        self.push_solid(SolidKind::Mask, Mat4::IDENTITY, [0.0, 0.0, 0.0, 1.0], start)?;
        Ok(())
    }

    fn present(&mut self, technique: Technique, source: RenderTarget) -> crate::error::Result<()> {
        if self.bound.is_some() {
            return Err(LightingError::Backend("present needs the default target bound".into()));
        }
        match (technique, source) {
            (Technique::PresentScene, RenderTarget::Scene) | (Technique::PresentLightmap, RenderTarget::Lightmap) => {
                self.commands.push(Command::Present(source));
                Ok(())
            }
            _ => Err(LightingError::Backend(format!("{technique:?} cannot present {source:?}"))),
        }
    }

    fn end_frame(&mut self) -> crate::error::Result<()> {
        if self.frame.is_none() {
            return Err(LightingError::Backend("end_frame without begin_frame".into()));
        }
        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("lighting-frame-encoder"),
        });
        self.flush(&mut encoder)?;
        self.queue.submit(Some(encoder.finish()));
        self.vertices.clear();

        if let Some(surface_texture) = self.frame.take().and_then(|frame| frame.surface_texture) {
            surface_texture.present();
        }
        Ok(())
    }
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
        label: Some("umbra2d-device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        experimental_features: Default::default(),
        memory_hints: Default::default(),
        trace: wgpu::Trace::Off,
    }))?;
    Ok((device, queue))
}

fn apply_scissor(pass: &mut wgpu::RenderPass<'_>, rect: Option<ScissorRect>, size: (u32, u32)) {
    // Rectangles reaching past the attachment fail validation.
    let rect = rect.map_or(ScissorRect::full(size.0, size.1), |rect| rect.clamped(size.0, size.1));
    pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
}

fn create_target_texture(
    device: &wgpu::Device,
    label: &str,
    size: (u32, u32),
    format: TextureFormat,
    extra_usage: TextureUsages,
) -> (Texture, TextureView) {
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width: size.0,
            height: size.1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING | extra_usage,
        view_formats: &[],
    });
    let view = texture.create_view(&TextureViewDescriptor::default());
    (texture, view)
}

fn create_offscreen_targets(
    device: &wgpu::Device,
    pipelines: &Pipelines,
    size: (u32, u32),
    scene_format: TextureFormat,
) -> OffscreenTargets {
    let (scene, scene_view) = create_target_texture(device, "scene-texture", size, scene_format, TextureUsages::empty());
    let (lightmap, lightmap_view) =
        create_target_texture(device, "lightmap-texture", size, LIGHTMAP_FORMAT, TextureUsages::empty());

    let present_bind_group = |label: &str, view: &TextureView| {
        device.create_bind_group(&BindGroupDescriptor {
            label: Some(label),
            layout: &pipelines.texture_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&pipelines.sampler),
                },
            ],
        })
    };
    let present_scene = present_bind_group("present-scene-bind-group", &scene_view);
    let present_lightmap = present_bind_group("present-lightmap-bind-group", &lightmap_view);

    OffscreenTargets {
        scene,
        scene_view,
        lightmap,
        lightmap_view,
        present_scene,
        present_lightmap,
    }
}

fn upload_light_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pipelines: &Pipelines,
    data: &[u8],
    width: u32,
    height: u32,
) -> LightTexture {
    let size = Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("light-texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8UnormSrgb,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        data,
        TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&BindGroupDescriptor {
        label: Some("light-texture-bind-group"),
        layout: &pipelines.texture_layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(&view),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(&pipelines.sampler),
            },
        ],
    });
    LightTexture {
        texture,
        bind_group,
        size: (width, height),
    }
}

fn create_pipelines(device: &wgpu::Device, output_format: TextureFormat) -> Pipelines {
    let light_shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("light-shader"),
        source: ShaderSource::Wgsl(include_str!("light.wgsl").into()),
    });
    let solid_shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("solid-shader"),
        source: ShaderSource::Wgsl(include_str!("solid.wgsl").into()),
    });
    let present_shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("present-shader"),
        source: ShaderSource::Wgsl(include_str!("present.wgsl").into()),
    });

    let uniform_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("uniform-bind-group-layout"),
        entries: &[BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: None,
            },
            count: None,
        }],
    });
    let texture_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("texture-bind-group-layout"),
        entries: &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let light_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("light-pipeline-layout"),
        bind_group_layouts: &[&uniform_layout, &texture_layout],
        immediate_size: 0,
    });
    let solid_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("solid-pipeline-layout"),
        bind_group_layouts: &[&uniform_layout],
        immediate_size: 0,
    });
    let present_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("present-pipeline-layout"),
        bind_group_layouts: &[&texture_layout],
        immediate_size: 0,
    });

    let solid_buffers = [wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<SolidVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &vertex_attr_array![0 => Float32x2],
    }];
    let quad_buffers = [wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &vertex_attr_array![0 => Float32x2, 1 => Float32x2],
    }];

    let pipeline = |label: &str,
                    layout: &wgpu::PipelineLayout,
                    shader: &ShaderModule,
                    buffers: &[wgpu::VertexBufferLayout],
                    topology: PrimitiveTopology,
                    format: TextureFormat,
                    blend: wgpu::BlendState,
                    write_mask: ColorWrites| {
        device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format,
                    blend: Some(blend),
                    write_mask,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    };

    // Light contributions add into rgb; alpha holds the shadow mask and is never written.
    let additive = |src_factor| wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Zero,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };
    // dst = scene * lightmap
    let multiply = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Dst,
            dst_factor: wgpu::BlendFactor::Zero,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Zero,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };

    let light_masked = pipeline(
        "light-masked-pipeline",
        &light_layout,
        &light_shader,
        &solid_buffers,
        PrimitiveTopology::TriangleList,
        LIGHTMAP_FORMAT,
        additive(wgpu::BlendFactor::DstAlpha),
        ColorWrites::COLOR,
    );
    let light_unmasked = pipeline(
        "light-unmasked-pipeline",
        &light_layout,
        &light_shader,
        &solid_buffers,
        PrimitiveTopology::TriangleList,
        LIGHTMAP_FORMAT,
        additive(wgpu::BlendFactor::One),
        ColorWrites::COLOR,
    );
    let mask = pipeline(
        "mask-pipeline",
        &solid_layout,
        &solid_shader,
        &solid_buffers,
        PrimitiveTopology::TriangleList,
        LIGHTMAP_FORMAT,
        wgpu::BlendState::REPLACE,
        ColorWrites::ALPHA,
    );
    let outline = pipeline(
        "outline-pipeline",
        &solid_layout,
        &solid_shader,
        &solid_buffers,
        PrimitiveTopology::LineList,
        LIGHTMAP_FORMAT,
        wgpu::BlendState::ALPHA_BLENDING,
        ColorWrites::COLOR,
    );
    let scene = pipeline(
        "scene-pipeline",
        &solid_layout,
        &solid_shader,
        &solid_buffers,
        PrimitiveTopology::TriangleList,
        output_format,
        wgpu::BlendState::ALPHA_BLENDING,
        ColorWrites::ALL,
    );
    let present_scene = pipeline(
        "present-scene-pipeline",
        &present_layout,
        &present_shader,
        &quad_buffers,
        PrimitiveTopology::TriangleList,
        output_format,
        wgpu::BlendState::REPLACE,
        ColorWrites::ALL,
    );
    let present_lightmap = pipeline(
        "present-lightmap-pipeline",
        &present_layout,
        &present_shader,
        &quad_buffers,
        PrimitiveTopology::TriangleList,
        output_format,
        multiply,
        ColorWrites::ALL,
    );

    let light_quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("light-quad-vertex-buffer"),
        contents: bytemuck::cast_slice(
            &[[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]]
                .map(|position| SolidVertex { position }),
        ),
        usage: BufferUsages::VERTEX,
    });

    // Fullscreen quad in NDC; uv origin at the top-left.
    let fullscreen_vertices = [
        QuadVertex {
            position: [-1.0, -1.0],
            uv: [0.0, 1.0],
        },
        QuadVertex {
            position: [1.0, -1.0],
            uv: [1.0, 1.0],
        },
        QuadVertex {
            position: [-1.0, 1.0],
            uv: [0.0, 0.0],
        },
        QuadVertex {
            position: [1.0, -1.0],
            uv: [1.0, 1.0],
        },
        QuadVertex {
            position: [1.0, 1.0],
            uv: [1.0, 0.0],
        },
        QuadVertex {
            position: [-1.0, 1.0],
            uv: [0.0, 0.0],
        },
    ];
    let fullscreen_quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("fullscreen-quad-vertex-buffer"),
        contents: bytemuck::cast_slice(&fullscreen_vertices),
        usage: BufferUsages::VERTEX,
    });

    let sampler = device.create_sampler(&SamplerDescriptor {
        label: Some("lighting-sampler"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    });

    Pipelines {
        light_masked,
        light_unmasked,
        mask,
        outline,
        scene,
        present_scene,
        present_lightmap,
        uniform_layout,
        texture_layout,
        light_quad,
        fullscreen_quad,
        sampler,
    }
}

fn choose_present_mode(modes: &[PresentMode], vsync: bool) -> PresentMode {
    if vsync {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Fifo | PresentMode::FifoRelaxed))
            .unwrap_or(PresentMode::Fifo)
    } else {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Immediate | PresentMode::Mailbox))
            .unwrap_or(PresentMode::Immediate)
    }
}

fn choose_alpha_mode(modes: &[CompositeAlphaMode]) -> CompositeAlphaMode {
    modes
        .iter()
        .copied()
        .find(|mode| matches!(mode, CompositeAlphaMode::Auto))
        .unwrap_or_else(|| modes.first().copied().unwrap_or(CompositeAlphaMode::Opaque))
}
