use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec4};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::common::{Frame, ResourceSink, WaterFrame};
use super::shared::{mesh_shader, sky_shader, water_shader};
use crate::camera::PerspectiveCamera;
use crate::data_model::{Material, MeshId, SceneNode, TextureId};
use crate::mesh::{MeshData, VERTEX_STRIDE};
use crate::texture::{CubeImages, TextureImage};
use crate::water::{clip_plane, mirror_camera};

/// Format of the planar reflection render target.
const REFLECTION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEFAULT_REFLECTION_SIZE: u32 = 512;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

/// Access handed to an overlay drawn on top of the finished frame.
pub struct OverlayTarget<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub view: &'a wgpu::TextureView,
    pub size: PhysicalSize<u32>,
}

/// GPU renderer backed by wgpu that draws the nodes of a [`Frame`].
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    main_globals: GlobalBinding,
    reflection_globals: GlobalBinding,
    object_layout: wgpu::BindGroupLayout,
    sky_layout: wgpu::BindGroupLayout,
    water_layout: wgpu::BindGroupLayout,
    mesh_pipelines: TargetPipelines,
    sky_pipelines: TargetPipelines,
    water_pipeline: wgpu::RenderPipeline,
    color_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    meshes: Vec<MeshBuffers>,
    textures: Vec<wgpu::TextureView>,
    white: wgpu::TextureView,
    sky: Option<wgpu::BindGroup>,
    water_normals: wgpu::TextureView,
    reflection: ReflectionTarget,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let inner = window.inner_size();
        let size = PhysicalSize::new(inner.width.max(1), inner.height.max(1));

        let backends = if cfg!(target_arch = "wasm32") {
            wgpu::Backends::GL
        } else {
            wgpu::Backends::PRIMARY
        };
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let base_limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults()
        } else {
            wgpu::Limits::default()
        };
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("renderer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: base_limits.using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| matches!(mode, wgpu::PresentMode::Mailbox))
                .unwrap_or(wgpu::PresentMode::Fifo),
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[uniform_entry(0, std::mem::size_of::<GlobalUniform>())],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[
                uniform_entry(0, std::mem::size_of::<ObjectConstants>()),
                texture_entry(1, wgpu::TextureViewDimension::D2),
                sampler_entry(2),
            ],
        });
        let sky_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sky-bind-layout"),
            entries: &[
                texture_entry(0, wgpu::TextureViewDimension::Cube),
                sampler_entry(1),
            ],
        });
        let water_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("water-bind-layout"),
            entries: &[
                uniform_entry(0, std::mem::size_of::<WaterUniform>()),
                texture_entry(1, wgpu::TextureViewDimension::D2),
                sampler_entry(2),
                texture_entry(3, wgpu::TextureViewDimension::D2),
                sampler_entry(4),
            ],
        });

        let main_globals = GlobalBinding::new(&device, &global_layout, "main");
        let reflection_globals = GlobalBinding::new(&device, &global_layout, "reflection");

        let mesh_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh-shader"),
            source: wgpu::ShaderSource::Wgsl(mesh_shader().into()),
        });
        let sky_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sky-shader"),
            source: wgpu::ShaderSource::Wgsl(sky_shader().into()),
        });
        let water_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("water-shader"),
            source: wgpu::ShaderSource::Wgsl(water_shader().into()),
        });

        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout],
            push_constant_ranges: &[],
        });
        let sky_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sky-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &sky_layout],
            push_constant_ranges: &[],
        });
        let water_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("water-pipeline-layout"),
                bind_group_layouts: &[&global_layout, &water_layout],
                push_constant_ranges: &[],
            });

        let mesh_pipeline = |format: wgpu::TextureFormat, label: &'static str| {
            create_pipeline(
                &device,
                PipelineDesc {
                    label,
                    layout: &mesh_layout,
                    module: &mesh_module,
                    vertex_entry: "vs_main",
                    fragment_entry: "fs_main",
                    format,
                    with_vertices: true,
                    depth_write: true,
                    blend: wgpu::BlendState::REPLACE,
                },
            )
        };
        let mesh_pipelines = TargetPipelines {
            main: mesh_pipeline(surface_format, "mesh-pipeline"),
            reflection: mesh_pipeline(REFLECTION_FORMAT, "mesh-reflection-pipeline"),
        };

        let sky_pipeline = |format: wgpu::TextureFormat, label: &'static str| {
            create_pipeline(
                &device,
                PipelineDesc {
                    label,
                    layout: &sky_pipeline_layout,
                    module: &sky_module,
                    vertex_entry: "vs_sky",
                    fragment_entry: "fs_sky",
                    format,
                    with_vertices: false,
                    depth_write: false,
                    blend: wgpu::BlendState::REPLACE,
                },
            )
        };
        let sky_pipelines = TargetPipelines {
            main: sky_pipeline(surface_format, "sky-pipeline"),
            reflection: sky_pipeline(REFLECTION_FORMAT, "sky-reflection-pipeline"),
        };

        let water_pipeline = create_pipeline(
            &device,
            PipelineDesc {
                label: "water-pipeline",
                layout: &water_pipeline_layout,
                module: &water_module,
                vertex_entry: "vs_water",
                fragment_entry: "fs_water",
                format: surface_format,
                with_vertices: true,
                depth_write: true,
                blend: wgpu::BlendState::ALPHA_BLENDING,
            },
        );

        let color_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("color-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let repeat_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("repeat-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white = create_texture_2d(
            &device,
            &queue,
            &TextureImage::solid([255, 255, 255, 255]),
            wgpu::TextureFormat::Rgba8UnormSrgb,
            "white-texture",
        );
        let water_normals = create_texture_2d(
            &device,
            &queue,
            &TextureImage::flat_normal_map(),
            wgpu::TextureFormat::Rgba8Unorm,
            "flat-water-normals",
        );
        let reflection = ReflectionTarget::create(&device, DEFAULT_REFLECTION_SIZE);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            main_globals,
            reflection_globals,
            object_layout,
            sky_layout,
            water_layout,
            mesh_pipelines,
            sky_pipelines,
            water_pipeline,
            color_sampler,
            repeat_sampler,
            meshes: Vec::new(),
            textures: Vec::new(),
            white,
            sky: None,
            water_normals,
            reflection,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Largest texture side the device accepts.
    pub fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Reconfigures the surface after it was lost or became outdated.
    pub fn reconfigure(&mut self) {
        self.resize(self.size);
    }

    /// Sets the planar reflection resolution.
    pub fn set_reflection_size(&mut self, size: u32) {
        let size = size.clamp(1, self.max_texture_size());
        if size != self.reflection.size {
            self.reflection = ReflectionTarget::create(&self.device, size);
        }
    }

    /// Draws the frame, then lets `overlay` record its own pass on top.
    pub fn render(
        &mut self,
        frame: &Frame,
        overlay: Option<&mut dyn FnMut(OverlayTarget<'_>)>,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mirrored = mirror_camera(&frame.camera);
        self.write_globals(&self.main_globals, &frame.camera, frame, Vec4::W);
        self.write_globals(&self.reflection_globals, &mirrored, frame, clip_plane());

        let draws: Vec<DrawCall> = frame
            .draw_order()
            .filter_map(|node| self.prepare_draw(node, frame.water.as_ref(), &mirrored))
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });
        let clear = wgpu::Color {
            r: f64::from(frame.clear_color.x),
            g: f64::from(frame.clear_color.y),
            b: f64::from(frame.clear_color.z),
            a: f64::from(frame.clear_color.w),
        };

        if frame.water.is_some() {
            let mut pass = begin_pass(
                &mut encoder,
                "reflection-pass",
                &self.reflection.view,
                &self.reflection.depth.view,
                clear,
            );
            self.draw_scene(&mut pass, &draws, PassTarget::Reflection);
        }

        {
            let mut pass = begin_pass(&mut encoder, "main-pass", &view, &self.depth.view, clear);
            self.draw_scene(&mut pass, &draws, PassTarget::Main);
        }

        if let Some(overlay) = overlay {
            overlay(OverlayTarget {
                device: &self.device,
                queue: &self.queue,
                encoder: &mut encoder,
                view: &view,
                size: self.size,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn write_globals(
        &self,
        binding: &GlobalBinding,
        camera: &PerspectiveCamera,
        frame: &Frame,
        clip: Vec4,
    ) {
        let rotation_only = Mat4::from_quat(camera.orientation.inverse());
        let sky_inverse = (camera.projection_matrix() * rotation_only).inverse();
        let lighting = &frame.lighting;
        let uniform = GlobalUniform {
            view_proj: camera.view_projection().to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            sky_inverse: sky_inverse.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            ambient: lighting.ambient.extend(1.0).into(),
            light_direction: lighting.direction.extend(0.0).into(),
            light_color: lighting.directional.extend(1.0).into(),
            clip_plane: clip.into(),
        };
        self.queue.write_buffer(&binding.buffer, 0, bytes_of(&uniform));
    }

    fn prepare_draw(
        &self,
        node: &SceneNode,
        water: Option<&WaterFrame>,
        mirrored: &PerspectiveCamera,
    ) -> Option<DrawCall> {
        let mesh = node.mesh.0;
        if self.meshes.get(mesh)?.index_count == 0 {
            return None;
        }
        let model = node.model_matrix();

        if node.is_water() {
            let water = water?;
            let uniform = WaterUniform {
                model: model.to_cols_array_2d(),
                mirror_view_proj: mirrored.view_projection().to_cols_array_2d(),
                water_color: water.color.extend(water.alpha).into(),
                sun_color: water.sun_color.extend(1.0).into(),
                sun_direction: water.sun_direction.extend(0.0).into(),
                params: [water.time, water.distortion_scale, 1.0, 0.0],
            };
            let buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("water-uniform"),
                    contents: bytes_of(&uniform),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("water-bind-group"),
                layout: &self.water_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&self.water_normals),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.repeat_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(&self.reflection.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(&self.color_sampler),
                    },
                ],
            });
            return Some(DrawCall {
                mesh,
                bind_group,
                water: true,
            });
        }

        let (mode, texture, metalness, roughness) = match node.material {
            Material::Baked(id) => (0.0, Some(id), 0.0, 1.0),
            Material::Basic => (1.0, None, 0.0, 1.0),
            Material::Lit {
                metalness,
                roughness,
            } => (2.0, None, metalness, roughness),
            Material::Matcap(id) => (3.0, Some(id), 0.0, 1.0),
            Material::Water => return None,
        };
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let constants = ObjectConstants {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            color: node.color.extend(1.0).into(),
            material: [mode, metalness, roughness, 0.0],
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("object-uniform"),
                contents: bytes_of(&constants),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object-bind-group"),
            layout: &self.object_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(self.texture_view(texture)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.color_sampler),
                },
            ],
        });
        Some(DrawCall {
            mesh,
            bind_group,
            water: false,
        })
    }

    fn texture_view(&self, id: Option<TextureId>) -> &wgpu::TextureView {
        id.and_then(|id| self.textures.get(id.0))
            .unwrap_or(&self.white)
    }

    fn draw_scene<'a>(
        &'a self,
        pass: &mut wgpu::RenderPass<'a>,
        draws: &'a [DrawCall],
        target: PassTarget,
    ) {
        let (globals, mesh_pipeline, sky_pipeline) = match target {
            PassTarget::Main => (
                &self.main_globals.bind_group,
                &self.mesh_pipelines.main,
                &self.sky_pipelines.main,
            ),
            PassTarget::Reflection => (
                &self.reflection_globals.bind_group,
                &self.mesh_pipelines.reflection,
                &self.sky_pipelines.reflection,
            ),
        };

        pass.set_bind_group(0, globals, &[]);
        if let Some(sky) = &self.sky {
            pass.set_pipeline(sky_pipeline);
            pass.set_bind_group(1, sky, &[]);
            pass.draw(0..3, 0..1);
        }

        for draw in draws {
            if draw.water {
                // The surface never reflects itself.
                if target == PassTarget::Reflection {
                    continue;
                }
                pass.set_pipeline(&self.water_pipeline);
            } else {
                pass.set_pipeline(mesh_pipeline);
            }
            let mesh = &self.meshes[draw.mesh];
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, &draw.bind_group, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

impl ResourceSink for Renderer {
    fn upload_mesh(&mut self, mesh: &MeshData, label: &str) -> MeshId {
        self.meshes
            .push(MeshBuffers::from_mesh(&self.device, mesh, label));
        MeshId(self.meshes.len() - 1)
    }

    fn upload_texture(&mut self, image: &TextureImage, label: &str) -> TextureId {
        let view = create_texture_2d(
            &self.device,
            &self.queue,
            image,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            label,
        );
        self.textures.push(view);
        TextureId(self.textures.len() - 1)
    }

    fn set_skybox(&mut self, faces: &CubeImages) {
        let extent = wgpu::Extent3d {
            width: faces.size,
            height: faces.size,
            depth_or_array_layers: 6,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sky-texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (layer, face) in faces.faces.iter().enumerate() {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &face.pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * face.width),
                    rows_per_image: Some(face.height),
                },
                wgpu::Extent3d {
                    width: face.width,
                    height: face.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("sky-view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        self.sky = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sky-bind-group"),
            layout: &self.sky_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.color_sampler),
                },
            ],
        }));
    }

    fn set_water_normals(&mut self, image: &TextureImage) {
        self.water_normals = create_texture_2d(
            &self.device,
            &self.queue,
            image,
            wgpu::TextureFormat::Rgba8Unorm,
            "water-normals",
        );
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PassTarget {
    Main,
    Reflection,
}

struct DrawCall {
    mesh: usize,
    bind_group: wgpu::BindGroup,
    water: bool,
}

struct TargetPipelines {
    main: wgpu::RenderPipeline,
    reflection: wgpu::RenderPipeline,
}

struct GlobalBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GlobalBinding {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-global-uniform")),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-global-bind-group")),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }
}

struct PipelineDesc<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    module: &'a wgpu::ShaderModule,
    vertex_entry: &'a str,
    fragment_entry: &'a str,
    format: wgpu::TextureFormat,
    with_vertices: bool,
    depth_write: bool,
    blend: wgpu::BlendState,
}

fn create_pipeline(device: &wgpu::Device, desc: PipelineDesc<'_>) -> wgpu::RenderPipeline {
    let vertex_layout = [wgpu::VertexBufferLayout {
        array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }];
    let buffers: &[wgpu::VertexBufferLayout<'_>] = if desc.with_vertices {
        &vertex_layout
    } else {
        &[]
    };
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: desc.vertex_entry,
            buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: desc.depth_write,
            depth_compare: if desc.depth_write {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: desc.module,
            entry_point: desc.fragment_entry,
            targets: &[Some(wgpu::ColorTargetState {
                format: desc.format,
                blend: Some(desc.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
    })
}

fn begin_pass<'a>(
    encoder: &'a mut wgpu::CommandEncoder,
    label: &str,
    color: &'a wgpu::TextureView,
    depth: &'a wgpu::TextureView,
    clear: wgpu::Color,
) -> wgpu::RenderPass<'a> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn uniform_entry(binding: u32, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn create_texture_2d(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &TextureImage,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: image.width.max(1),
        height: image.height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    if !image.pixels.is_empty() {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
    }
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Square colour and depth targets the mirrored scene is drawn into.
struct ReflectionTarget {
    size: u32,
    view: wgpu::TextureView,
    depth: DepthBuffer,
}

impl ReflectionTarget {
    fn create(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("reflection-texture"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: REFLECTION_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Self {
            size,
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: DepthBuffer::create(device, size, size),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    sky_inverse: [[f32; 4]; 4],
    camera_position: [f32; 4],
    ambient: [f32; 4],
    light_direction: [f32; 4],
    light_color: [f32; 4],
    clip_plane: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    color: [f32; 4],
    material: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct WaterUniform {
    model: [[f32; 4]; 4],
    mirror_view_proj: [[f32; 4]; 4],
    water_color: [f32; 4],
    sun_color: [f32; 4],
    sun_direction: [f32; 4],
    params: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_respect_std140_alignment() {
        assert_eq!(std::mem::size_of::<GlobalUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 144);
        assert_eq!(std::mem::size_of::<WaterUniform>(), 192);
    }

    #[test]
    fn normal_matrix_columns_are_padded() {
        let packed = mat3_to_3x4(Mat3::from_diagonal(glam::Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(packed[1], [0.0, 2.0, 0.0, 0.0]);
        assert_eq!(packed[2][3], 0.0);
    }
}
