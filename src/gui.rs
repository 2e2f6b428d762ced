//! On-screen frame display.
//!
//! The [`Viewer`] opens a single window and blocks until the user dismisses it, mirroring the
//! "show frame, wait for key" workflow of interactive evaluation runs. It is presentation only;
//! nothing displayed here feeds back into the computed metrics.

use anyhow::Context;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    platform::run_return::EventLoopExtRunReturn,
    window::WindowBuilder,
};

use crate::image::Image;
use crate::resolution::Resolution;

const SHADER: &str = "
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vert(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.uv = uv;
    out.position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    return out;
}

@group(0) @binding(0) var t_image: texture_2d<f32>;
@group(0) @binding(1) var s_image: sampler;

@fragment
fn frag(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(t_image, s_image, in.uv);
}
";

/// A window that displays images one at a time.
pub struct Viewer {
    event_loop: EventLoop<()>,
    // Must be declared before `window` so the surface is destroyed first.
    surface: wgpu::Surface,
    window: winit::window::Window,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    surface_format: wgpu::TextureFormat,
    texture: Option<(wgpu::Texture, wgpu::BindGroup, Resolution)>,
}

impl Viewer {
    /// Opens a (hidden) viewer window and initializes the GPU surface for it.
    pub fn new() -> anyhow::Result<Self> {
        let event_loop = EventLoop::new();
        let window = WindowBuilder::new()
            .with_resizable(false)
            .with_visible(false)
            .build(&event_loop)?;

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = unsafe { instance.create_surface(&window)? };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            compatible_surface: Some(&surface),
            ..Default::default()
        }))
        .context("no compatible graphics adapter found")?;
        let (device, queue) = pollster::block_on(
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None),
        )?;

        let surface_format = *surface
            .get_capabilities(&adapter)
            .formats
            .first()
            .context("adapter cannot render to window surface")?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen texture shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: None,
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("textured_quad"),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: None,
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                }),
            ),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vert",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "frag",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    write_mask: wgpu::ColorWrites::ALL,
                    blend: None,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());

        Ok(Self {
            event_loop,
            surface,
            window,
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            surface_format,
            texture: None,
        })
    }

    /// Displays `image`, blocking until the window is closed or a key is pressed.
    pub fn show(&mut self, title: &str, image: &Image) -> anyhow::Result<()> {
        let res = image.resolution();
        self.window.set_title(title);
        self.window
            .set_inner_size(PhysicalSize::new(res.width(), res.height()));
        self.window.set_visible(true);

        self.upload(image);
        self.configure_surface(res.width(), res.height());

        let Self {
            event_loop,
            surface,
            window,
            device,
            queue,
            pipeline,
            surface_format,
            texture,
            ..
        } = self;
        let bind_group = &texture.as_ref().unwrap().1;

        window.request_redraw();
        event_loop.run_return(|event, _, control_flow| {
            *control_flow = ControlFlow::Wait;
            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => control_flow.set_exit(),
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed
                            && matches!(
                                input.virtual_keycode,
                                Some(
                                    VirtualKeyCode::Escape
                                        | VirtualKeyCode::Space
                                        | VirtualKeyCode::Return
                                        | VirtualKeyCode::Q
                                )
                            )
                        {
                            control_flow.set_exit();
                        }
                    }
                    WindowEvent::Resized(size) => {
                        configure(surface, device, *surface_format, size.width, size.height);
                        window.request_redraw();
                    }
                    _ => {}
                },
                Event::RedrawRequested(_) => {
                    let frame = match surface.get_current_texture() {
                        Ok(frame) => frame,
                        Err(err @ (wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                            log::debug!("surface error: {}", err);
                            let size = window.inner_size();
                            configure(surface, device, *surface_format, size.width, size.height);
                            match surface.get_current_texture() {
                                Ok(frame) => frame,
                                Err(e) => {
                                    log::error!("failed to reacquire frame: {}", e);
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            log::error!("failed to acquire frame: {}", e);
                            control_flow.set_exit();
                            return;
                        }
                    };

                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    let mut encoder =
                        device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
                    {
                        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: None,
                            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                view: &view,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                    store: true,
                                },
                            })],
                            depth_stencil_attachment: None,
                        });

                        rpass.set_pipeline(pipeline);
                        rpass.set_bind_group(0, bind_group, &[]);
                        rpass.draw(0..3, 0..1);
                    }

                    queue.submit([encoder.finish()]);
                    frame.present();
                }
                _ => {}
            }
        });

        self.window.set_visible(false);
        Ok(())
    }

    /// Uploads `image` into the display texture, reallocating it if the size changed.
    fn upload(&mut self, image: &Image) {
        let res = image.resolution();

        let needs_realloc = match &self.texture {
            Some((_, _, old_res)) => *old_res != res,
            None => true,
        };
        if needs_realloc {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("viewer image"),
                size: wgpu::Extent3d {
                    width: res.width(),
                    height: res.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            &texture.create_view(&Default::default()),
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            self.texture = Some((texture, bind_group, res));
        }

        let (texture, _, _) = self.texture.as_ref().unwrap();
        self.queue.write_texture(
            texture.as_image_copy(),
            image.data(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(res.width() * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: res.width(),
                height: res.height(),
                depth_or_array_layers: 1,
            },
        );
    }

    fn configure_surface(&self, width: u32, height: u32) {
        configure(&self.surface, &self.device, self.surface_format, width, height);
    }
}

fn configure(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) {
    if width == 0 || height == 0 {
        return;
    }

    surface.configure(
        device,
        &wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: Vec::new(),
        },
    );
}
