use std::collections::HashMap;

use crate::backend::{BackendError, InstanceId, ProgramId, RenderBackend};
use crate::effect::BlendMode;
use crate::probe::AdapterProfile;
use crate::registry::ShaderDefinition;
use crate::uniforms::LayerUniforms;

use super::context::{GpuContext, SurfaceOptions};
use super::pipeline::{compile_program, scoped, PipelineCache, PipelineKey, PipelineLayouts, ShaderProgram};

struct GpuInstance {
    program: ProgramId,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct PendingFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

/// [`RenderBackend`] drawing into a window surface through wgpu.
pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    programs: HashMap<ProgramId, ShaderProgram>,
    pipelines: PipelineCache,
    instances: HashMap<InstanceId, GpuInstance>,
    frame: Option<PendingFrame>,
    blend: Option<BlendMode>,
    clear_color: wgpu::Color,
    next_id: u64,
}

impl WgpuBackend {
    pub fn new<T>(target: T, size: (u32, u32), options: SurfaceOptions) -> Result<Self, BackendError>
    where
        T: Into<wgpu::SurfaceTarget<'static>>,
    {
        let context = GpuContext::new(target, size, options)
            .map_err(|err| BackendError::Surface(format!("{err:#}")))?;
        let layouts = PipelineLayouts::new(&context.device);
        let [r, g, b] = crate::probe::FallbackPanel::BACKGROUND.map(|c| c as f64 / 255.0);
        Ok(Self {
            context,
            layouts,
            programs: HashMap::new(),
            pipelines: PipelineCache::default(),
            instances: HashMap::new(),
            frame: None,
            blend: None,
            clear_color: wgpu::Color { r, g, b, a: 1.0 },
            next_id: 1,
        })
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn pipeline_for(&mut self, program: ProgramId) -> Result<wgpu::RenderPipeline, BackendError> {
        let shader = self.programs.get(&program).ok_or(BackendError::UnknownHandle {
            kind: "program",
            id: program.0,
        })?;
        let key = PipelineKey {
            program,
            blend: self.blend,
            format: self.context.format(),
        };
        self.pipelines
            .get_or_build(&self.context.device, &self.layouts, shader, key)
    }
}

impl RenderBackend for WgpuBackend {
    fn viewport(&self) -> (u32, u32) {
        self.context.size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }

    fn compile(&mut self, definition: &ShaderDefinition) -> Result<ProgramId, BackendError> {
        if self.context.is_lost() {
            return Err(BackendError::ContextLost);
        }
        let shader = compile_program(
            &self.context.device,
            &definition.key,
            &definition.vertex_program,
            &definition.fragment_program,
        )?;
        let program = ProgramId(self.allocate());
        self.programs.insert(program, shader);

        // Link the declared blend up front so pipeline errors surface here.
        self.blend = Some(definition.blend);
        let linked = self.pipeline_for(program);
        self.blend = None;
        if let Err(err) = linked {
            self.programs.remove(&program);
            return Err(err);
        }
        Ok(program)
    }

    fn release_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.forget_program(program);
    }

    fn create_instance(
        &mut self,
        program: ProgramId,
        uniforms: &LayerUniforms,
    ) -> Result<InstanceId, BackendError> {
        if self.context.is_lost() {
            return Err(BackendError::ContextLost);
        }
        if !self.programs.contains_key(&program) {
            return Err(BackendError::UnknownHandle {
                kind: "program",
                id: program.0,
            });
        }
        let device = &self.context.device;
        let (buffer, bind_group) = scoped(device, || {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("layer uniforms"),
                size: std::mem::size_of::<LayerUniforms>() as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("layer bind group"),
                layout: &self.layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            (buffer, bind_group)
        })
        .map_err(BackendError::Instance)?;
        self.context
            .queue
            .write_buffer(&buffer, 0, uniforms.as_bytes());

        let instance = InstanceId(self.allocate());
        self.instances.insert(
            instance,
            GpuInstance {
                program,
                buffer,
                bind_group,
            },
        );
        Ok(instance)
    }

    fn write_uniforms(&mut self, instance: InstanceId, uniforms: &LayerUniforms) {
        if let Some(gpu) = self.instances.get(&instance) {
            self.context
                .queue
                .write_buffer(&gpu.buffer, 0, uniforms.as_bytes());
        }
    }

    fn destroy_instance(&mut self, instance: InstanceId) {
        if let Some(gpu) = self.instances.remove(&instance) {
            gpu.buffer.destroy();
        }
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        if self.context.is_lost() {
            return Err(BackendError::ContextLost);
        }
        let texture = match self.context.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(BackendError::Surface("surface outdated; reconfigured".into()));
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.context.mark_lost();
                return Err(BackendError::ContextLost);
            }
            Err(other) => return Err(BackendError::Surface(other.to_string())),
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mythic frame encoder"),
            });
        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("base clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.frame = Some(PendingFrame {
            texture,
            view,
            encoder,
        });
        Ok(())
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = Some(mode);
    }

    fn draw(&mut self, instance: InstanceId) -> Result<(), BackendError> {
        if self.context.is_lost() {
            return Err(BackendError::ContextLost);
        }
        let program = self
            .instances
            .get(&instance)
            .map(|gpu| gpu.program)
            .ok_or(BackendError::UnknownHandle {
                kind: "instance",
                id: instance.0,
            })?;
        let pipeline = self.pipeline_for(program)?;

        let (Some(frame), Some(gpu)) = (self.frame.as_mut(), self.instances.get(&instance)) else {
            return Err(BackendError::Surface("draw issued outside of a frame".into()));
        };
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("mythic layer"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &gpu.bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn restore_blend(&mut self) {
        self.blend = None;
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        self.context
            .queue
            .submit(std::iter::once(frame.encoder.finish()));
        frame.texture.present();
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.context.is_lost()
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        self.frame = None;
        for (_, gpu) in self.instances.drain() {
            gpu.buffer.destroy();
        }
        self.pipelines.clear();
    }
}
