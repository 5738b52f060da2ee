use std::borrow::Cow;
use std::collections::HashMap;

use wgpu::naga::ShaderStage;

use crate::backend::{BackendError, ProgramId};
use crate::effect::BlendMode;

pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("layer pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        Self {
            uniform_layout,
            pipeline_layout,
        }
    }
}

/// Vertex and fragment modules compiled for one shader definition.
pub(crate) struct ShaderProgram {
    pub key: String,
    pub vertex: wgpu::ShaderModule,
    pub fragment: wgpu::ShaderModule,
}

/// Runs `build` inside a validation error scope so GLSL and pipeline errors
/// come back as values instead of reaching the uncaptured error handler.
pub(crate) fn scoped<T>(device: &wgpu::Device, build: impl FnOnce() -> T) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(err.to_string()),
        None => Ok(value),
    }
}

pub(crate) fn compile_program(
    device: &wgpu::Device,
    key: &str,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<ShaderProgram, BackendError> {
    let vertex = scoped(device, || {
        compile_glsl(device, key, vertex_source, ShaderStage::Vertex)
    })
    .map_err(|message| BackendError::Compile(format!("{key} (vertex): {message}")))?;
    let fragment = scoped(device, || {
        compile_glsl(device, key, fragment_source, ShaderStage::Fragment)
    })
    .map_err(|message| BackendError::Compile(format!("{key} (fragment): {message}")))?;
    Ok(ShaderProgram {
        key: key.to_string(),
        vertex,
        fragment,
    })
}

fn compile_glsl(
    device: &wgpu::Device,
    key: &str,
    source: &str,
    stage: ShaderStage,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(key),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_string()),
            stage,
            defines: &[],
        },
    })
}

/// Fixed-function blending for a layer. `None` is the default state:
/// the layer replaces the destination.
pub(crate) fn blend_state(mode: Option<BlendMode>) -> wgpu::BlendState {
    let over_alpha = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    let color = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match mode {
        None => wgpu::BlendState::REPLACE,
        Some(BlendMode::Normal) => wgpu::BlendState::ALPHA_BLENDING,
        Some(BlendMode::Additive) => wgpu::BlendState {
            color: color(wgpu::BlendFactor::SrcAlpha, wgpu::BlendFactor::One),
            alpha: color(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        },
        Some(BlendMode::Screen) => wgpu::BlendState {
            color: color(wgpu::BlendFactor::OneMinusDst, wgpu::BlendFactor::One),
            alpha: over_alpha,
        },
        Some(BlendMode::Multiply) => wgpu::BlendState {
            color: color(wgpu::BlendFactor::Dst, wgpu::BlendFactor::OneMinusSrcAlpha),
            alpha: over_alpha,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramId,
    pub blend: Option<BlendMode>,
    pub format: wgpu::TextureFormat,
}

/// Render pipelines built lazily per program, blend mode and surface format.
#[derive(Default)]
pub(crate) struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn get_or_build(
        &mut self,
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        program: &ShaderProgram,
        key: PipelineKey,
    ) -> Result<wgpu::RenderPipeline, BackendError> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }
        let pipeline = scoped(device, || build_pipeline(device, layouts, program, key))
            .map_err(|message| BackendError::Compile(format!("{}: {message}", program.key)))?;
        tracing::debug!(key = %program.key, blend = ?key.blend, format = ?key.format, "built render pipeline");
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    pub fn forget_program(&mut self, program: ProgramId) {
        self.pipelines.retain(|key, _| key.program != program);
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    program: &ShaderProgram,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.key),
        layout: Some(&layouts.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: Some(blend_state(key.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
