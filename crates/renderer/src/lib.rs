//! Renderer crate for MythShade, the mythic layer compositor.
//!
//! Layers are full-screen fragment programs drawn in list order over a dark
//! base, each with its own blend mode and strength. The overall flow is:
//!
//! ```text
//!   CLI / mythshade
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ CapabilityProbe ──▶ LayerEngine<WgpuBackend>
//!                                              │ tick per RedrawRequested
//!                                              ▼
//!          ShaderRegistry ──▶ Compositor::reconcile ──▶ FrameDriver ──▶ draw
//! ```
//!
//! The compositor only talks to a [`RenderBackend`]; [`WgpuBackend`] draws
//! into a window while [`RecordingBackend`] records commands for tests. The
//! [`field`] module mirrors the fragment programs on the CPU and backs
//! [`render_preview`]; [`render_panel`] paints the fallback panel without a
//! GPU.

pub mod backend;
pub mod clock;
pub mod compositor;
pub mod effect;
pub mod engine;
pub mod error;
pub mod field;
pub mod gpu;
pub mod panel;
pub mod preview;
pub mod probe;
pub mod registry;
pub mod shaders;
pub mod uniforms;

mod types;
mod window;

use anyhow::Result;

pub use backend::{BackendError, Command, InstanceId, ProgramId, RecordingBackend, RenderBackend};
pub use clock::{ClockState, FrameDriver, FrameUniforms};
pub use compositor::{Compositor, DrawStats, ReconcileStats};
pub use effect::{BlendMode, EffectKind, EffectParams};
pub use engine::{EngineOptions, FrameOutcome, FrameReport, LayerEngine};
pub use error::RenderError;
pub use gpu::{SurfaceOptions, WgpuBackend};
pub use panel::render_panel;
pub use preview::{render_preview, PreviewOptions};
pub use probe::{detect_wgpu, AdapterProfile, Capability, CapabilityProbe, FallbackPanel};
pub use registry::{ShaderDefinition, ShaderRegistry};
pub use types::RendererConfig;
pub use uniforms::LayerUniforms;

/// Entry point for the interactive preview window.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    /// Builds a renderer for the supplied configuration.
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Probes the GPU, opens the window and composites the configured layers
    /// until the window closes.
    ///
    /// Missing GPU support is not an error: the window shows the fallback
    /// panel instead.
    pub fn run(self) -> Result<()> {
        window::run(self.config)
    }
}
