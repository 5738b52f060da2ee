use layerstack::LayerConfig;

use crate::engine::EngineOptions;

/// Parameters handed from the CLI to the preview window.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    pub title: String,
    pub vsync: bool,
    /// Prefer a discrete adapter over an integrated one.
    pub high_performance: bool,
    pub engine: EngineOptions,
    /// Initial layer stack, in draw order.
    pub layers: Vec<LayerConfig>,
    pub motion_reduced: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            title: "MythShade".to_string(),
            vsync: true,
            high_performance: false,
            engine: EngineOptions::default(),
            layers: Vec::new(),
            motion_reduced: false,
        }
    }
}
