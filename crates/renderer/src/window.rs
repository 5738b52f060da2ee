use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use layerstack::LayerConfig;
use tracing::{info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::engine::{FrameOutcome, LayerEngine};
use crate::gpu::{SurfaceOptions, WgpuBackend};
use crate::panel::render_panel;
use crate::probe::{detect_wgpu, Capability, CapabilityProbe, FallbackPanel};
use crate::registry::ShaderRegistry;
use crate::types::RendererConfig;

const SOFTWARE_FPS_CAP: f32 = 15.0;

/// What a key press asks the preview to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    ToggleMotion,
    ToggleLayer(usize),
}

fn key_action(event: &KeyEvent) -> Option<KeyAction> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Escape) => Some(KeyAction::Quit),
        Key::Character(value) => match value.as_str() {
            "q" => Some(KeyAction::Quit),
            "m" => Some(KeyAction::ToggleMotion),
            digit => digit
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=9).contains(n))
                .map(|n| KeyAction::ToggleLayer(n - 1)),
        },
        _ => None,
    }
}

/// CPU presenter for the fallback panel.
struct PanelPainter {
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
}

impl PanelPainter {
    fn new(window: &Arc<Window>) -> Result<Self> {
        let context = softbuffer::Context::new(window.clone())
            .map_err(|err| anyhow::anyhow!("failed to open software display context: {err}"))?;
        let surface = softbuffer::Surface::new(&context, window.clone())
            .map_err(|err| anyhow::anyhow!("failed to create software surface: {err}"))?;
        Ok(Self {
            _context: context,
            surface,
        })
    }

    fn paint(&mut self, panel: &FallbackPanel, size: PhysicalSize<u32>) -> Result<()> {
        let (Some(width), Some(height)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        else {
            return Ok(());
        };
        self.surface
            .resize(width, height)
            .map_err(|err| anyhow::anyhow!("failed to resize software surface: {err}"))?;

        let image = render_panel(panel, size.width, size.height);
        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|err| anyhow::anyhow!("failed to map software surface: {err}"))?;
        for (dst, px) in buffer.iter_mut().zip(image.pixels()) {
            let [r, g, b, _] = px.0;
            *dst = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
        }
        buffer
            .present()
            .map_err(|err| anyhow::anyhow!("failed to present fallback panel: {err}"))
    }
}

struct PreviewState {
    engine: LayerEngine<WgpuBackend>,
    layers: Vec<LayerConfig>,
    motion_reduced: bool,
    title: String,
    fallback_shown: bool,
    painter: Option<PanelPainter>,
    frame_interval: Option<Duration>,
    next_frame: Instant,
}

impl PreviewState {
    fn apply(&mut self, action: KeyAction) {
        match action {
            KeyAction::Quit => {}
            KeyAction::ToggleMotion => {
                self.motion_reduced = !self.motion_reduced;
                info!(motion_reduced = self.motion_reduced, "toggled reduced motion");
            }
            KeyAction::ToggleLayer(index) => {
                if let Some(layer) = self.layers.get_mut(index) {
                    layer.enabled = !layer.enabled;
                    info!(layer = index + 1, shader = %layer.shader, enabled = layer.enabled, "toggled layer");
                }
            }
        }
    }

    fn show_fallback(&mut self, window: &Arc<Window>) {
        let Some(panel) = self.engine.fallback().cloned() else {
            return;
        };
        if !self.fallback_shown {
            warn!(panel = %panel, "showing fallback instead of layered rendering");
            window.set_title(&format!("{} | {}", self.title, panel.title));
            self.fallback_shown = true;
            match PanelPainter::new(window) {
                Ok(painter) => self.painter = Some(painter),
                Err(err) => warn!(error = %err, "fallback panel cannot be painted"),
            }
        }
        if let Some(painter) = self.painter.as_mut() {
            if let Err(err) = painter.paint(&panel, window.inner_size()) {
                warn!(error = %err, "failed to paint fallback panel");
            }
        }
    }

    fn schedule(&mut self, window: &Window) -> ControlFlow {
        if !self.engine.is_animating() {
            return ControlFlow::Wait;
        }
        match self.frame_interval {
            Some(interval) => {
                let now = Instant::now();
                if now >= self.next_frame {
                    self.next_frame = now + interval;
                    window.request_redraw();
                }
                ControlFlow::WaitUntil(self.next_frame)
            }
            None => {
                window.request_redraw();
                ControlFlow::Poll
            }
        }
    }
}

/// Opens the preview window and runs the layer stack until it is closed.
pub(crate) fn run(config: RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
        .build(&event_loop)
        .context("failed to create preview window")?;
    let window = Arc::new(window);

    let mut probe = CapabilityProbe::new();
    let capability = probe.run(detect_wgpu).clone();
    let frame_interval = match &capability {
        Capability::Ready(profile) if profile.is_software() => {
            warn!(
                adapter = %profile.name,
                cap = SOFTWARE_FPS_CAP,
                "software rasterizer detected; capping preview frame rate"
            );
            Some(Duration::from_secs_f32(1.0 / SOFTWARE_FPS_CAP))
        }
        _ => None,
    };

    let surface_window = window.clone();
    let surface_options = SurfaceOptions {
        vsync: config.vsync,
        high_performance: config.high_performance,
    };
    let engine = LayerEngine::init(
        &capability,
        ShaderRegistry::global(),
        config.engine,
        move || {
            let size = surface_window.inner_size();
            WgpuBackend::new(
                surface_window.clone(),
                (size.width, size.height),
                surface_options,
            )
        },
    );

    let mut state = PreviewState {
        engine,
        layers: config.layers,
        motion_reduced: config.motion_reduced,
        title: config.title,
        fallback_shown: false,
        painter: None,
        frame_interval,
        next_frame: Instant::now(),
    };
    window.request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    state.engine.shutdown();
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    state.engine.resize(size.width, size.height);
                    if state.fallback_shown {
                        window.request_redraw();
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => match key_action(&event) {
                    Some(KeyAction::Quit) => {
                        state.engine.shutdown();
                        elwt.exit();
                    }
                    Some(action) => state.apply(action),
                    None => {}
                },
                WindowEvent::RedrawRequested => {
                    let outcome =
                        state
                            .engine
                            .tick_at(&state.layers, state.motion_reduced, Instant::now());
                    let stopped = matches!(outcome, FrameOutcome::Stopped);
                    let fallback = matches!(outcome, FrameOutcome::Fallback(_));
                    if fallback {
                        state.show_fallback(&window);
                    }
                    if stopped {
                        elwt.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                let flow = state.schedule(&window);
                elwt.set_control_flow(flow);
            }
            Event::LoopExiting => state.engine.shutdown(),
            _ => {}
        })
        .context("event loop terminated with an error")
}
