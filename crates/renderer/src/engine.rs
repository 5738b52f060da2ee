//! Mount, tick and teardown of the layer stack.
//!
//! ```text
//!   CapabilityProbe ──Ready──▶ factory() ──▶ Compositor + FrameDriver
//!         │                                        │ tick: reconcile ▶ uniforms ▶ draw
//!         └──Unavailable──▶ FallbackPanel          │
//!                                                  └─ context lost ▶ Recovering ▶ factory() again
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use layerstack::LayerConfig;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, RenderBackend};
use crate::clock::{ClockState, FrameDriver, DEFAULT_MAX_FRAME_DELTA};
use crate::compositor::{Compositor, DrawStats, ReconcileStats};
use crate::error::RenderError;
use crate::probe::{Capability, FallbackPanel};
use crate::registry::ShaderRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub max_frame_delta: Duration,
    /// Consecutive failed re-initialisations tolerated after a context loss
    /// before the fallback panel takes over.
    pub max_reinit_attempts: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
            max_reinit_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub reconcile: ReconcileStats,
    pub draw: DrawStats,
    pub time: f32,
}

#[derive(Debug, PartialEq)]
pub enum FrameOutcome<'a> {
    Composited(FrameReport),
    /// The backend could not present this tick (e.g. an outdated surface);
    /// nothing was drawn and the next tick retries.
    Skipped(String),
    /// The context was lost; nothing was drawn this tick.
    Recovering,
    Fallback(&'a FallbackPanel),
    Stopped,
}

type BackendFactory<B> = Box<dyn FnMut() -> Result<B, BackendError>>;

enum Phase<B: RenderBackend> {
    Running {
        compositor: Compositor<B>,
        driver: FrameDriver,
    },
    Recovering {
        attempts: u32,
        driver: FrameDriver,
    },
    Fallback(FallbackPanel),
    Stopped,
}

/// Owns every resource of a mounted layer stack.
pub struct LayerEngine<B: RenderBackend> {
    phase: Phase<B>,
    factory: Option<BackendFactory<B>>,
    registry: Arc<ShaderRegistry>,
    options: EngineOptions,
}

impl<B: RenderBackend> LayerEngine<B> {
    /// Mounts the engine. The factory is only called when the capability is
    /// ready, and again after a context loss.
    pub fn init<F>(
        capability: &Capability,
        registry: Arc<ShaderRegistry>,
        options: EngineOptions,
        factory: F,
    ) -> Self
    where
        F: FnMut() -> Result<B, BackendError> + 'static,
    {
        let mut factory: BackendFactory<B> = Box::new(factory);
        let phase = match capability {
            Capability::Ready(profile) => match factory() {
                Ok(backend) => {
                    info!(adapter = %profile.name, "mounting layer engine");
                    Phase::Running {
                        compositor: Compositor::new(backend, registry.clone()),
                        driver: FrameDriver::new(options.max_frame_delta),
                    }
                }
                Err(err) => {
                    let reason = RenderError::CapabilityUnavailable(err.to_string());
                    warn!(error = %reason, "failed to create render backend; showing fallback");
                    Phase::Fallback(FallbackPanel::unavailable(err.to_string()))
                }
            },
            Capability::Unavailable(reason) => {
                debug!(reason = %reason, "capability unavailable; showing fallback");
                Phase::Fallback(FallbackPanel::unavailable(reason.clone()))
            }
            Capability::Unknown => {
                warn!("capability probe has not run; showing fallback");
                Phase::Fallback(FallbackPanel::unavailable("capability probe has not run"))
            }
        };
        let factory = matches!(phase, Phase::Running { .. }).then_some(factory);

        Self {
            phase,
            factory,
            registry,
            options,
        }
    }

    /// One frame: reconcile, update uniforms, draw.
    pub fn tick(
        &mut self,
        layers: &[LayerConfig],
        motion_reduced: bool,
        delta: Duration,
    ) -> FrameOutcome<'_> {
        if matches!(self.phase, Phase::Recovering { .. }) {
            self.reinitialise();
        }

        let result = match &mut self.phase {
            Phase::Running { compositor, driver } => Some(Self::composite(
                compositor,
                driver,
                layers,
                motion_reduced,
                delta,
            )),
            _ => None,
        };

        match result {
            Some(Ok(report)) => return FrameOutcome::Composited(report),
            Some(Err(BackendError::ContextLost)) => {
                self.enter_recovery();
            }
            Some(Err(err)) => {
                warn!(error = %err, "frame skipped");
                return FrameOutcome::Skipped(err.to_string());
            }
            None => {}
        }

        match &self.phase {
            Phase::Running { .. } | Phase::Recovering { .. } => FrameOutcome::Recovering,
            Phase::Fallback(panel) => FrameOutcome::Fallback(panel),
            Phase::Stopped => FrameOutcome::Stopped,
        }
    }

    /// Like [`tick`](Self::tick) with the delta measured from the previous
    /// call; the first call advances by zero.
    pub fn tick_at(
        &mut self,
        layers: &[LayerConfig],
        motion_reduced: bool,
        now: Instant,
    ) -> FrameOutcome<'_> {
        let delta = match &mut self.phase {
            Phase::Running { driver, .. } | Phase::Recovering { driver, .. } => {
                driver.delta_since(now)
            }
            _ => Duration::ZERO,
        };
        self.tick(layers, motion_reduced, delta)
    }

    fn composite(
        compositor: &mut Compositor<B>,
        driver: &mut FrameDriver,
        layers: &[LayerConfig],
        motion_reduced: bool,
        delta: Duration,
    ) -> Result<FrameReport, BackendError> {
        if compositor.backend().is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        let reconcile = compositor.reconcile(layers);
        let frame = driver.update(delta, motion_reduced, compositor);
        let draw = compositor.draw()?;
        Ok(FrameReport {
            reconcile,
            draw,
            time: frame.time,
        })
    }

    fn enter_recovery(&mut self) {
        let phase = std::mem::replace(&mut self.phase, Phase::Stopped);
        self.phase = match phase {
            Phase::Running {
                mut compositor,
                driver,
            } => {
                warn!(
                    instances = compositor.instance_count(),
                    "rendering context lost; dropping instances"
                );
                compositor.teardown();
                Phase::Recovering {
                    attempts: 0,
                    driver,
                }
            }
            other => other,
        };
    }

    fn reinitialise(&mut self) {
        let phase = std::mem::replace(&mut self.phase, Phase::Stopped);
        let Phase::Recovering { attempts, driver } = phase else {
            self.phase = phase;
            return;
        };
        let attempts = attempts + 1;
        let Some(factory) = self.factory.as_mut() else {
            self.phase = Phase::Stopped;
            return;
        };

        self.phase = match factory() {
            Ok(backend) => {
                info!(attempts, "rendering context restored");
                Phase::Running {
                    compositor: Compositor::new(backend, self.registry.clone()),
                    driver,
                }
            }
            Err(err) if attempts >= self.options.max_reinit_attempts => {
                warn!(attempts, error = %err, "giving up on context recovery; showing fallback");
                self.factory = None;
                Phase::Fallback(FallbackPanel::unavailable(
                    RenderError::ContextLost.to_string(),
                ))
            }
            Err(err) => {
                debug!(attempts, error = %err, "context recovery failed; retrying next tick");
                Phase::Recovering { attempts, driver }
            }
        };
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Phase::Running { compositor, .. } = &mut self.phase {
            compositor.resize(width, height);
        }
    }

    /// Releases every GPU resource. Later ticks report `Stopped`.
    pub fn shutdown(&mut self) {
        let phase = std::mem::replace(&mut self.phase, Phase::Stopped);
        if let Phase::Running { mut compositor, .. } = phase {
            compositor.teardown();
            info!("layer engine shut down");
        }
        self.factory = None;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    /// True while ticks still do work (running or recovering).
    pub fn is_animating(&self) -> bool {
        matches!(self.phase, Phase::Running { .. } | Phase::Recovering { .. })
    }

    pub fn fallback(&self) -> Option<&FallbackPanel> {
        match &self.phase {
            Phase::Fallback(panel) => Some(panel),
            _ => None,
        }
    }

    pub fn clock(&self) -> Option<ClockState> {
        match &self.phase {
            Phase::Running { driver, .. } | Phase::Recovering { driver, .. } => {
                Some(driver.clock())
            }
            _ => None,
        }
    }

    pub fn compositor(&self) -> Option<&Compositor<B>> {
        match &self.phase {
            Phase::Running { compositor, .. } => Some(compositor),
            _ => None,
        }
    }

    pub fn backend(&self) -> Option<&B> {
        self.compositor().map(Compositor::backend)
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        match &mut self.phase {
            Phase::Running { compositor, .. } => Some(compositor.backend_mut()),
            _ => None,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.compositor().map_or(0, Compositor::instance_count)
    }
}

impl<B: RenderBackend> Drop for LayerEngine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
