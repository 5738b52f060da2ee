use std::time::{Duration, Instant};

use crate::backend::RenderBackend;
use crate::compositor::Compositor;

/// Largest step the clock takes in one tick unless configured otherwise.
pub const DEFAULT_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

const STATS_INTERVAL_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockState {
    pub elapsed_seconds: f64,
    pub motion_reduced: bool,
}

/// Frame-wide values written into every live layer instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub time: f32,
    pub resolution: [f32; 2],
    pub motion_reduced: bool,
}

/// Owns the animation clock and feeds it to the compositor once per tick.
#[derive(Debug, Clone)]
pub struct FrameDriver {
    clock: ClockState,
    max_delta: Duration,
    last_tick: Option<Instant>,
    frame_index: u64,
    stats_frames: u32,
    stats_since: f64,
}

impl FrameDriver {
    pub fn new(max_delta: Duration) -> Self {
        Self {
            clock: ClockState::default(),
            max_delta,
            last_tick: None,
            frame_index: 0,
            stats_frames: 0,
            stats_since: 0.0,
        }
    }

    /// Rewinds the clock to zero.
    pub fn reset(&mut self) {
        self.clock = ClockState::default();
        self.last_tick = None;
        self.frame_index = 0;
        self.stats_frames = 0;
        self.stats_since = 0.0;
    }

    pub fn clock(&self) -> ClockState {
        self.clock
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Delta since the previous call; the first call yields zero.
    pub fn delta_since(&mut self, now: Instant) -> Duration {
        let delta = self
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);
        delta
    }

    /// Advances the clock by `delta`, clamped to the configured maximum.
    pub fn advance(&mut self, delta: Duration, motion_reduced: bool) -> Duration {
        let step = delta.min(self.max_delta);
        if step < delta {
            tracing::trace!(
                requested_ms = delta.as_millis() as u64,
                clamped_ms = step.as_millis() as u64,
                "frame delta clamped"
            );
        }
        self.clock.elapsed_seconds += step.as_secs_f64();
        self.clock.motion_reduced = motion_reduced;
        self.frame_index += 1;
        step
    }

    /// Uniform values for the current clock. Time is pinned to zero while
    /// motion is reduced.
    pub fn frame_uniforms(&self, viewport: (u32, u32)) -> FrameUniforms {
        FrameUniforms {
            time: if self.clock.motion_reduced {
                0.0
            } else {
                self.clock.elapsed_seconds as f32
            },
            resolution: [viewport.0 as f32, viewport.1 as f32],
            motion_reduced: self.clock.motion_reduced,
        }
    }

    /// One tick: advance the clock and push the result into every live
    /// instance. Never draws.
    pub fn update<B: RenderBackend>(
        &mut self,
        delta: Duration,
        motion_reduced: bool,
        compositor: &mut Compositor<B>,
    ) -> FrameUniforms {
        self.advance(delta, motion_reduced);
        let frame = self.frame_uniforms(compositor.viewport());
        let written = compositor.push_frame_uniforms(&frame);
        self.record_stats(written);
        frame
    }

    fn record_stats(&mut self, layers: usize) {
        self.stats_frames += 1;
        let window = self.clock.elapsed_seconds - self.stats_since;
        if window >= STATS_INTERVAL_SECONDS {
            let fps = self.stats_frames as f64 / window;
            tracing::debug!(
                fps = format_args!("{fps:.1}"),
                layers,
                elapsed = format_args!("{:.1}", self.clock.elapsed_seconds),
                "render stats"
            );
            self.stats_frames = 0;
            self.stats_since = self.clock.elapsed_seconds;
        }
    }
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_DELTA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_deltas_are_clamped() {
        let mut driver = FrameDriver::default();
        let step = driver.advance(Duration::from_secs(30), false);
        assert_eq!(step, DEFAULT_MAX_FRAME_DELTA);
        assert!((driver.clock().elapsed_seconds - 0.25).abs() < 1e-9);
    }

    #[test]
    fn time_accumulates_across_ticks() {
        let mut driver = FrameDriver::default();
        for _ in 0..10 {
            driver.advance(Duration::from_millis(16), false);
        }
        let frame = driver.frame_uniforms((800, 600));
        assert!((frame.time - 0.16).abs() < 1e-5);
        assert_eq!(frame.resolution, [800.0, 600.0]);
        assert_eq!(driver.frame_index(), 10);
    }

    #[test]
    fn reduced_motion_pins_time_but_keeps_counting() {
        let mut driver = FrameDriver::default();
        driver.advance(Duration::from_millis(100), true);
        assert_eq!(driver.frame_uniforms((1, 1)).time, 0.0);
        assert!(driver.frame_uniforms((1, 1)).motion_reduced);

        driver.advance(Duration::from_millis(100), false);
        assert!((driver.frame_uniforms((1, 1)).time - 0.2).abs() < 1e-6);
    }

    #[test]
    fn first_instant_yields_zero_delta() {
        let mut driver = FrameDriver::default();
        let start = Instant::now();
        assert_eq!(driver.delta_since(start), Duration::ZERO);
        let later = start + Duration::from_millis(40);
        assert_eq!(driver.delta_since(later), Duration::from_millis(40));
        assert_eq!(driver.delta_since(start), Duration::ZERO);
    }

    #[test]
    fn reset_rewinds_the_clock() {
        let mut driver = FrameDriver::new(Duration::from_millis(50));
        driver.advance(Duration::from_millis(40), true);
        driver.reset();
        assert_eq!(driver.clock(), ClockState::default());
        assert_eq!(driver.frame_index(), 0);
    }
}
