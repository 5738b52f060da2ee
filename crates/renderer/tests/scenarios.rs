use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use layerstack::{LayerConfig, ParamValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use renderer::{
    AdapterProfile, BackendError, BlendMode, Capability, Command, Compositor, EngineOptions,
    FrameOutcome, LayerEngine, LayerUniforms, RecordingBackend, ShaderRegistry,
};

const FRAME: Duration = Duration::from_millis(16);

fn ready() -> Capability {
    Capability::Ready(AdapterProfile {
        name: "recording".into(),
        backend: wgpu::Backend::Vulkan,
        device_type: wgpu::DeviceType::DiscreteGpu,
        max_texture_dimension: 8192,
    })
}

fn counted_engine(calls: Rc<Cell<u32>>) -> LayerEngine<RecordingBackend> {
    LayerEngine::init(
        &ready(),
        ShaderRegistry::global(),
        EngineOptions::default(),
        move || {
            calls.set(calls.get() + 1);
            Ok(RecordingBackend::new(800, 600))
        },
    )
}

fn compositor() -> Compositor<RecordingBackend> {
    Compositor::new(RecordingBackend::new(800, 600), ShaderRegistry::global())
}

fn created_uniforms(commands: &[Command]) -> Vec<LayerUniforms> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::CreateInstance { uniforms, .. } => Some(*uniforms),
            _ => None,
        })
        .collect()
}

fn draws_per_frame(commands: &[Command]) -> Vec<usize> {
    let mut frames = Vec::new();
    let mut current = 0;
    for command in commands {
        match command {
            Command::BeginFrame => current = 0,
            Command::Draw(_) => current += 1,
            Command::EndFrame => frames.push(current),
            _ => {}
        }
    }
    frames
}

#[test]
fn single_fog_layer_animates_for_ten_frames() {
    let mut engine = counted_engine(Rc::new(Cell::new(0)));
    let layers = [LayerConfig::new("elemental.fog.mystic", 0.6)];

    let mut last_time = 0.0;
    for _ in 0..10 {
        match engine.tick(&layers, false, FRAME) {
            FrameOutcome::Composited(report) => {
                assert_eq!(report.draw.drawn, 1);
                last_time = report.time;
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(engine.instance_count(), 1);
    assert!((last_time - 0.16).abs() < 1e-4, "time was {last_time}");

    let backend = engine.backend().expect("running");
    assert_eq!(backend.live_instances(), 1);
    assert_eq!(draws_per_frame(backend.commands()), vec![1; 10]);
    let written = backend
        .commands()
        .iter()
        .rev()
        .find_map(|command| match command {
            Command::WriteUniforms { uniforms, .. } => Some(*uniforms),
            _ => None,
        })
        .expect("uniform writes");
    assert!((written.time - 0.16).abs() < 1e-4);
    assert_eq!(written.strength, 0.6);
    assert_eq!(written.resolution, [800.0, 600.0]);
}

#[test]
fn unknown_key_draws_nothing() {
    let mut engine = counted_engine(Rc::new(Cell::new(0)));
    let layers = [LayerConfig::new("nonexistent.shader", 0.5)];

    match engine.tick(&layers, false, FRAME) {
        FrameOutcome::Composited(report) => {
            assert_eq!(report.reconcile.skipped, 1);
            assert_eq!(report.draw.drawn, 0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(engine.instance_count(), 0);
    let backend = engine.backend().expect("running");
    assert_eq!(backend.draw_count(), 0);
    assert_eq!(backend.live_instances(), 0);
}

#[test]
fn unavailable_capability_shows_fallback_without_backend() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let mut engine: LayerEngine<RecordingBackend> = LayerEngine::init(
        &Capability::Unavailable("no adapter".into()),
        ShaderRegistry::global(),
        EngineOptions::default(),
        move || {
            counter.set(counter.get() + 1);
            Ok(RecordingBackend::new(800, 600))
        },
    );
    let layers = [
        LayerConfig::new("elemental.fog.mystic", 0.7),
        LayerConfig::new("ritual.vignette.sacral", 0.4),
    ];

    for _ in 0..3 {
        match engine.tick(&layers, false, FRAME) {
            FrameOutcome::Fallback(panel) => {
                assert_eq!(panel.background, [0x11, 0x11, 0x11]);
                assert!(panel.detail.contains("GPU rendering support"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(calls.get(), 0);
    assert_eq!(engine.instance_count(), 0);
    assert!(!engine.is_animating());
}

#[test]
fn draw_order_follows_layer_list_and_restores_blend() {
    let mut compositor = compositor();
    let layers = [
        LayerConfig::new("elemental.fog.mystic", 0.7),
        LayerConfig::new("ritual.vignette.sacral", 0.4),
    ];
    compositor.reconcile(&layers);
    let created = compositor.backend_mut().take_commands();
    let ids: Vec<_> = created
        .iter()
        .filter_map(|command| match command {
            Command::CreateInstance { instance, .. } => Some(*instance),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 2);
    let (fog, vignette) = (ids[0], ids[1]);
    assert_eq!(compositor.backend().instance_key(fog), Some("elemental.fog.mystic"));
    assert_eq!(compositor.backend().instance_key(vignette), Some("ritual.vignette.sacral"));

    let stats = compositor.draw().expect("draw");
    assert_eq!(stats.drawn, 2);
    let frame: Vec<Command> = compositor
        .backend_mut()
        .take_commands()
        .into_iter()
        .filter(|command| !matches!(command, Command::BeginFrame | Command::EndFrame))
        .collect();
    assert_eq!(
        frame,
        vec![
            Command::SetBlend(BlendMode::Additive),
            Command::Draw(fog),
            Command::RestoreBlend,
            Command::SetBlend(BlendMode::Normal),
            Command::Draw(vignette),
            Command::RestoreBlend,
        ]
    );
}

#[test]
fn strengths_in_range_reach_uniforms_unchanged() {
    let mut rng = StdRng::seed_from_u64(0x6d79_7468);
    for _ in 0..64 {
        let strength: f32 = rng.gen_range(0.0..=1.0);
        let mut compositor = compositor();
        compositor.reconcile(&[LayerConfig::new("runic-glow", strength)]);
        let uniforms = created_uniforms(compositor.backend().commands());
        assert_eq!(uniforms.len(), 1);
        assert_eq!(uniforms[0].strength, strength);
    }
}

#[test]
fn out_of_range_strengths_are_clamped() {
    let mut compositor = compositor();
    compositor.reconcile(&[
        LayerConfig::new("elemental.fog.mystic", -0.5),
        LayerConfig::new("ritual.vignette.sacral", 1.7),
    ]);
    let strengths: Vec<f32> = created_uniforms(compositor.backend().commands())
        .iter()
        .map(|u| u.strength)
        .collect();
    assert_eq!(strengths, vec![0.0, 1.0]);
}

#[test]
fn reconciling_the_same_list_is_idempotent() {
    let mut compositor = compositor();
    let layers = [
        LayerConfig::new("elemental.fog.mystic", 0.7).with_param("u_depth", ParamValue::Float(0.5)),
        LayerConfig::new("architectural.runic-glow.medium", 0.5),
        LayerConfig::new("elemental.fog.mystic", 0.3),
    ];
    let first = compositor.reconcile(&layers);
    assert_eq!(first.created, 3);
    compositor.backend_mut().take_commands();

    let second = compositor.reconcile(&layers);
    assert_eq!(second.created, 0);
    assert_eq!(second.destroyed, 0);
    assert_eq!(second.reused, 3);
    assert!(compositor.backend().commands().is_empty());
    assert_eq!(compositor.instance_count(), 3);
}

#[test]
fn non_finite_overrides_do_not_force_recreation() {
    let mut compositor = compositor();
    let layers = [
        LayerConfig::new("mystic-fog", 0.6).with_param("u_depth", ParamValue::Float(f32::NAN)),
        LayerConfig::new("runes", f32::NAN)
            .with_param("u_tint", ParamValue::Vec3([f32::NAN, 0.5, f32::INFINITY])),
    ];
    let first = compositor.reconcile(&layers);
    assert_eq!(first.created, 2);
    compositor.backend_mut().take_commands();

    for _ in 0..3 {
        let again = compositor.reconcile(&layers);
        assert_eq!(again.created, 0);
        assert_eq!(again.destroyed, 0);
        assert_eq!(again.reused, 2);
    }
    assert!(compositor.backend().commands().is_empty());
}

#[test]
fn disable_then_enable_recreates_identical_uniforms() {
    let mut compositor = compositor();
    let fog = LayerConfig::new("mystic-fog", 0.8)
        .with_param("u_tint", ParamValue::Vec3([0.2, 0.4, 0.6]));

    compositor.reconcile(std::slice::from_ref(&fog));
    let before = created_uniforms(&compositor.backend_mut().take_commands());

    let stats = compositor.reconcile(&[fog.clone().enabled(false)]);
    assert_eq!(stats.destroyed, 1);
    assert_eq!(compositor.instance_count(), 0);
    compositor.backend_mut().take_commands();

    compositor.reconcile(&[fog]);
    let after = created_uniforms(compositor.backend().commands());
    assert_eq!(before.len(), 1);
    assert_eq!(before, after);
}

#[test]
fn reduced_motion_pins_time_to_zero() {
    let mut engine = counted_engine(Rc::new(Cell::new(0)));
    let layers = [
        LayerConfig::new("elemental.fog.mystic", 0.7),
        LayerConfig::new("architectural.runic-glow.medium", 0.5),
        LayerConfig::new("ritual.vignette.sacral", 0.4),
    ];
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let delta = Duration::from_millis(rng.gen_range(1..200));
        match engine.tick(&layers, true, delta) {
            FrameOutcome::Composited(report) => assert_eq!(report.time, 0.0),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    let backend = engine.backend().expect("running");
    for command in backend.commands() {
        if let Command::WriteUniforms { uniforms, .. } = command {
            assert_eq!(uniforms.time, 0.0);
            assert!(uniforms.is_motion_reduced());
        }
    }
    assert!(engine.clock().is_some_and(|clock| clock.elapsed_seconds > 0.0));
}

#[test]
fn compile_failure_only_drops_that_layer() {
    let backend = RecordingBackend::new(800, 600).fail_compile("elemental.fog.mystic");
    let mut compositor = Compositor::new(backend, ShaderRegistry::global());
    assert_eq!(compositor.compile_failures().len(), 1);

    let stats = compositor.reconcile(&[
        LayerConfig::new("elemental.fog.mystic", 0.7),
        LayerConfig::new("ritual.vignette.sacral", 0.4),
    ]);
    assert_eq!(stats.created, 1);
    assert_eq!(stats.skipped, 1);
    let drawn = compositor.draw().expect("draw");
    assert_eq!(drawn.drawn, 1);
}

#[test]
fn lost_context_drops_instances_and_recovers_next_tick() {
    let calls = Rc::new(Cell::new(0));
    let mut engine = counted_engine(Rc::clone(&calls));
    let layers = [LayerConfig::new("runes", 0.5)];

    assert!(matches!(engine.tick(&layers, false, FRAME), FrameOutcome::Composited(_)));
    assert_eq!(calls.get(), 1);
    if let Some(backend) = engine.backend_mut() {
        backend.lose_context();
    }

    assert_eq!(engine.tick(&layers, false, FRAME), FrameOutcome::Recovering);
    assert_eq!(engine.instance_count(), 0);
    assert_eq!(calls.get(), 1);

    match engine.tick(&layers, false, FRAME) {
        FrameOutcome::Composited(report) => assert_eq!(report.draw.drawn, 1),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(calls.get(), 2);
    assert_eq!(engine.instance_count(), 1);
    let elapsed = engine.clock().map(|clock| clock.elapsed_seconds).unwrap_or_default();
    assert!((elapsed - 0.032).abs() < 1e-6);
}

#[test]
fn repeated_recovery_failures_fall_back() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let mut engine: LayerEngine<RecordingBackend> = LayerEngine::init(
        &ready(),
        ShaderRegistry::global(),
        EngineOptions::default(),
        move || {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Ok(RecordingBackend::new(800, 600))
            } else {
                Err(BackendError::Surface("device gone".into()))
            }
        },
    );
    let layers = [LayerConfig::new("fog", 0.5)];
    engine.tick(&layers, false, FRAME);
    if let Some(backend) = engine.backend_mut() {
        backend.lose_context();
    }

    assert_eq!(engine.tick(&layers, false, FRAME), FrameOutcome::Recovering);
    assert_eq!(engine.tick(&layers, false, FRAME), FrameOutcome::Recovering);
    assert_eq!(engine.tick(&layers, false, FRAME), FrameOutcome::Recovering);
    assert!(matches!(engine.tick(&layers, false, FRAME), FrameOutcome::Fallback(_)));
    assert_eq!(calls.get(), 4);

    assert!(matches!(engine.tick(&layers, false, FRAME), FrameOutcome::Fallback(_)));
    assert_eq!(calls.get(), 4);
}
