//! Reconciles the caller's layer list against live GPU instances and draws
//! them in order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use layerstack::{LayerConfig, ParamValue};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, InstanceId, ProgramId, RenderBackend};
use crate::clock::FrameUniforms;
use crate::effect::{clamp_strength, BlendMode, EffectKind};
use crate::error::RenderError;
use crate::registry::ShaderRegistry;
use crate::uniforms::LayerUniforms;

/// Identity of a layer across ticks: the effect it resolves to and how many
/// earlier enabled layers resolved to the same effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LayerSlot {
    kind: EffectKind,
    occurrence: usize,
}

/// The layer inputs an instance was built from; any change requires a fresh
/// instance.
#[derive(Debug, Clone, PartialEq)]
struct InstanceSignature {
    overrides: BTreeMap<String, ParamValue>,
    strength: f32,
}

impl InstanceSignature {
    fn matches(&self, layer: &LayerConfig) -> bool {
        self.strength == clamp_strength(layer.strength)
            && self.overrides.len() == layer.params.len()
            && self
                .overrides
                .iter()
                .zip(&layer.params)
                .all(|((a_name, a), (b_name, b))| a_name == b_name && same_value(a, b))
    }
}

/// Bitwise float comparison so a NaN override still matches itself.
fn same_value(a: &ParamValue, b: &ParamValue) -> bool {
    let same = |x: f32, y: f32| x.total_cmp(&y).is_eq();
    match (a, b) {
        (ParamValue::Float(x), ParamValue::Float(y)) => same(*x, *y),
        (ParamValue::Vec3(x), ParamValue::Vec3(y)) => x.iter().zip(y).all(|(x, y)| same(*x, *y)),
        (ParamValue::Bool(x), ParamValue::Bool(y)) => x == y,
        _ => false,
    }
}

struct ShaderInstance {
    id: InstanceId,
    blend: BlendMode,
    signature: InstanceSignature,
    uniforms: LayerUniforms,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub destroyed: usize,
    pub reused: usize,
    pub skipped: usize,
}

impl ReconcileStats {
    pub fn changed(&self) -> bool {
        self.created > 0 || self.destroyed > 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub drawn: usize,
    pub failed: usize,
}

pub struct Compositor<B: RenderBackend> {
    backend: B,
    registry: Arc<ShaderRegistry>,
    programs: HashMap<EffectKind, ProgramId>,
    compile_failures: Vec<RenderError>,
    instances: HashMap<LayerSlot, ShaderInstance>,
    draw_order: Vec<LayerSlot>,
    issues: Vec<RenderError>,
}

impl<B: RenderBackend> Compositor<B> {
    /// Compiles every registered effect. A failing program only disables the
    /// layers that use it.
    pub fn new(mut backend: B, registry: Arc<ShaderRegistry>) -> Self {
        let mut programs = HashMap::new();
        let mut compile_failures = Vec::new();
        for definition in registry.definitions() {
            match backend.compile(definition) {
                Ok(program) => {
                    debug!(key = %definition.key, ?program, "compiled shader program");
                    programs.insert(definition.kind(), program);
                }
                Err(err) => {
                    error!(key = %definition.key, error = %err, "shader failed to compile; its layers are disabled");
                    compile_failures.push(RenderError::ShaderCompile {
                        key: definition.key.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        info!(
            programs = programs.len(),
            failed = compile_failures.len(),
            "compositor ready"
        );

        Self {
            backend,
            registry,
            programs,
            compile_failures,
            instances: HashMap::new(),
            draw_order: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.backend.viewport()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width.max(1), height.max(1));
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn compile_failures(&self) -> &[RenderError] {
        &self.compile_failures
    }

    /// Layers skipped by the last reconcile, with the reason.
    pub fn issues(&self) -> &[RenderError] {
        &self.issues
    }

    /// Brings live instances in line with `layers`.
    ///
    /// Unchanged layers keep their instance, changed ones are recreated and
    /// anything no longer wanted is destroyed through the backend.
    pub fn reconcile(&mut self, layers: &[LayerConfig]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let mut occurrences: HashMap<EffectKind, usize> = HashMap::new();
        let mut wanted: HashSet<LayerSlot> = HashSet::with_capacity(layers.len());
        self.draw_order.clear();
        self.issues.clear();
        let viewport = self.backend.viewport();

        for layer in layers {
            if !layer.enabled {
                continue;
            }
            let Some(definition) = self.registry.lookup(&layer.shader) else {
                if !self
                    .issues
                    .iter()
                    .any(|issue| matches!(issue, RenderError::UnknownLayerKey(key) if key == &layer.shader))
                {
                    debug!(key = %layer.shader, "no shader registered for layer; skipping");
                    self.issues
                        .push(RenderError::UnknownLayerKey(layer.shader.clone()));
                }
                stats.skipped += 1;
                continue;
            };
            let kind = definition.kind();
            let Some(&program) = self.programs.get(&kind) else {
                stats.skipped += 1;
                continue;
            };

            let occurrence = occurrences.entry(kind).or_insert(0);
            let slot = LayerSlot {
                kind,
                occurrence: *occurrence,
            };
            *occurrence += 1;

            let reusable = self
                .instances
                .get(&slot)
                .is_some_and(|instance| instance.signature.matches(layer));
            if reusable {
                stats.reused += 1;
            } else {
                if let Some(stale) = self.instances.remove(&slot) {
                    self.backend.destroy_instance(stale.id);
                    stats.destroyed += 1;
                }
                let strength = clamp_strength(layer.strength);
                let params = definition
                    .defaults
                    .with_overrides(&layer.params, &definition.key);
                let uniforms = LayerUniforms::new(&params, strength, viewport);
                match self.backend.create_instance(program, &uniforms) {
                    Ok(id) => {
                        debug!(key = %definition.key, ?id, strength, "created layer instance");
                        self.instances.insert(
                            slot,
                            ShaderInstance {
                                id,
                                blend: definition.blend,
                                signature: InstanceSignature {
                                    overrides: layer.params.clone(),
                                    strength,
                                },
                                uniforms,
                            },
                        );
                        stats.created += 1;
                    }
                    Err(err) => {
                        warn!(key = %definition.key, error = %err, "failed to create layer instance; skipping layer");
                        stats.skipped += 1;
                        continue;
                    }
                }
            }
            wanted.insert(slot);
            self.draw_order.push(slot);
        }

        let unwanted: Vec<LayerSlot> = self
            .instances
            .keys()
            .filter(|slot| !wanted.contains(slot))
            .copied()
            .collect();
        for slot in unwanted {
            if let Some(instance) = self.instances.remove(&slot) {
                self.backend.destroy_instance(instance.id);
                stats.destroyed += 1;
            }
        }

        if stats.changed() {
            debug!(
                created = stats.created,
                destroyed = stats.destroyed,
                reused = stats.reused,
                skipped = stats.skipped,
                "reconciled layers"
            );
        }
        stats
    }

    /// Writes frame-wide values into every active instance. Returns how many
    /// instances were updated.
    pub fn push_frame_uniforms(&mut self, frame: &FrameUniforms) -> usize {
        let mut written = 0;
        for slot in &self.draw_order {
            if let Some(instance) = self.instances.get_mut(slot) {
                instance.uniforms.apply_frame(frame);
                self.backend.write_uniforms(instance.id, &instance.uniforms);
                written += 1;
            }
        }
        written
    }

    /// Draws active instances in layer order, restoring the default blend
    /// state after each one.
    pub fn draw(&mut self) -> Result<DrawStats, BackendError> {
        if self.backend.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        self.backend.begin_frame()?;

        let mut stats = DrawStats::default();
        for slot in &self.draw_order {
            let Some(instance) = self.instances.get(slot) else {
                continue;
            };
            self.backend.set_blend(instance.blend);
            let result = self.backend.draw(instance.id);
            self.backend.restore_blend();
            match result {
                Ok(()) => stats.drawn += 1,
                Err(BackendError::ContextLost) => return Err(BackendError::ContextLost),
                Err(err) => {
                    warn!(kind = %slot.kind, error = %err, "layer draw failed");
                    stats.failed += 1;
                }
            }
        }

        self.backend.end_frame()?;
        Ok(stats)
    }

    /// Destroys every instance and releases every program.
    pub fn teardown(&mut self) {
        let instances = self.instances.len();
        for (_, instance) in self.instances.drain() {
            self.backend.destroy_instance(instance.id);
        }
        for (_, program) in self.programs.drain() {
            self.backend.release_program(program);
        }
        self.draw_order.clear();
        debug!(instances, "compositor torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};

    fn compositor() -> Compositor<RecordingBackend> {
        Compositor::new(RecordingBackend::new(640, 360), ShaderRegistry::global())
    }

    #[test]
    fn compiles_every_builtin() {
        let compositor = compositor();
        assert_eq!(compositor.backend().live_programs(), 3);
        assert!(compositor.compile_failures().is_empty());
    }

    #[test]
    fn repeated_keys_get_separate_instances() {
        let mut compositor = compositor();
        let layers = vec![
            LayerConfig::new("mystic-fog", 0.3),
            LayerConfig::new("elemental.fog.mystic", 0.9),
        ];
        let stats = compositor.reconcile(&layers);
        assert_eq!(stats.created, 2);
        assert_eq!(compositor.instance_count(), 2);

        let stats = compositor.reconcile(&layers);
        assert_eq!(stats.reused, 2);
        assert_eq!(stats.created, 0);
    }

    #[test]
    fn changed_parameters_recreate_the_instance() {
        let mut compositor = compositor();
        compositor.reconcile(&[LayerConfig::new("runic-glow", 0.5)]);
        let stats = compositor.reconcile(&[
            LayerConfig::new("runic-glow", 0.5).with_param("u_pulse_speed", 2.0_f32)
        ]);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.created, 1);
        assert_eq!(compositor.instance_count(), 1);
    }

    #[test]
    fn unknown_keys_are_reported_once() {
        let mut compositor = compositor();
        let layers = vec![
            LayerConfig::new("celestial.aurora", 0.5),
            LayerConfig::new("celestial.aurora", 0.5),
        ];
        let stats = compositor.reconcile(&layers);
        assert_eq!(stats.skipped, 2);
        assert_eq!(
            compositor.issues(),
            [RenderError::UnknownLayerKey("celestial.aurora".into())]
        );
    }

    #[test]
    fn teardown_releases_everything() {
        let mut compositor = compositor();
        compositor.reconcile(&[
            LayerConfig::new("fog", 0.5),
            LayerConfig::new("vignette", 0.5),
        ]);
        compositor.teardown();
        assert_eq!(compositor.backend().live_instances(), 0);
        assert_eq!(compositor.backend().live_programs(), 0);
        let releases = compositor
            .backend()
            .commands()
            .iter()
            .filter(|command| matches!(command, Command::ReleaseProgram(_)))
            .count();
        assert_eq!(releases, 3);
    }
}
