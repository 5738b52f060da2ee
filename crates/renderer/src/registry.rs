use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::effect::{BlendMode, EffectKind, EffectParams};
use crate::shaders;

/// A compiled-on-demand effect: its programs, blend mode and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDefinition {
    pub key: String,
    pub aliases: Vec<String>,
    pub display_name: String,
    pub vertex_program: String,
    pub fragment_program: String,
    pub blend: BlendMode,
    pub defaults: EffectParams,
    /// Strength suggested to authors when a layer is first added.
    pub default_strength: f32,
}

impl ShaderDefinition {
    pub(crate) fn builtin(
        key: &str,
        aliases: &[&str],
        display_name: &str,
        blend: BlendMode,
        defaults: EffectParams,
        default_strength: f32,
    ) -> Self {
        Self {
            key: key.to_string(),
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
            display_name: display_name.to_string(),
            vertex_program: shaders::VERTEX_PROGRAM.to_string(),
            fragment_program: shaders::fragment_program(defaults.kind()),
            blend,
            defaults,
            default_strength,
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.defaults.kind()
    }
}

/// Immutable catalog of effects, looked up by key or alias.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    definitions: Vec<ShaderDefinition>,
    index: HashMap<String, usize>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the shipped effects.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for definition in shaders::builtin_definitions() {
            registry.register(definition);
        }
        registry
    }

    /// Process-wide built-in registry, created on first use.
    pub fn global() -> Arc<ShaderRegistry> {
        static GLOBAL: OnceLock<Arc<ShaderRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::builtin())).clone()
    }

    /// Adds a definition. Returns `false` (and logs) when its key, an alias
    /// or its effect kind is already taken; the registry is left unchanged.
    pub fn register(&mut self, definition: ShaderDefinition) -> bool {
        let names = std::iter::once(&definition.key).chain(definition.aliases.iter());
        for name in names {
            if let Some(&existing) = self.index.get(name) {
                warn!(
                    key = %definition.key,
                    name = %name,
                    existing = %self.definitions[existing].key,
                    "shader name already registered; ignoring definition"
                );
                return false;
            }
        }
        if let Some(existing) = self.by_kind(definition.kind()) {
            warn!(
                key = %definition.key,
                kind = %definition.kind(),
                existing = %existing.key,
                "effect kind already registered; ignoring definition"
            );
            return false;
        }

        let slot = self.definitions.len();
        self.index.insert(definition.key.clone(), slot);
        for alias in &definition.aliases {
            self.index.insert(alias.clone(), slot);
        }
        debug!(key = %definition.key, blend = %definition.blend, "registered shader");
        self.definitions.push(definition);
        true
    }

    pub fn lookup(&self, key: &str) -> Option<&ShaderDefinition> {
        self.index
            .get(key.trim())
            .map(|&slot| &self.definitions[slot])
    }

    pub fn by_kind(&self, kind: EffectKind) -> Option<&ShaderDefinition> {
        self.definitions.iter().find(|definition| definition.kind() == kind)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ShaderDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
