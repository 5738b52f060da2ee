//! Declarative layer stacks for the mythic compositor.
//!
//! A [`LayerConfig`] names one registered effect plus its strength and
//! parameter overrides. Hosts either build the list in code each frame or load
//! named presets from a TOML [`StackFile`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse stack file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read stack file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid stack file: {0}")]
    Invalid(String),
}

/// A single parameter override.
///
/// Colours may be written as `"#RRGGBB"` in TOML and are decoded to
/// [`ParamValue::Vec3`] with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParam", into = "RawParam")]
pub enum ParamValue {
    Float(f32),
    Bool(bool),
    Vec3([f32; 3]),
}

impl ParamValue {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            ParamValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<[f32; 3]> {
        match self {
            ParamValue::Vec3(value) => Some(*value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "bool",
            ParamValue::Vec3(_) => "vec3",
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            ParamValue::Float(value) => value.is_finite(),
            ParamValue::Bool(_) => true,
            ParamValue::Vec3(values) => values.iter().all(|v| v.is_finite()),
        }
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<[f32; 3]> for ParamValue {
    fn from(value: [f32; 3]) -> Self {
        ParamValue::Vec3(value)
    }
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawParam {
    Bool(bool),
    Number(f64),
    Triple([f64; 3]),
    Text(String),
}

impl TryFrom<RawParam> for ParamValue {
    type Error = String;

    fn try_from(raw: RawParam) -> Result<Self, Self::Error> {
        match raw {
            RawParam::Bool(value) => Ok(ParamValue::Bool(value)),
            RawParam::Number(value) => Ok(ParamValue::Float(value as f32)),
            RawParam::Triple([x, y, z]) => Ok(ParamValue::Vec3([x as f32, y as f32, z as f32])),
            RawParam::Text(text) => parse_hex_color(&text).map(ParamValue::Vec3),
        }
    }
}

impl From<ParamValue> for RawParam {
    fn from(value: ParamValue) -> Self {
        match value {
            ParamValue::Bool(value) => RawParam::Bool(value),
            ParamValue::Float(value) => RawParam::Number(f64::from(value)),
            ParamValue::Vec3([x, y, z]) => {
                RawParam::Triple([f64::from(x), f64::from(y), f64::from(z)])
            }
        }
    }
}

/// Parses `#RRGGBB` (leading `#` optional) into linear 0..1 components.
pub fn parse_hex_color(raw: &str) -> Result<[f32; 3], String> {
    let digits = raw.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(format!("invalid colour '{raw}'; expected #RRGGBB"));
    }
    let mut rgb = [0.0_f32; 3];
    for (index, slot) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16)
            .map_err(|err| format!("invalid colour '{raw}': {err}"))?;
        *slot = f32::from(byte) / 255.0;
    }
    Ok(rgb)
}

/// One entry of the ordered layer stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Registry key (or alias) of the effect to draw.
    pub shader: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Requested strength; the engine clamps it to `0.0..=1.0`.
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
}

impl LayerConfig {
    pub fn new(shader: impl Into<String>, strength: f32) -> Self {
        Self {
            shader: shader.into(),
            enabled: true,
            strength,
            params: BTreeMap::new(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

fn default_enabled() -> bool {
    true
}

fn default_strength() -> f32 {
    0.6
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

impl Preset {
    /// Human readable title, falling back to the preset id.
    pub fn title<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFile {
    pub version: u32,
    #[serde(default)]
    pub motion_reduced: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        serialize_with = "serialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_frame_delta: Option<Duration>,
    #[serde(default)]
    pub default_preset: Option<String>,
    #[serde(default)]
    pub presets: BTreeMap<String, Preset>,
}

const BUILTIN_STACK: &str = r#"
version = 1
default_preset = "observatory"

[presets.observatory]
name = "Observatory of Becoming"
description = "Mystic fog with runic architectural elements"

[[presets.observatory.layers]]
shader = "elemental.fog.mystic"
strength = 0.7
params = { u_tint = [0.8, 0.9, 1.0], u_depth = 0.8 }

[[presets.observatory.layers]]
shader = "architectural.runic-glow.medium"
strength = 0.5
params = { u_tint = [1.0, 0.8, 0.4] }

[presets.ritual-chamber]
name = "Sacred Ritual Chamber"
description = "Ritual vignette with mystical energy"

[[presets.ritual-chamber.layers]]
shader = "ritual.vignette.sacral"
strength = 0.6
params = { u_tint = [0.9, 0.6, 0.8] }

[[presets.ritual-chamber.layers]]
shader = "elemental.fog.mystic"
strength = 0.4
params = { u_tint = [0.7, 0.8, 1.0], u_depth = 0.6 }

[presets.elemental-nexus]
name = "Elemental Nexus"
description = "Full mythic stack with all elemental forces"

[[presets.elemental-nexus.layers]]
shader = "elemental.fog.mystic"
strength = 0.8
params = { u_tint = [0.6, 0.8, 1.0], u_depth = 1.0 }

[[presets.elemental-nexus.layers]]
shader = "architectural.runic-glow.medium"
strength = 0.6
params = { u_tint = [1.0, 0.7, 0.3] }

[[presets.elemental-nexus.layers]]
shader = "ritual.vignette.sacral"
strength = 0.4
params = { u_tint = [0.8, 0.5, 0.9] }
"#;

impl StackFile {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: StackFile = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// The presets shipped with the engine.
    pub fn builtin() -> Self {
        // The embedded document is covered by `builtin_stack_parses`.
        Self::from_toml_str(BUILTIN_STACK).unwrap_or_else(|_| Self {
            version: 1,
            motion_reduced: false,
            max_frame_delta: None,
            default_preset: None,
            presets: BTreeMap::new(),
        })
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// The configured default preset, or the first preset by name.
    pub fn default_preset_name(&self) -> Option<&str> {
        self.default_preset
            .as_deref()
            .or_else(|| self.presets.keys().next().map(String::as_str))
    }

    pub fn default_layers(&self) -> Option<&[LayerConfig]> {
        let name = self.default_preset_name()?;
        self.presets.get(name).map(|preset| preset.layers.as_slice())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported stack file version {}; expected 1",
                self.version
            )));
        }

        if let Some(default) = &self.default_preset {
            if !self.presets.contains_key(default) {
                return Err(ConfigError::Invalid(format!(
                    "default_preset '{default}' does not exist"
                )));
            }
        }

        for (id, preset) in &self.presets {
            for (index, layer) in preset.layers.iter().enumerate() {
                validate_layer(layer).map_err(|reason| {
                    ConfigError::Invalid(format!("preset '{id}' layer {index}: {reason}"))
                })?;
            }
        }

        Ok(())
    }
}

fn validate_layer(layer: &LayerConfig) -> Result<(), String> {
    if layer.shader.trim().is_empty() {
        return Err("shader key must not be empty".to_string());
    }
    if !layer.strength.is_finite() {
        return Err(format!("strength {} is not a finite number", layer.strength));
    }
    for (name, value) in &layer.params {
        if !value.is_finite() {
            return Err(format!("parameter '{name}' is not finite"));
        }
    }
    Ok(())
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration_opt<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => {
            serializer.serialize_str(&humantime::format_duration(*duration).to_string())
        }
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1
motion_reduced = true
max_frame_delta = "100ms"
default_preset = "dusk"

[presets.dusk]
name = "Dusk Shrine"

[[presets.dusk.layers]]
shader = "elemental.fog.mystic"
strength = 0.7
params = { u_tint = "#CCD6FF", u_depth = 0.8 }

[[presets.dusk.layers]]
shader = "ritual.vignette.sacral"
enabled = false

[presets.bare]

[[presets.bare.layers]]
shader = "runic-glow"
strength = 1
params = { u_pulse_speed = 2, flicker = true }
"##;

    #[test]
    fn parses_sample_stack() {
        let stack = StackFile::from_toml_str(SAMPLE).expect("parse stack");
        assert!(stack.motion_reduced);
        assert_eq!(stack.max_frame_delta, Some(Duration::from_millis(100)));
        assert_eq!(stack.default_preset_name(), Some("dusk"));

        let dusk = stack.preset("dusk").expect("dusk preset");
        assert_eq!(dusk.title("dusk"), "Dusk Shrine");
        assert_eq!(dusk.layers.len(), 2);
        assert!(dusk.layers[0].enabled);
        assert!(!dusk.layers[1].enabled);
        assert!((dusk.layers[1].strength - 0.6).abs() < f32::EPSILON);

        let tint = dusk.layers[0].params["u_tint"].as_vec3().expect("tint");
        assert!((tint[0] - 0.8).abs() < 1e-6);
        assert!((tint[1] - 214.0 / 255.0).abs() < 1e-6);
        assert!((tint[2] - 1.0).abs() < 1e-6);

        let bare = stack.preset("bare").expect("bare preset");
        assert_eq!(bare.title("bare"), "bare");
        assert_eq!(bare.layers[0].params["u_pulse_speed"], ParamValue::Float(2.0));
        assert_eq!(bare.layers[0].params["flicker"], ParamValue::Bool(true));
    }

    #[test]
    fn numeric_frame_delta_is_seconds() {
        let stack = StackFile::from_toml_str("version = 1\nmax_frame_delta = 0.5\n").unwrap();
        assert_eq!(stack.max_frame_delta, Some(Duration::from_millis(500)));
        assert!(stack.default_layers().is_none());
    }

    #[test]
    fn rejects_unknown_default_preset() {
        let err = StackFile::from_toml_str("version = 1\ndefault_preset = \"missing\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = StackFile::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_shader_key() {
        let config = r#"
version = 1

[[presets.main.layers]]
shader = "  "
"#;
        let err = StackFile::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_colour() {
        let config = r##"
version = 1

[[presets.main.layers]]
shader = "elemental.fog.mystic"
params = { u_tint = "#GG0000" }
"##;
        let err = StackFile::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unrepresentable_frame_delta() {
        for value in ["1e30", "-0.5", "inf", "nan"] {
            let config = format!("version = 1\nmax_frame_delta = {value}\n");
            let err = StackFile::from_toml_str(&config).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{value}: {err}");
        }

        let stack = StackFile::from_toml_str("version = 1\nmax_frame_delta = 0.25\n").unwrap();
        assert_eq!(stack.max_frame_delta, Some(Duration::from_millis(250)));
    }

    #[test]
    fn hex_colours_decode_to_unit_range() {
        assert_eq!(parse_hex_color("#FFFFFF").unwrap(), [1.0, 1.0, 1.0]);
        assert_eq!(parse_hex_color("000000").unwrap(), [0.0, 0.0, 0.0]);
        assert!(parse_hex_color("#FFF").is_err());
    }

    #[test]
    fn builtin_stack_parses() {
        let parsed = StackFile::from_toml_str(BUILTIN_STACK).expect("builtin stack");
        assert_eq!(parsed.presets.len(), 3);
        assert_eq!(parsed.default_preset_name(), Some("observatory"));

        let builtin = StackFile::builtin();
        assert_eq!(builtin, parsed);
        let nexus = builtin.preset("elemental-nexus").expect("nexus");
        assert_eq!(nexus.layers.len(), 3);
        assert_eq!(nexus.layers[2].shader, "ritual.vignette.sacral");
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let stack = StackFile::load(&path).expect("load stack");
        assert_eq!(stack.presets.len(), 2);

        let missing = StackFile::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn layer_builder_collects_overrides() {
        let layer = LayerConfig::new("mystic-fog", 0.3)
            .with_param("u_depth", 0.5_f32)
            .with_param("u_tint", [1.0_f32, 0.0, 0.0])
            .enabled(false);
        assert!(!layer.enabled);
        assert_eq!(layer.params.len(), 2);
        assert_eq!(layer.params["u_depth"].type_name(), "float");
    }

    #[test]
    fn stack_round_trips_through_toml() {
        let stack = StackFile::from_toml_str(SAMPLE).unwrap();
        let serialized = toml::to_string(&stack).expect("serialize");
        let reparsed = StackFile::from_toml_str(&serialized).expect("reparse");
        assert_eq!(reparsed.max_frame_delta, stack.max_frame_delta);
        assert_eq!(reparsed.presets, stack.presets);
    }
}
