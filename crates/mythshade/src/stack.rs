use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use layerstack::{LayerConfig, StackFile};

use crate::paths::AppPaths;

/// Where the active stack file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOrigin {
    Explicit(PathBuf),
    UserConfig(PathBuf),
    Builtin,
}

impl fmt::Display for StackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackOrigin::Explicit(path) | StackOrigin::UserConfig(path) => {
                write!(f, "{}", path.display())
            }
            StackOrigin::Builtin => f.write_str("built-in presets"),
        }
    }
}

/// Loads `--stack` if given, then the user's stack file, then the built-in
/// presets.
pub fn load_stack(explicit: Option<&Path>, paths: &AppPaths) -> Result<(StackFile, StackOrigin)> {
    if let Some(path) = explicit {
        let stack = StackFile::load(path)
            .with_context(|| format!("failed to load stack file {}", path.display()))?;
        return Ok((stack, StackOrigin::Explicit(path.to_path_buf())));
    }

    let user_file = paths.stack_file();
    if user_file.is_file() {
        let stack = StackFile::load(&user_file)
            .with_context(|| format!("failed to load stack file {}", user_file.display()))?;
        return Ok((stack, StackOrigin::UserConfig(user_file)));
    }

    tracing::debug!(missing = %user_file.display(), "no user stack file; using built-in presets");
    Ok((StackFile::builtin(), StackOrigin::Builtin))
}

/// A preset resolved to the layers the engine should draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub id: String,
    pub title: String,
    pub layers: Vec<LayerConfig>,
}

pub fn select_preset(stack: &StackFile, requested: Option<&str>) -> Result<Selection> {
    let id = match requested {
        Some(name) => name.trim(),
        None => match stack.default_preset_name() {
            Some(name) => name,
            None => bail!("stack file defines no presets"),
        },
    };

    let Some(preset) = stack.preset(id) else {
        let available: Vec<&str> = stack.presets.keys().map(String::as_str).collect();
        bail!(
            "unknown preset '{id}'; available presets: {}",
            available.join(", ")
        );
    };

    if preset.layers.is_empty() {
        tracing::warn!(preset = id, "preset has no layers; only the base colour will show");
    }

    Ok(Selection {
        id: id.to_string(),
        title: preset.title(id).to_string(),
        layers: preset.layers.clone(),
    })
}
