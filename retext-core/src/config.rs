use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::geometry::Rgb;
use crate::run::RunStyle;

/// How the serializer treats the original page content on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReinsertionPolicy {
    /// Replace the page content with an opaque background and redraw every
    /// run. Non-text graphics of the page are lost.
    #[default]
    Repaint,
    /// Keep the original content and draw the runs on top of it.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawFailurePolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub initial: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            initial: 1.5,
            min: 0.5,
            max: 2.0,
        }
    }
}

impl ScaleConfig {
    pub fn clamp(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return self.initial.clamp(self.min, self.max);
        }
        scale.clamp(self.min, self.max)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub scale: ScaleConfig,
    pub default_font: String,
    pub default_font_size: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub default_color: Rgb,
    #[serde_as(as = "DisplayFromStr")]
    pub background: Rgb,
    pub policy: ReinsertionPolicy,
    pub draw_failure: DrawFailurePolicy,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            scale: ScaleConfig::default(),
            default_font: "Helvetica".to_owned(),
            default_font_size: 12.0,
            default_color: Rgb::BLACK,
            background: Rgb::WHITE,
            policy: ReinsertionPolicy::default(),
            draw_failure: DrawFailurePolicy::default(),
        }
    }
}

impl EditorConfig {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "retext", "retext")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: EditorConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let scale = &self.scale;
        if !(scale.min > 0.0 && scale.min <= scale.max && scale.max.is_finite()) {
            anyhow::bail!("scale bounds must satisfy 0 < min <= max");
        }
        if !(self.default_font_size.is_finite() && self.default_font_size > 0.0) {
            anyhow::bail!("default_font_size must be positive");
        }
        Ok(())
    }

    pub fn default_style(&self) -> RunStyle {
        RunStyle {
            font_family: self.default_font.clone(),
            color: self.default_color,
            font_size: self.default_font_size,
        }
    }

    pub fn reinsert_options(&self) -> ReinsertOptions {
        ReinsertOptions {
            policy: self.policy,
            draw_failure: self.draw_failure,
            default_font: self.default_font.clone(),
            background: self.background,
        }
    }
}

/// Settings the serializer needs for one save.
#[derive(Debug, Clone, PartialEq)]
pub struct ReinsertOptions {
    pub policy: ReinsertionPolicy,
    pub draw_failure: DrawFailurePolicy,
    pub default_font: String,
    pub background: Rgb,
}

impl Default for ReinsertOptions {
    fn default() -> Self {
        EditorConfig::default().reinsert_options()
    }
}
