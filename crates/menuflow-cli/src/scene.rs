//! Scene scripts: controllers, overlays, effects and the steps to run.
//!
//! ```toml
//! [[controllers]]
//! name = "Main Menu Controller"
//! active = true
//!
//! [[controllers.overlays]]
//! kind = "settings"
//! default = true
//!
//! [[steps]]
//! action = "open"
//! controller = "Main Menu Controller"
//! overlay = "confirm"
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub controllers: Vec<ControllerSpec>,
    pub effects: Vec<EffectSpec>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSpec {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    /// Overrides `navigation.sequential_transitions`.
    pub sequential: Option<bool>,
    /// Overrides `navigation.controller_transition_ms`. Zero disables the transition.
    pub transition_ms: Option<u64>,
    #[serde(default)]
    pub overlays: Vec<OverlaySpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlaySpec {
    pub kind: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "default_true")]
    pub close_previous: bool,
    /// Overrides `navigation.overlay_transition_ms`. Zero disables the transition.
    pub transition_ms: Option<u64>,
    /// Hosts the overlay as a confirmation prompt.
    pub prompt: Option<PromptSpec>,
    /// Registers the overlay as a template instead of hosting it.
    #[serde(default)]
    pub template: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptSpec {
    pub title: String,
    pub description: String,
    pub accept: String,
    pub reject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EffectSpec {
    pub id: String,
    #[serde(default)]
    pub repeat_threshold: f32,
    pub clips: Vec<ClipSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClipSpec {
    pub name: String,
    pub length_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Open {
        controller: String,
        overlay: String,
    },
    Back {
        controller: String,
        #[serde(default = "default_true")]
        animate: bool,
    },
    /// Raises the back input for the next frame.
    BackInput,
    Activate {
        controller: String,
    },
    Deactivate {
        controller: String,
    },
    Close {
        controller: String,
        overlay: String,
        #[serde(default = "default_true")]
        animate: bool,
    },
    Accept {
        controller: String,
        overlay: String,
    },
    Reject {
        controller: String,
        overlay: String,
    },
    Tick {
        #[serde(default = "default_frames")]
        frames: u32,
    },
    Snapshot,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Open { .. } => "open",
            Step::Back { .. } => "back",
            Step::BackInput => "back_input",
            Step::Activate { .. } => "activate",
            Step::Deactivate { .. } => "deactivate",
            Step::Close { .. } => "close",
            Step::Accept { .. } => "accept",
            Step::Reject { .. } => "reject",
            Step::Tick { .. } => "tick",
            Step::Snapshot => "snapshot",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_frames() -> u32 {
    1
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read scene from {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse scene from {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let scene: Scene = toml::from_str(contents)?;
        if scene.controllers.is_empty() {
            anyhow::bail!("scene declares no controllers");
        }
        Ok(scene)
    }
}
