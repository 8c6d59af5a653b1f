//! A running scene: controllers registered in a directory, ticked at a
//! fixed rate while scripted steps are applied between frames.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::Table;
use menuflow_core::config::Config;
use menuflow_core::controller::MenuController;
use menuflow_core::overlay::{Overlay, OverlayId, OverlayStatus, Prompt, PromptData};
use menuflow_core::services::{
    AudioClip, AudioEntry, AudioRepository, AudioService, EffectPlayer, LogSink, UiRepository,
};
use menuflow_core::{ControllerDirectory, NavigationState, OverlayBehavior, OverlayKind, Registration, Transition, Tween};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::scene::{ControllerSpec, EffectSpec, OverlaySpec, Scene, Step};

/// Scheduler turns granted to navigation tasks after each frame.
const SETTLE_YIELDS: usize = 8;

/// Length used for the built-in effect clips.
const DEFAULT_CLIP_LENGTH: Duration = Duration::from_millis(300);

type PromptRegistry = Arc<Mutex<HashMap<OverlayId, Arc<Prompt>>>>;

pub struct Stage {
    directory: ControllerDirectory,
    controllers: Vec<MenuController>,
    _registrations: Vec<Registration>,
    prompts: PromptRegistry,
    audio: Arc<AudioService>,
    frame: Duration,
    realtime: bool,
    back_pending: bool,
    frames_run: u64,
}

impl Stage {
    /// Builds every controller of `scene`. Must run inside the tokio runtime.
    pub fn build(scene: &Scene, config: &Config, realtime: bool) -> Result<Self> {
        let audio = Arc::new(AudioService::new(
            audio_repository(&scene.effects, config),
            Arc::new(LogSink),
        ));
        let prompts: PromptRegistry = Arc::default();
        let directory = ControllerDirectory::new();

        let mut controllers = Vec::new();
        let mut registrations = Vec::new();
        for spec in &scene.controllers {
            let controller = build_controller(spec, config, &audio, &prompts)
                .with_context(|| format!("build controller '{}'", spec.name))?;
            registrations.push(directory.register(&controller));
            controllers.push(controller);
        }

        Ok(Self {
            directory,
            controllers,
            _registrations: registrations,
            prompts,
            audio,
            frame: config.frame_duration(),
            realtime,
            back_pending: false,
            frames_run: 0,
        })
    }

    pub async fn run_steps(&mut self, steps: &[Step]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            self.apply(step)
                .await
                .with_context(|| format!("step {} ({})", index + 1, step.name()))?;
        }
        Ok(())
    }

    pub async fn apply(&mut self, step: &Step) -> Result<()> {
        debug!(step = step.name(), "apply");
        match step {
            Step::Open { controller, overlay } => {
                let controller = self.controller(controller)?;
                println!("> open {overlay} on {}", controller.name());
                controller.open_overlay(OverlayKind::new(overlay.as_str()));
            }
            Step::Back { controller, animate } => {
                let controller = self.controller(controller)?;
                println!("> back on {}", controller.name());
                controller.go_back(*animate);
            }
            Step::BackInput => {
                println!("> back input");
                self.back_pending = true;
            }
            Step::Activate { controller } => {
                let controller = self.controller(controller)?;
                println!("> activate {}", controller.name());
                controller.set_active(true);
            }
            Step::Deactivate { controller } => {
                let controller = self.controller(controller)?;
                println!("> deactivate {}", controller.name());
                controller.set_active(false);
            }
            Step::Close {
                controller,
                overlay,
                animate,
            } => {
                let (controller, overlay) = self.overlay(controller, overlay)?;
                println!("> close {} on {}", overlay.kind(), controller.name());
                controller.close_overlay(&overlay, *animate);
            }
            Step::Accept { controller, overlay } | Step::Reject { controller, overlay } => {
                let (_, overlay) = self.overlay(controller, overlay)?;
                let prompt = self
                    .prompts
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&overlay.id())
                    .map(Arc::clone)
                    .with_context(|| format!("overlay '{}' is not a prompt", overlay.kind()))?;
                if matches!(step, Step::Accept { .. }) {
                    println!("> accept {}", overlay.kind());
                    prompt.accept(&overlay);
                } else {
                    println!("> reject {}", overlay.kind());
                    prompt.reject(&overlay);
                }
            }
            Step::Tick { frames } => self.tick(*frames).await,
            Step::Snapshot => println!("{}", self.snapshot()),
        }
        settle().await;
        Ok(())
    }

    /// Runs `frames` ticks of the fixed-rate loop.
    pub async fn tick(&mut self, frames: u32) {
        let mut ticker = self.realtime.then(|| {
            let mut ticker = interval(self.frame);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        for _ in 0..frames {
            if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
            }
            let back = std::mem::take(&mut self.back_pending);
            self.directory.update_all(self.frame, back);
            self.audio.update(self.frame);
            self.frames_run += 1;
            settle().await;
        }
    }

    pub fn snapshot(&self) -> String {
        let mut controllers = Table::new();
        controllers.set_header(["Controller", "Active", "Root", "Stack", "Current", "Navigation"]);
        for controller in &self.controllers {
            let stack: Vec<String> = controller.stack().iter().map(|o| o.kind().to_string()).collect();
            let current = controller
                .current_overlay()
                .map_or_else(|| "-".to_string(), |o| o.kind().to_string());
            controllers.add_row([
                controller.name().to_string(),
                yes_no(controller.is_active()),
                if controller.is_root_enabled() { "shown" } else { "hidden" }.to_string(),
                format!("[{}]", stack.join(", ")),
                current,
                navigation_label(controller.navigation_state()),
            ]);
        }

        let mut overlays = Table::new();
        overlays.set_header([
            "Controller",
            "Overlay",
            "Opened",
            "Transition",
            "Interactable",
            "Raycasts",
            "Progress",
        ]);
        for controller in &self.controllers {
            for overlay in controller.overlays() {
                let status: OverlayStatus = overlay.status();
                let progress = overlay
                    .transition()
                    .map_or_else(|| "-".to_string(), |t| format!("{:.2}", t.progress()));
                overlays.add_row([
                    controller.name().to_string(),
                    overlay.kind().to_string(),
                    yes_no(status.opened),
                    format!("{:?}", status.transition),
                    yes_no(status.interactable && status.enabled),
                    yes_no(status.blocks_raycasts),
                    progress,
                ]);
            }
        }

        format!("frame {}\n{controllers}\n{overlays}", self.frames_run)
    }

    fn controller(&self, name: &str) -> Result<MenuController> {
        self.directory
            .lookup(name)
            .with_context(|| format!("no controller named '{name}'"))
    }

    fn overlay(&self, controller: &str, kind: &str) -> Result<(MenuController, Arc<Overlay>)> {
        let controller = self.controller(controller)?;
        let overlay = controller
            .get_overlay(&OverlayKind::new(kind))
            .with_context(|| format!("controller '{}' has no overlay '{kind}'", controller.name()))?;
        Ok((controller, overlay))
    }
}

async fn settle() {
    for _ in 0..SETTLE_YIELDS {
        tokio::task::yield_now().await;
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

fn navigation_label(state: NavigationState) -> String {
    match state {
        NavigationState::Idle => "idle".to_string(),
        NavigationState::Transitioning(kind) => format!("{kind:?}").to_lowercase(),
    }
}

fn audio_repository(effects: &[EffectSpec], config: &Config) -> AudioRepository {
    if effects.is_empty() {
        return [&config.audio.back_effect, &config.audio.click_effect]
            .into_iter()
            .fold(AudioRepository::default(), |repository, id| {
                repository.with_entry(
                    AudioEntry::new(id.as_str(), 0.5).clip(AudioClip::new(id.as_str(), DEFAULT_CLIP_LENGTH)),
                )
            });
    }

    effects.iter().fold(AudioRepository::default(), |repository, spec| {
        let entry = spec.clips.iter().fold(
            AudioEntry::new(spec.id.as_str(), spec.repeat_threshold),
            |entry, clip| entry.clip(AudioClip::new(clip.name.as_str(), Duration::from_millis(clip.length_ms))),
        );
        repository.with_entry(entry)
    })
}

fn transition(duration_ms: u64) -> Option<Arc<dyn Transition>> {
    (duration_ms > 0).then(|| Arc::new(Tween::new(Duration::from_millis(duration_ms))) as Arc<dyn Transition>)
}

fn build_overlay(spec: &OverlaySpec, config: &Config, prompts: &PromptRegistry) -> Arc<Overlay> {
    let mut builder = Overlay::builder(spec.kind.as_str())
        .default_overlay(spec.default)
        .close_previous_when_opened(spec.close_previous)
        .back_effect(config.audio.back_effect.as_str());
    if let Some(transition) = transition(spec.transition_ms.unwrap_or(config.navigation.overlay_transition_ms)) {
        builder = builder.transition(transition);
    }

    let prompt = spec.prompt.as_ref().map(|prompt_spec| {
        let prompt = Arc::new(Prompt::with_click_effect(
            config.audio.click_effect.as_str(),
            config.audio.click_volume,
        ));
        prompt.set_prompt_data(
            PromptData::new(prompt_spec.title.as_str())
                .description(prompt_spec.description.as_str())
                .accept(prompt_spec.accept.as_str())
                .reject(prompt_spec.reject.as_str()),
        );
        prompt
    });
    if let Some(prompt) = &prompt {
        builder = builder.behavior(Arc::clone(prompt) as Arc<dyn OverlayBehavior>);
    }

    let overlay = builder.build();
    if let Some(prompt) = prompt {
        prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(overlay.id(), prompt);
    }
    overlay
}

fn build_controller(
    spec: &ControllerSpec,
    config: &Config,
    audio: &Arc<AudioService>,
    prompts: &PromptRegistry,
) -> Result<MenuController> {
    let mut templates = UiRepository::new();
    let mut builder = MenuController::builder(spec.name.as_str())
        .active(spec.active)
        .sequential_transitions(spec.sequential.unwrap_or(config.navigation.sequential_transitions))
        .effects(Arc::clone(audio) as Arc<dyn EffectPlayer>);
    if let Some(transition) = transition(spec.transition_ms.unwrap_or(config.navigation.controller_transition_ms)) {
        builder = builder.transition(transition);
    }

    for overlay in &spec.overlays {
        if overlay.template {
            let overlay_spec = overlay.clone();
            let config = config.clone();
            let prompts = Arc::clone(prompts);
            templates.register(overlay.kind.as_str(), move || {
                build_overlay(&overlay_spec, &config, &prompts)
            });
        } else {
            builder = builder.overlay(build_overlay(overlay, config, prompts));
        }
    }

    let controller = builder.factory(Arc::new(templates)).build()?;
    info!(controller = controller.name(), "controller ready");
    Ok(controller)
}
