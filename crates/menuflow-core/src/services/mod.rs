//! Collaborators controllers call into: sound effects and overlay templates.

mod audio;
mod ui_repository;

pub use audio::{AudioClip, AudioEntry, AudioRepository, AudioService, AudioSink, LogSink};
pub use ui_repository::{OverlayFactory, OverlayTemplate, UiRepository};

/// Plays named one-shot sound effects.
pub trait EffectPlayer: Send + Sync {
    fn play_effect(&self, name: &str, volume: f32);
}

/// Effect player that plays nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEffects;

impl EffectPlayer for NoEffects {
    fn play_effect(&self, name: &str, volume: f32) {
        tracing::trace!(effect = name, volume, "effect skipped: no player");
    }
}
