//! Sound-effect playback with repeat throttling.
//!
//! Each effect entry lists the clips it can play and a repeat threshold:
//! while a clip of the entry is playing, the entry only plays again once
//! the running clip is past that fraction of its length.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::EffectPlayer;
use crate::sync::lock;

#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub name: String,
    pub length: Duration,
}

impl AudioClip {
    pub fn new(name: impl Into<String>, length: Duration) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioEntry {
    pub id: String,
    /// Fraction of the running clip after which the entry may replay.
    pub repeat_threshold: f32,
    pub clips: Vec<AudioClip>,
}

impl AudioEntry {
    pub fn new(id: impl Into<String>, repeat_threshold: f32) -> Self {
        Self {
            id: id.into(),
            repeat_threshold,
            clips: Vec::new(),
        }
    }

    #[must_use]
    pub fn clip(mut self, clip: AudioClip) -> Self {
        self.clips.push(clip);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AudioRepository {
    entries: Vec<AudioEntry>,
}

impl AudioRepository {
    #[must_use]
    pub fn with_entry(mut self, entry: AudioEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn get_by_name(&self, id: &str) -> Option<&AudioEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output device for one-shot clips.
pub trait AudioSink: Send + Sync {
    fn play_one_shot(&self, clip: &AudioClip, volume: f32);
}

/// Sink that logs instead of playing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AudioSink for LogSink {
    fn play_one_shot(&self, clip: &AudioClip, volume: f32) {
        info!(clip = %clip.name, volume, "play");
    }
}

#[derive(Debug)]
struct PlayingEffect {
    length: Duration,
    remaining: Duration,
}

impl PlayingEffect {
    fn progress(&self) -> f32 {
        if self.length.is_zero() {
            return 1.0;
        }
        1.0 - self.remaining.as_secs_f32() / self.length.as_secs_f32()
    }
}

#[derive(Debug, Default)]
struct AudioState {
    playing: HashMap<String, PlayingEffect>,
    next_clip: HashMap<String, usize>,
}

pub struct AudioService {
    repository: AudioRepository,
    sink: Option<Arc<dyn AudioSink>>,
    state: Mutex<AudioState>,
}

impl AudioService {
    pub fn new(repository: AudioRepository, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            repository,
            sink: Some(sink),
            state: Mutex::new(AudioState::default()),
        }
    }

    /// Service without an output; every play request is logged and dropped.
    pub fn silent(repository: AudioRepository) -> Self {
        Self {
            repository,
            sink: None,
            state: Mutex::new(AudioState::default()),
        }
    }

    pub fn repository(&self) -> &AudioRepository {
        &self.repository
    }

    pub fn is_playing(&self, name: &str) -> bool {
        lock(&self.state).playing.contains_key(name)
    }

    /// Advances every playing effect and forgets the ones that ended.
    pub fn update(&self, dt: Duration) {
        lock(&self.state).playing.retain(|_, effect| {
            if effect.remaining > dt {
                effect.remaining -= dt;
                true
            } else {
                false
            }
        });
    }
}

impl EffectPlayer for AudioService {
    fn play_effect(&self, name: &str, volume: f32) {
        let Some(sink) = &self.sink else {
            warn!(effect = name, "audio service has no output");
            return;
        };
        let Some(entry) = self.repository.get_by_name(name) else {
            warn!(effect = name, "no audio data for effect");
            return;
        };
        if entry.clips.is_empty() {
            warn!(effect = name, "audio entry has no clips");
            return;
        }

        let clip = {
            let mut state = lock(&self.state);
            let blocked = state
                .playing
                .get(name)
                .is_some_and(|effect| effect.progress() <= entry.repeat_threshold);
            if blocked {
                debug!(effect = name, "effect throttled");
                return;
            }

            let next = state.next_clip.entry(name.to_string()).or_insert(0);
            let clip = entry.clips[*next % entry.clips.len()].clone();
            *next = next.wrapping_add(1);

            state.playing.insert(
                name.to_string(),
                PlayingEffect {
                    length: clip.length,
                    remaining: clip.length,
                },
            );
            clip
        };

        sink.play_one_shot(&clip, volume);
    }
}
