//! Animated progress drivers.
//!
//! A [`Transition`] moves a progress value between 0 (hidden) and 1
//! (shown). Playback is advanced by the owner's tick loop through
//! [`Transition::advance`]; anything that needs to wait for an animation
//! subscribes to the snapshot channel and waits for `playing == false`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackDirection {
    #[default]
    Forward,
    Backward,
}

impl PlaybackDirection {
    /// Progress value playback starts from when reset.
    pub fn start(self) -> f32 {
        match self {
            PlaybackDirection::Forward => 0.0,
            PlaybackDirection::Backward => 1.0,
        }
    }

    /// Progress value playback stops at.
    pub fn end(self) -> f32 {
        match self {
            PlaybackDirection::Forward => 1.0,
            PlaybackDirection::Backward => 0.0,
        }
    }
}

/// Point-in-time view of a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionSnapshot {
    pub progress: f32,
    pub direction: PlaybackDirection,
    pub playing: bool,
}

impl TransitionSnapshot {
    fn at(progress: f32) -> Self {
        Self {
            progress,
            direction: PlaybackDirection::Forward,
            playing: false,
        }
    }
}

/// Callback invoked with `(progress, direction)` on every progress change.
pub type ProgressListener = Arc<dyn Fn(f32, PlaybackDirection) + Send + Sync>;

pub trait Transition: Send + Sync {
    /// Starts playing towards 1. With `reset_first`, playback restarts from 0.
    fn play_forward(&self, reset_first: bool);

    /// Starts playing towards 0. With `reset_first`, playback restarts from 1.
    fn play_backward(&self, reset_first: bool);

    /// Snaps to `value` immediately and stops any playback in flight.
    fn set_progress(&self, value: f32, direction: PlaybackDirection);

    /// Advances playback by `dt`. No-op when not playing.
    fn advance(&self, dt: Duration);

    fn snapshot(&self) -> TransitionSnapshot;

    /// Subscribes to snapshot changes. The current value is marked seen.
    fn subscribe(&self) -> watch::Receiver<TransitionSnapshot>;

    fn add_progress_listener(&self, listener: ProgressListener);

    fn is_playing(&self) -> bool {
        self.snapshot().playing
    }

    fn progress(&self) -> f32 {
        self.snapshot().progress
    }

    fn direction(&self) -> PlaybackDirection {
        self.snapshot().direction
    }

    /// Lazy sequence of progress values for the next playback.
    fn progress_changes(&self) -> ProgressStream {
        ProgressStream {
            rx: self.subscribe(),
            done: false,
        }
    }
}

/// Waits until the transition behind `rx` stops playing.
///
/// Returns `false` if the transition was dropped first.
pub async fn wait_until_stopped(rx: &mut watch::Receiver<TransitionSnapshot>) -> bool {
    rx.wait_for(|snapshot| !snapshot.playing).await.is_ok()
}

/// Progress values of one playback, ending once playback stops.
///
/// Call [`Transition::progress_changes`] again to follow the next playback.
pub struct ProgressStream {
    rx: watch::Receiver<TransitionSnapshot>,
    done: bool,
}

impl ProgressStream {
    pub async fn next(&mut self) -> Option<f32> {
        if self.done {
            return None;
        }
        if self.rx.changed().await.is_err() {
            self.done = true;
            return None;
        }
        let snapshot = *self.rx.borrow_and_update();
        if !snapshot.playing {
            self.done = true;
        }
        Some(snapshot.progress)
    }
}

/// Linear, duration-based transition.
pub struct Tween {
    duration: Duration,
    state: Mutex<TransitionSnapshot>,
    tx: watch::Sender<TransitionSnapshot>,
    listeners: Mutex<Vec<ProgressListener>>,
}

impl Tween {
    /// Creates a tween resting at progress 0.
    pub fn new(duration: Duration) -> Self {
        Self::starting_at(duration, 0.0)
    }

    /// Creates a tween resting at progress 1.
    pub fn shown(duration: Duration) -> Self {
        Self::starting_at(duration, 1.0)
    }

    fn starting_at(duration: Duration, progress: f32) -> Self {
        let snapshot = TransitionSnapshot::at(progress);
        let (tx, _) = watch::channel(snapshot);
        Self {
            duration,
            state: Mutex::new(snapshot),
            tx,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn play(&self, direction: PlaybackDirection, reset_first: bool) {
        let snapshot = {
            let mut state = lock(&self.state);
            if reset_first {
                state.progress = direction.start();
            }
            state.direction = direction;
            state.playing = true;
            if self.duration.is_zero() || state.progress == direction.end() {
                state.progress = direction.end();
                state.playing = false;
            }
            *state
        };
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: TransitionSnapshot) {
        self.tx.send_replace(snapshot);
        let listeners: Vec<ProgressListener> = lock(&self.listeners).clone();
        for listener in listeners {
            listener(snapshot.progress, snapshot.direction);
        }
    }
}

impl std::fmt::Debug for Tween {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tween")
            .field("duration", &self.duration)
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}

impl Transition for Tween {
    fn play_forward(&self, reset_first: bool) {
        self.play(PlaybackDirection::Forward, reset_first);
    }

    fn play_backward(&self, reset_first: bool) {
        self.play(PlaybackDirection::Backward, reset_first);
    }

    fn set_progress(&self, value: f32, direction: PlaybackDirection) {
        let snapshot = {
            let mut state = lock(&self.state);
            state.progress = value.clamp(0.0, 1.0);
            state.direction = direction;
            state.playing = false;
            *state
        };
        self.publish(snapshot);
    }

    fn advance(&self, dt: Duration) {
        let snapshot = {
            let mut state = lock(&self.state);
            if !state.playing {
                return;
            }
            let step = dt.as_secs_f32() / self.duration.as_secs_f32();
            state.progress = match state.direction {
                PlaybackDirection::Forward => (state.progress + step).min(1.0),
                PlaybackDirection::Backward => (state.progress - step).max(0.0),
            };
            if state.progress == state.direction.end() {
                state.playing = false;
            }
            *state
        };
        self.publish(snapshot);
    }

    fn snapshot(&self) -> TransitionSnapshot {
        *lock(&self.state)
    }

    fn subscribe(&self) -> watch::Receiver<TransitionSnapshot> {
        self.tx.subscribe()
    }

    fn add_progress_listener(&self, listener: ProgressListener) {
        lock(&self.listeners).push(listener);
    }
}
