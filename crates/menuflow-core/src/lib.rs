//! Overlay stack and navigation state machine for menu controllers.
//!
//! - `transition`: animated progress drivers (`Transition`, `Tween`)
//! - `overlay`: overlays, widgets and the prompt behavior
//! - `controller`: the per-controller navigation stack
//! - `directory`: name-based controller lookup and the active controller
//! - `services`: effect playback and overlay templates
//! - `config`: `config.toml` loading

pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod overlay;
pub mod services;
pub mod transition;

mod sync;

pub use controller::{MenuController, NavOutcome, NavigationHandle, NavigationState, OverlayTarget};
pub use directory::{ControllerDirectory, Registration};
pub use error::{NavError, NavResult};
pub use overlay::{Overlay, OverlayBehavior, OverlayKind, TransitionState};
pub use transition::{PlaybackDirection, Transition, Tween};
