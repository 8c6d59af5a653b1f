//! Overlays: the navigable UI units a controller stacks.
//!
//! An overlay owns its open/close transition, its input-blocking flags and
//! its widgets. Opening and closing are split in two halves:
//!
//! - the synchronous half runs when [`Overlay::open`] / [`Overlay::close`]
//!   is called and commits the `opened` flag and the transition state;
//! - the returned [`TransitionHandle`] completes the transition once the
//!   animation stops, and must be awaited (or detached) for the flags to
//!   settle.
//!
//! Every transition bumps a generation counter. A handle whose generation
//! has been superseded (a reopen overtook a close, or the overlay was
//! hidden mid-animation) completes without touching the overlay.
//!
//! ## Module Structure
//!
//! - `widget.rs`: widgets refreshed from their overlay
//! - `prompt.rs`: confirmation prompt behavior

mod prompt;
mod widget;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

pub use prompt::{DEFAULT_CLICK_EFFECT, DEFAULT_CLICK_VOLUME, Prompt, PromptCallback, PromptData, PromptView};
pub use widget::{Widget, WidgetKind};

use crate::controller::{MenuController, WeakController};
use crate::sync::lock;
use crate::transition::{PlaybackDirection, Transition, TransitionSnapshot, wait_until_stopped};

/// Effect played by the default back handler.
pub const DEFAULT_BACK_EFFECT: &str = "menu-back";

static NEXT_OVERLAY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique overlay identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub u64);

impl OverlayId {
    fn next() -> Self {
        Self(NEXT_OVERLAY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! stable_kind {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(::std::borrow::Cow<'static, str>);

        impl $name {
            pub const fn from_static(name: &'static str) -> Self {
                Self(::std::borrow::Cow::Borrowed(name))
            }

            pub fn new(name: impl Into<String>) -> Self {
                Self(::std::borrow::Cow::Owned(name.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self::new(name)
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self::new(name)
            }
        }
    };
}

pub(crate) use stable_kind;

stable_kind!(
    /// Stable identifier for a kind of overlay (settings, prompt, pause...).
    OverlayKind
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionState {
    #[default]
    None,
    Opening,
    Closing,
}

/// Observable overlay flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStatus {
    pub opened: bool,
    pub transition: TransitionState,
    pub interactable: bool,
    pub blocks_raycasts: bool,
    pub enabled: bool,
}

#[derive(Debug)]
struct OverlayState {
    opened: bool,
    transition: TransitionState,
    interactable: bool,
    blocks_raycasts: bool,
    enabled: bool,
    generation: u64,
}

/// Hooks an overlay kind can override.
pub trait OverlayBehavior: Send + Sync {
    /// Invoked when back is requested while this overlay is on top.
    fn on_back(&self, overlay: &Arc<Overlay>) {
        overlay.default_back();
    }

    /// Invoked after widgets were refreshed.
    fn refresh(&self, _overlay: &Overlay) {}
}

struct DefaultBehavior;

impl OverlayBehavior for DefaultBehavior {}

pub struct Overlay {
    id: OverlayId,
    kind: OverlayKind,
    close_previous_when_opened: bool,
    is_default: bool,
    back_effect: String,
    transition: Option<Arc<dyn Transition>>,
    widgets: Vec<Arc<dyn Widget>>,
    behavior: Arc<dyn OverlayBehavior>,
    owner: OnceLock<WeakController>,
    state: Mutex<OverlayState>,
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}

impl Overlay {
    pub fn builder(kind: impl Into<OverlayKind>) -> OverlayBuilder {
        OverlayBuilder::new(kind.into())
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn kind(&self) -> &OverlayKind {
        &self.kind
    }

    /// Opening this overlay closes the one currently shown.
    pub fn close_previous_when_opened(&self) -> bool {
        self.close_previous_when_opened
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn back_effect(&self) -> &str {
        &self.back_effect
    }

    pub fn transition(&self) -> Option<&Arc<dyn Transition>> {
        self.transition.as_ref()
    }

    pub fn status(&self) -> OverlayStatus {
        let state = lock(&self.state);
        OverlayStatus {
            opened: state.opened,
            transition: state.transition,
            interactable: state.interactable,
            blocks_raycasts: state.blocks_raycasts,
            enabled: state.enabled,
        }
    }

    pub fn is_opened(&self) -> bool {
        lock(&self.state).opened
    }

    pub fn transition_state(&self) -> TransitionState {
        lock(&self.state).transition
    }

    /// Accepts input: interactable and not hidden.
    pub fn is_interactable(&self) -> bool {
        let state = lock(&self.state);
        state.interactable && state.enabled
    }

    pub fn blocks_raycasts(&self) -> bool {
        lock(&self.state).blocks_raycasts
    }

    pub fn set_interactable(&self, interactable: bool) {
        lock(&self.state).interactable = interactable;
    }

    pub fn set_blocks_raycasts(&self, blocks: bool) {
        lock(&self.state).blocks_raycasts = blocks;
    }

    /// Stops accepting input while still swallowing pointer events.
    pub fn block_input(&self) {
        let mut state = lock(&self.state);
        state.interactable = false;
        state.blocks_raycasts = true;
    }

    pub fn controller(&self) -> Option<MenuController> {
        self.owner.get().and_then(WeakController::upgrade)
    }

    /// This overlay is its controller's current overlay.
    pub fn is_current(&self) -> bool {
        self.controller()
            .and_then(|controller| controller.current_overlay())
            .is_some_and(|current| current.id() == self.id)
    }

    pub fn all_widgets(&self) -> &[Arc<dyn Widget>] {
        &self.widgets
    }

    /// First widget of `kind`.
    pub fn widget(&self, kind: &WidgetKind) -> Option<&Arc<dyn Widget>> {
        self.widgets.iter().find(|widget| widget.kind() == *kind)
    }

    pub fn widgets_of<'a>(&'a self, kind: &'a WidgetKind) -> impl Iterator<Item = &'a Arc<dyn Widget>> {
        self.widgets.iter().filter(move |widget| widget.kind() == *kind)
    }

    /// Pushes current state into every widget.
    pub fn refresh_content(&self) {
        for widget in &self.widgets {
            widget.update_widget(self);
        }
        self.behavior.refresh(self);
    }

    pub fn on_back(self: &Arc<Self>) {
        let behavior = Arc::clone(&self.behavior);
        behavior.on_back(self);
    }

    /// Plays the back effect and navigates the owner back one level.
    pub fn default_back(&self) {
        let Some(controller) = self.controller() else {
            warn!(overlay = %self.kind, "back requested on an overlay without a controller");
            return;
        };
        controller.effects().play_effect(&self.back_effect, 1.0);
        controller.go_back(true);
    }

    /// Plays `name` through the owner's effect player, if any.
    pub fn play_effect(&self, name: &str, volume: f32) {
        if let Some(controller) = self.controller() {
            controller.effects().play_effect(name, volume);
        }
    }

    /// Closes this overlay and removes it from its owner's stack.
    ///
    /// The current overlay closes through `go_back`, so the one beneath is
    /// revealed.
    pub fn close_self(self: &Arc<Self>, animate: bool) {
        match self.controller() {
            Some(controller) => {
                controller.close_overlay(self, animate);
            }
            None => self.close(animate).detach(),
        }
    }

    /// Starts opening. No-op if already opened.
    pub fn open(self: &Arc<Self>, animate: bool) -> TransitionHandle {
        if self.is_opened() {
            return TransitionHandle::settled();
        }

        self.refresh_content();

        let generation = {
            let mut state = lock(&self.state);
            if state.opened {
                return TransitionHandle::settled();
            }
            state.transition = TransitionState::Opening;
            state.opened = true;
            state.generation += 1;
            state.generation
        };
        debug!(overlay = %self.kind, animate, "opening overlay");

        match &self.transition {
            Some(transition) if animate => {
                transition.play_forward(true);
                TransitionHandle::pending(self, TransitionState::Opening, generation, transition.subscribe())
            }
            Some(transition) => {
                transition.set_progress(1.0, PlaybackDirection::Forward);
                self.complete(generation, TransitionState::Opening);
                TransitionHandle::settled()
            }
            None => {
                self.complete(generation, TransitionState::Opening);
                TransitionHandle::settled()
            }
        }
    }

    /// Starts closing. No-op if already closed.
    ///
    /// Input is blocked immediately, before the animation finishes.
    pub fn close(self: &Arc<Self>, animate: bool) -> TransitionHandle {
        let generation = {
            let mut state = lock(&self.state);
            if !state.opened {
                return TransitionHandle::settled();
            }
            state.transition = TransitionState::Closing;
            state.opened = false;
            state.interactable = false;
            state.blocks_raycasts = false;
            state.generation += 1;
            state.generation
        };
        debug!(overlay = %self.kind, animate, "closing overlay");

        self.refresh_content();

        match &self.transition {
            Some(transition) if animate => {
                transition.play_backward(true);
                TransitionHandle::pending(self, TransitionState::Closing, generation, transition.subscribe())
            }
            Some(transition) => {
                transition.set_progress(0.0, PlaybackDirection::Forward);
                self.complete(generation, TransitionState::Closing);
                TransitionHandle::settled()
            }
            None => {
                self.complete(generation, TransitionState::Closing);
                TransitionHandle::settled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Enables or hides the overlay's visual object.
    ///
    /// Hiding mid-transition snaps the transition to its terminal value.
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = std::mem::replace(&mut lock(&self.state).enabled, enabled);
        if was_enabled && !enabled {
            self.snap_in_flight_transition();
        }
    }

    fn snap_in_flight_transition(&self) {
        let snap_to = {
            let mut state = lock(&self.state);
            let snap_to = match state.transition {
                TransitionState::Opening => {
                    state.interactable = true;
                    state.blocks_raycasts = true;
                    Some(1.0)
                }
                TransitionState::Closing => {
                    state.interactable = false;
                    state.blocks_raycasts = false;
                    Some(0.0)
                }
                TransitionState::None => None,
            };
            if snap_to.is_some() {
                state.transition = TransitionState::None;
                state.generation += 1;
            }
            snap_to
        };

        if let (Some(value), Some(transition)) = (snap_to, &self.transition) {
            debug!(overlay = %self.kind, value, "snapping hidden overlay transition");
            transition.set_progress(value, PlaybackDirection::Forward);
        }
    }

    fn complete(&self, generation: u64, kind: TransitionState) {
        let mut state = lock(&self.state);
        if state.generation != generation {
            return;
        }
        if kind == TransitionState::Opening {
            state.interactable = true;
            state.blocks_raycasts = true;
        }
        state.transition = TransitionState::None;
    }

    /// Shows a default overlay without going through the animated path.
    pub(crate) fn activate_as_default(&self) {
        self.refresh_content();
        {
            let mut state = lock(&self.state);
            state.opened = true;
            state.interactable = true;
            state.blocks_raycasts = true;
            state.transition = TransitionState::None;
            state.generation += 1;
        }
        if let Some(transition) = &self.transition {
            transition.set_progress(1.0, PlaybackDirection::Forward);
        }
    }

    /// Binds this overlay to its controller. Fails if already owned.
    pub(crate) fn attach(&self, owner: WeakController) -> bool {
        self.owner.set(owner).is_ok()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.owner.get().is_some()
    }

    pub(crate) fn advance(&self, dt: std::time::Duration) {
        if let Some(transition) = &self.transition {
            transition.advance(dt);
        }
    }
}

pub struct OverlayBuilder {
    kind: OverlayKind,
    close_previous_when_opened: bool,
    is_default: bool,
    back_effect: String,
    transition: Option<Arc<dyn Transition>>,
    widgets: Vec<Arc<dyn Widget>>,
    behavior: Option<Arc<dyn OverlayBehavior>>,
}

impl OverlayBuilder {
    fn new(kind: OverlayKind) -> Self {
        Self {
            kind,
            close_previous_when_opened: true,
            is_default: false,
            back_effect: DEFAULT_BACK_EFFECT.to_string(),
            transition: None,
            widgets: Vec::new(),
            behavior: None,
        }
    }

    #[must_use]
    pub fn close_previous_when_opened(mut self, close: bool) -> Self {
        self.close_previous_when_opened = close;
        self
    }

    #[must_use]
    pub fn default_overlay(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    #[must_use]
    pub fn back_effect(mut self, name: impl Into<String>) -> Self {
        self.back_effect = name.into();
        self
    }

    #[must_use]
    pub fn transition(mut self, transition: Arc<dyn Transition>) -> Self {
        self.transition = Some(transition);
        self
    }

    #[must_use]
    pub fn widget(mut self, widget: Arc<dyn Widget>) -> Self {
        self.widgets.push(widget);
        self
    }

    #[must_use]
    pub fn behavior(mut self, behavior: Arc<dyn OverlayBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    pub fn build(self) -> Arc<Overlay> {
        Arc::new(Overlay {
            id: OverlayId::next(),
            kind: self.kind,
            close_previous_when_opened: self.close_previous_when_opened,
            is_default: self.is_default,
            back_effect: self.back_effect,
            transition: self.transition,
            widgets: self.widgets,
            behavior: self.behavior.unwrap_or_else(|| Arc::new(DefaultBehavior)),
            owner: OnceLock::new(),
            state: Mutex::new(OverlayState {
                opened: false,
                transition: TransitionState::None,
                interactable: false,
                blocks_raycasts: false,
                enabled: true,
                generation: 0,
            }),
        })
    }
}

struct PendingTransition {
    overlay: Arc<Overlay>,
    kind: TransitionState,
    generation: u64,
    rx: watch::Receiver<TransitionSnapshot>,
}

/// Completion half of an overlay open or close.
#[must_use = "the transition only settles once the handle is awaited or detached"]
pub struct TransitionHandle {
    pending: Option<PendingTransition>,
}

impl TransitionHandle {
    fn settled() -> Self {
        Self { pending: None }
    }

    fn pending(
        overlay: &Arc<Overlay>,
        kind: TransitionState,
        generation: u64,
        rx: watch::Receiver<TransitionSnapshot>,
    ) -> Self {
        Self {
            pending: Some(PendingTransition {
                overlay: Arc::clone(overlay),
                kind,
                generation,
                rx,
            }),
        }
    }

    /// The transition already completed synchronously.
    pub fn is_settled(&self) -> bool {
        self.pending.is_none()
    }

    /// Waits for the animation to stop, then settles the overlay flags.
    pub async fn finished(self) {
        let Some(mut pending) = self.pending else {
            return;
        };
        wait_until_stopped(&mut pending.rx).await;
        pending.overlay.complete(pending.generation, pending.kind);
    }

    /// Lets the transition finish in the background on the current runtime.
    ///
    /// Outside a runtime the flags are settled immediately.
    pub fn detach(self) {
        match Handle::try_current() {
            Ok(runtime) => self.detach_on(&runtime),
            Err(_) => {
                if let Some(pending) = self.pending {
                    warn!(overlay = %pending.overlay.kind, "no runtime to finish transition; settling now");
                    pending.overlay.complete(pending.generation, pending.kind);
                }
            }
        }
    }

    pub(crate) fn detach_on(self, runtime: &Handle) {
        if self.is_settled() {
            return;
        }
        runtime.spawn(self.finished());
    }

    /// Spawns the finalizer on `runtime` and returns a future that resolves
    /// once it has settled the overlay.
    ///
    /// Dropping the returned future leaves the finalizer running.
    pub(crate) fn spawn_on(self, runtime: &Handle) -> impl Future<Output = ()> + Send + 'static {
        let kind = self.pending.as_ref().map(|pending| pending.overlay.kind.clone());
        let task = (!self.is_settled()).then(|| runtime.spawn(self.finished()));
        async move {
            let Some(task) = task else {
                return;
            };
            if let Err(err) = task.await {
                warn!(overlay = ?kind.as_ref().map(OverlayKind::as_str), %err, "transition finalizer failed");
            }
        }
    }
}
