//! Menu controllers.
//!
//! A controller hosts a set of overlays, keeps a navigation stack of the
//! ones the user walked through and drives their transitions. Navigation
//! (`open_overlay`, `go_back`) commits its stack change synchronously and
//! runs the animated part as a tokio task; a newer request cancels the
//! task of an older one.
//!
//! Controllers are ticked by the host loop through [`MenuController::update`],
//! which also advances every transition the controller owns.
//!
//! Invariants:
//! - the stack never holds the same overlay twice in a row
//! - the current overlay is the top of the stack when the stack is non-empty
//! - at most one navigation task is tracked at a time
//!
//! Overlay finalizers run as their own tasks, so cancelling a navigation
//! never leaves an overlay stuck mid-transition.

mod task;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use task::{NavTaskSeq, NavTaskState};
pub use task::{NavOutcome, NavTaskId, NavigationHandle, NavigationState};

use crate::directory::ControllerDirectory;
use crate::error::{NavError, NavResult};
use crate::overlay::{Overlay, OverlayKind, TransitionState};
use crate::services::{EffectPlayer, NoEffects, OverlayFactory, OverlayTemplate};
use crate::sync::lock;
use crate::transition::{PlaybackDirection, Transition};

/// Identifies the overlay a navigation request targets.
#[derive(Debug, Clone)]
pub enum OverlayTarget {
    Overlay(Arc<Overlay>),
    /// Position in the controller's hosted overlays.
    Index(usize),
    /// First hosted overlay of this kind, instantiated from the factory if needed.
    Kind(OverlayKind),
}

impl fmt::Display for OverlayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayTarget::Overlay(overlay) => write!(f, "overlay '{}' (#{})", overlay.kind(), overlay.id().0),
            OverlayTarget::Index(index) => write!(f, "overlay index {index}"),
            OverlayTarget::Kind(kind) => write!(f, "overlay kind '{kind}'"),
        }
    }
}

impl From<Arc<Overlay>> for OverlayTarget {
    fn from(overlay: Arc<Overlay>) -> Self {
        OverlayTarget::Overlay(overlay)
    }
}

impl From<&Arc<Overlay>> for OverlayTarget {
    fn from(overlay: &Arc<Overlay>) -> Self {
        OverlayTarget::Overlay(Arc::clone(overlay))
    }
}

impl From<usize> for OverlayTarget {
    fn from(index: usize) -> Self {
        OverlayTarget::Index(index)
    }
}

impl From<OverlayKind> for OverlayTarget {
    fn from(kind: OverlayKind) -> Self {
        OverlayTarget::Kind(kind)
    }
}

struct ControllerState {
    active: bool,
    accepts_input: bool,
    root_enabled: bool,
    started: bool,
    overlays: Vec<Arc<Overlay>>,
    stack: Vec<Arc<Overlay>>,
    current: Option<Arc<Overlay>>,
    nav: NavTaskState,
    seq: NavTaskSeq,
    directory: Option<ControllerDirectory>,
}

pub(crate) struct ControllerInner {
    name: String,
    sequential: bool,
    transition: Option<Arc<dyn Transition>>,
    effects: Arc<dyn EffectPlayer>,
    factory: Option<Arc<dyn OverlayFactory>>,
    runtime: Handle,
    state: Mutex<ControllerState>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.nav.cancel();
    }
}

/// Shared handle to a menu controller.
#[derive(Clone)]
pub struct MenuController {
    inner: Arc<ControllerInner>,
}

/// Non-owning controller reference held by overlays and directories.
#[derive(Clone)]
pub struct WeakController(Weak<ControllerInner>);

impl WeakController {
    pub fn upgrade(&self) -> Option<MenuController> {
        self.0.upgrade().map(|inner| MenuController { inner })
    }

    pub(crate) fn ptr_eq(&self, other: &WeakController) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for WeakController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(controller) => write!(f, "WeakController({:?})", controller.name()),
            None => f.write_str("WeakController(<dropped>)"),
        }
    }
}

impl fmt::Debug for MenuController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("MenuController")
            .field("name", &self.inner.name)
            .field("active", &state.active)
            .field("stack", &state.stack.iter().map(|o| o.kind().as_str()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MenuController {
    pub fn builder(name: impl Into<String>) -> MenuControllerBuilder {
        MenuControllerBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ptr_eq(&self, other: &MenuController) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakController {
        WeakController(Arc::downgrade(&self.inner))
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner.state).active
    }

    pub fn accepts_input(&self) -> bool {
        lock(&self.inner.state).accepts_input
    }

    /// The controller's visual root is shown.
    pub fn is_root_enabled(&self) -> bool {
        lock(&self.inner.state).root_enabled
    }

    /// The controller has been visible at least once.
    pub fn is_started(&self) -> bool {
        lock(&self.inner.state).started
    }

    pub fn is_sequential(&self) -> bool {
        self.inner.sequential
    }

    pub fn transition(&self) -> Option<&Arc<dyn Transition>> {
        self.inner.transition.as_ref()
    }

    pub fn effects(&self) -> &Arc<dyn EffectPlayer> {
        &self.inner.effects
    }

    pub fn overlays(&self) -> Vec<Arc<Overlay>> {
        lock(&self.inner.state).overlays.clone()
    }

    /// Navigation stack, bottom first.
    pub fn stack(&self) -> Vec<Arc<Overlay>> {
        lock(&self.inner.state).stack.clone()
    }

    pub fn current_overlay(&self) -> Option<Arc<Overlay>> {
        lock(&self.inner.state).current.as_ref().map(Arc::clone)
    }

    pub fn navigation_state(&self) -> NavigationState {
        lock(&self.inner.state).nav.navigation_state()
    }

    /// Opens `target`, closing the current overlay first when the target
    /// asks for it.
    ///
    /// An unresolvable target is logged and leaves everything unchanged.
    pub fn open_overlay(&self, target: impl Into<OverlayTarget>) -> NavigationHandle {
        let target = match self.resolve(target.into()) {
            Ok(overlay) => overlay,
            Err(err) => {
                error!(controller = %self.inner.name, %err, "open_overlay rejected");
                return NavigationHandle::ready(NavOutcome::Rejected);
            }
        };

        self.start_if_visible();
        let (id, token) = self.begin_navigation(TransitionState::Opening);

        let closing = self.current_overlay().and_then(|current| {
            (current.id() != target.id() && current.is_opened() && target.close_previous_when_opened())
                .then(|| current.close(true))
        });
        debug!(
            controller = %self.inner.name,
            overlay = %target.kind(),
            closes_previous = closing.is_some(),
            "open_overlay"
        );

        let runtime = self.inner.runtime.clone();
        if self.inner.sequential {
            let weak = self.downgrade();
            let closed = closing.map(|closing| closing.spawn_on(&runtime));
            return self.spawn_navigation(id, token, async move {
                if let Some(closed) = closed {
                    closed.await;
                }
                let Some(controller) = weak.upgrade() else {
                    return;
                };
                controller.push_current(&target);
                drop(controller);
                target.open(true).spawn_on(&runtime).await;
            });
        }

        if let Some(closing) = closing {
            closing.detach_on(&runtime);
        }
        self.push_current(&target);
        let opened = target.open(true).spawn_on(&runtime);
        self.spawn_navigation(id, token, opened)
    }

    /// Closes the current overlay and reveals the one beneath it.
    ///
    /// No-op on an empty stack. When the stack empties, no overlay is current.
    pub fn go_back(&self, animate: bool) -> NavigationHandle {
        if lock(&self.inner.state).stack.is_empty() {
            return NavigationHandle::ready(NavOutcome::NoOp);
        }

        let (id, token) = self.begin_navigation(TransitionState::Closing);
        let (popped, revealed) = {
            let mut state = lock(&self.inner.state);
            let popped = state.stack.pop();
            let revealed = state.stack.last().map(Arc::clone);
            state.current = revealed.as_ref().map(Arc::clone);
            (popped, revealed)
        };
        let Some(popped) = popped else {
            self.finish_navigation(id);
            return NavigationHandle::ready(NavOutcome::NoOp);
        };
        debug!(
            controller = %self.inner.name,
            closed = %popped.kind(),
            revealed = revealed.as_ref().map(|o| o.kind().as_str()),
            "go_back"
        );

        let runtime = self.inner.runtime.clone();
        let closed = popped.close(animate).spawn_on(&runtime);
        if self.inner.sequential {
            return self.spawn_navigation(id, token, async move {
                closed.await;
                if let Some(revealed) = revealed {
                    revealed.open(true).spawn_on(&runtime).await;
                }
            });
        }

        let opened = revealed.map(|revealed| revealed.open(true).spawn_on(&runtime));
        self.spawn_navigation(id, token, async move {
            if let Some(opened) = opened {
                opened.await;
            }
        })
    }

    /// Closes `overlay` wherever it sits in the stack.
    pub fn close_overlay(&self, overlay: &Arc<Overlay>, animate: bool) -> NavigationHandle {
        let is_current = self
            .current_overlay()
            .is_some_and(|current| current.id() == overlay.id());
        if is_current {
            return self.go_back(animate);
        }

        {
            let mut state = lock(&self.inner.state);
            if let Some(position) = state.stack.iter().position(|o| o.id() == overlay.id()) {
                state.stack.remove(position);
                state.stack.dedup_by(|a, b| a.id() == b.id());
            }
        }
        overlay.close(animate).detach_on(&self.inner.runtime);
        NavigationHandle::ready(NavOutcome::Completed)
    }

    /// Makes `target` current without any transition. Seeds an empty stack.
    pub fn set_current_overlay(&self, target: impl Into<OverlayTarget>) -> NavResult<()> {
        let overlay = self.resolve(target.into())?;
        let mut state = lock(&self.inner.state);
        if state.stack.is_empty() {
            state.stack.push(Arc::clone(&overlay));
        }
        state.current = Some(overlay);
        Ok(())
    }

    /// Activates or deactivates the controller.
    ///
    /// A registered controller becoming active first deactivates whichever
    /// controller of its directory was active. The single active controller
    /// is only enforced among controllers sharing a [`ControllerDirectory`];
    /// unregistered controllers are activated independently.
    pub fn set_active(&self, active: bool) {
        let directory = {
            let state = lock(&self.inner.state);
            if state.active == active {
                return;
            }
            state.directory.clone()
        };

        if active {
            if let Some(previous) = directory.as_ref().and_then(|d| d.active_other_than(self)) {
                previous.set_active(false);
            }
            {
                let mut state = lock(&self.inner.state);
                state.active = true;
                state.accepts_input = true;
            }
            if let Some(directory) = &directory {
                directory.set_active_entry(self);
            }
            self.set_root_enabled(true);
            if let Some(transition) = &self.inner.transition {
                transition.play_forward(false);
            }
            if let Some(current) = self.current_overlay() {
                current.refresh_content();
            }
            info!(controller = %self.inner.name, "controller activated");
        } else {
            {
                let mut state = lock(&self.inner.state);
                state.active = false;
                state.accepts_input = false;
            }
            if let Some(directory) = &directory {
                directory.clear_active_if(self);
            }
            match &self.inner.transition {
                Some(transition) => transition.play_backward(false),
                None => self.set_root_enabled(false),
            }
            info!(controller = %self.inner.name, "controller deactivated");
        }
    }

    /// Per-frame tick: handles a back request, then advances transitions.
    pub fn update(&self, dt: Duration, back_requested: bool) {
        self.start_if_visible();
        if back_requested {
            self.handle_back();
        }
        if let Some(transition) = &self.inner.transition {
            transition.advance(dt);
        }
        for overlay in self.overlays() {
            overlay.advance(dt);
        }
    }

    /// First hosted overlay of `kind`, instantiated from the factory on a miss.
    pub fn get_overlay(&self, kind: &OverlayKind) -> Option<Arc<Overlay>> {
        let hosted = lock(&self.inner.state)
            .overlays
            .iter()
            .find(|overlay| overlay.kind() == kind)
            .map(Arc::clone);
        if hosted.is_some() {
            return hosted;
        }

        let template = self.inner.factory.as_ref().and_then(|factory| factory.template(kind));
        let Some(template) = template else {
            let err = NavError::MissingTemplate(kind.clone());
            warn!(controller = %self.inner.name, %err, "overlay lookup failed");
            return None;
        };
        self.add_overlay(&template)
    }

    pub fn get_overlays(&self, kind: &OverlayKind) -> Vec<Arc<Overlay>> {
        lock(&self.inner.state)
            .overlays
            .iter()
            .filter(|overlay| overlay.kind() == kind)
            .map(Arc::clone)
            .collect()
    }

    /// Instantiates `template` and hosts the new overlay.
    pub fn add_overlay(&self, template: &OverlayTemplate) -> Option<Arc<Overlay>> {
        let overlay = template();
        if !overlay.attach(self.downgrade()) {
            warn!(
                controller = %self.inner.name,
                overlay = %overlay.kind(),
                "template returned an overlay owned by another controller"
            );
            return None;
        }

        let root_enabled = {
            let mut state = lock(&self.inner.state);
            state.overlays.push(Arc::clone(&overlay));
            state.root_enabled
        };
        if !root_enabled {
            overlay.set_enabled(false);
        }
        debug!(controller = %self.inner.name, overlay = %overlay.kind(), "overlay added");
        Some(overlay)
    }

    pub(crate) fn attach_directory(&self, directory: ControllerDirectory) {
        lock(&self.inner.state).directory = Some(directory);
    }

    pub(crate) fn detach_directory(&self, directory: &ControllerDirectory) {
        let mut state = lock(&self.inner.state);
        if state.directory.as_ref().is_some_and(|d| d.ptr_eq(directory)) {
            state.directory = None;
        }
    }

    fn resolve(&self, target: OverlayTarget) -> NavResult<Arc<Overlay>> {
        let found = match &target {
            OverlayTarget::Overlay(overlay) => {
                let state = lock(&self.inner.state);
                state
                    .overlays
                    .iter()
                    .any(|hosted| hosted.id() == overlay.id())
                    .then(|| Arc::clone(overlay))
            }
            OverlayTarget::Index(index) => {
                let state = lock(&self.inner.state);
                state.overlays.get(*index).map(Arc::clone)
            }
            OverlayTarget::Kind(kind) => self.get_overlay(kind),
        };
        found.ok_or_else(|| NavError::InvalidTarget {
            controller: self.inner.name.clone(),
            target: target.to_string(),
        })
    }

    /// Shows the default overlay the first time the root is visible.
    fn start_if_visible(&self) {
        let default = {
            let mut state = lock(&self.inner.state);
            if state.started || !state.root_enabled {
                return;
            }
            state.started = true;
            state.overlays.iter().find(|overlay| overlay.is_default()).map(Arc::clone)
        };
        let Some(overlay) = default else {
            return;
        };

        {
            let mut state = lock(&self.inner.state);
            if state.stack.is_empty() {
                state.stack.push(Arc::clone(&overlay));
            }
            state.current = Some(Arc::clone(&overlay));
        }
        overlay.activate_as_default();
        debug!(controller = %self.inner.name, overlay = %overlay.kind(), "default overlay shown");
    }

    fn begin_navigation(&self, kind: TransitionState) -> (NavTaskId, CancellationToken) {
        let mut state = lock(&self.inner.state);
        if let Some(previous) = state.nav.cancel() {
            debug!(controller = %self.inner.name, task = previous.0, "navigation superseded");
        }
        let id = state.seq.next_id();
        let token = CancellationToken::new();
        state.nav.on_started(id, token.clone(), kind);
        (id, token)
    }

    fn spawn_navigation<F>(&self, id: NavTaskId, token: CancellationToken, work: F) -> NavigationHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let weak = self.downgrade();
        let cancelled = token.clone();
        let task = self.inner.runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = cancelled.cancelled() => NavOutcome::Cancelled,
                () = work => NavOutcome::Completed,
            };
            if let Some(controller) = weak.upgrade() {
                controller.finish_navigation(id);
            }
            outcome
        });
        NavigationHandle::spawned(id, token, task)
    }

    fn finish_navigation(&self, id: NavTaskId) {
        lock(&self.inner.state).nav.finish_if_active(id);
    }

    fn push_current(&self, overlay: &Arc<Overlay>) {
        let mut state = lock(&self.inner.state);
        let already_current = state.current.as_ref().is_some_and(|current| current.id() == overlay.id());
        if !already_current || state.stack.is_empty() {
            state.stack.push(Arc::clone(overlay));
        }
        state.current = Some(Arc::clone(overlay));
    }

    fn set_root_enabled(&self, enabled: bool) {
        let overlays = {
            let mut state = lock(&self.inner.state);
            if state.root_enabled == enabled {
                return;
            }
            state.root_enabled = enabled;
            state.overlays.clone()
        };
        debug!(controller = %self.inner.name, enabled, "root visibility changed");
        for overlay in &overlays {
            overlay.set_enabled(enabled);
        }
        if enabled {
            self.start_if_visible();
        }
    }

    fn handle_back(&self) -> bool {
        let top = {
            let state = lock(&self.inner.state);
            if !state.active {
                return false;
            }
            state.stack.last().map(Arc::clone)
        };
        let Some(top) = top else {
            return false;
        };
        if !top.is_interactable() {
            debug!(controller = %self.inner.name, overlay = %top.kind(), "back ignored: overlay not interactable");
            return false;
        }
        top.on_back();
        true
    }
}

impl PartialEq for MenuController {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for MenuController {}

pub struct MenuControllerBuilder {
    name: String,
    active: bool,
    sequential: bool,
    transition: Option<Arc<dyn Transition>>,
    overlays: Vec<Arc<Overlay>>,
    effects: Option<Arc<dyn EffectPlayer>>,
    factory: Option<Arc<dyn OverlayFactory>>,
}

impl MenuControllerBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            active: false,
            sequential: false,
            transition: None,
            overlays: Vec::new(),
            effects: None,
            factory: None,
        }
    }

    /// Starts the controller active. Registering it in a directory then
    /// makes it that directory's active controller.
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Wait for the previous overlay to finish closing before opening the next.
    #[must_use]
    pub fn sequential_transitions(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    #[must_use]
    pub fn transition(mut self, transition: Arc<dyn Transition>) -> Self {
        self.transition = Some(transition);
        self
    }

    #[must_use]
    pub fn overlay(mut self, overlay: Arc<Overlay>) -> Self {
        self.overlays.push(overlay);
        self
    }

    #[must_use]
    pub fn overlays(mut self, overlays: impl IntoIterator<Item = Arc<Overlay>>) -> Self {
        self.overlays.extend(overlays);
        self
    }

    #[must_use]
    pub fn effects(mut self, effects: Arc<dyn EffectPlayer>) -> Self {
        self.effects = Some(effects);
        self
    }

    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn OverlayFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Builds the controller on the current tokio runtime.
    pub fn build(self) -> NavResult<MenuController> {
        let runtime = Handle::try_current()
            .ok()
            .ok_or_else(|| NavError::NoRuntime(self.name.clone()))?;

        let mut defaults = self.overlays.iter().filter(|overlay| overlay.is_default());
        if let (Some(first), Some(second)) = (defaults.next(), defaults.next()) {
            return Err(NavError::DuplicateDefault {
                controller: self.name,
                first: first.kind().clone(),
                second: second.kind().clone(),
            });
        }
        if let Some(owned) = self.overlays.iter().find(|overlay| overlay.is_attached()) {
            return Err(NavError::InvalidTarget {
                controller: self.name,
                target: format!("overlay '{}' is owned by another controller", owned.kind()),
            });
        }

        let active = self.active;
        let controller = MenuController {
            inner: Arc::new(ControllerInner {
                name: self.name,
                sequential: self.sequential,
                transition: self.transition,
                effects: self.effects.unwrap_or_else(|| Arc::new(NoEffects)),
                factory: self.factory,
                runtime,
                state: Mutex::new(ControllerState {
                    active,
                    accepts_input: active,
                    root_enabled: active,
                    started: false,
                    overlays: self.overlays.clone(),
                    stack: Vec::new(),
                    current: None,
                    nav: NavTaskState::default(),
                    seq: NavTaskSeq::default(),
                    directory: None,
                }),
            }),
        };

        for overlay in &self.overlays {
            overlay.attach(controller.downgrade());
            if !active {
                overlay.set_enabled(false);
            }
        }

        if let Some(transition) = &controller.inner.transition {
            transition.set_progress(if active { 1.0 } else { 0.0 }, PlaybackDirection::Forward);
            let weak = controller.downgrade();
            transition.add_progress_listener(Arc::new(move |progress, direction| {
                if direction == PlaybackDirection::Backward
                    && progress == 0.0
                    && let Some(controller) = weak.upgrade()
                {
                    controller.set_root_enabled(false);
                }
            }));
        }

        controller.start_if_visible();
        debug!(controller = %controller.inner.name, active, overlays = self.overlays.len(), "controller built");
        Ok(controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::UiRepository;
    use crate::transition::Tween;

    const FRAME: Duration = Duration::from_millis(125);

    #[derive(Default)]
    struct RecordedEffects(Mutex<Vec<String>>);

    impl EffectPlayer for RecordedEffects {
        fn play_effect(&self, name: &str, _volume: f32) {
            self.0.lock().unwrap().push(name.to_string());
        }
    }

    fn tween() -> Arc<dyn Transition> {
        Arc::new(Tween::new(Duration::from_millis(250)))
    }

    fn overlay(kind: &'static str) -> Arc<Overlay> {
        Overlay::builder(kind).transition(tween()).build()
    }

    fn default_overlay(kind: &'static str) -> Arc<Overlay> {
        Overlay::builder(kind).transition(tween()).default_overlay(true).build()
    }

    fn kinds(controller: &MenuController) -> Vec<String> {
        controller.stack().iter().map(|o| o.kind().to_string()).collect()
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    async fn frames(controller: &MenuController, count: usize) {
        for _ in 0..count {
            controller.update(FRAME, false);
            settle().await;
        }
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = MenuController::builder("main").build();
        assert_eq!(result.unwrap_err(), NavError::NoRuntime("main".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_default_is_rejected() {
        let result = MenuController::builder("main")
            .overlay(default_overlay("a"))
            .overlay(default_overlay("b"))
            .build();
        assert!(matches!(result, Err(NavError::DuplicateDefault { .. })));
    }

    #[tokio::test]
    async fn test_default_overlay_is_shown_on_start() {
        let home = default_overlay("home");
        let controller = MenuController::builder("main")
            .active(true)
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();

        assert!(controller.is_started());
        assert_eq!(kinds(&controller), ["home"]);
        assert!(home.is_interactable());
        assert!(home.is_current());
    }

    #[tokio::test]
    async fn test_open_closes_previous_and_pushes() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings)])
            .build()
            .unwrap();

        let handle = controller.open_overlay(&settings);
        assert_eq!(kinds(&controller), ["home", "settings"]);
        assert_eq!(controller.current_overlay().unwrap().id(), settings.id());
        assert_eq!(home.transition_state(), TransitionState::Closing);
        assert!(!home.is_interactable());
        assert_eq!(
            controller.navigation_state(),
            NavigationState::Transitioning(TransitionState::Opening)
        );

        frames(&controller, 2).await;
        assert_eq!(handle.outcome().await, NavOutcome::Completed);
        assert!(!home.is_opened());
        assert_eq!(home.transition_state(), TransitionState::None);
        assert!(settings.is_interactable());
        assert_eq!(controller.navigation_state(), NavigationState::Idle);
    }

    #[tokio::test]
    async fn test_settings_confirm_round_trip() {
        let settings = overlay("settings");
        let confirm = overlay("confirm");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&settings), Arc::clone(&confirm)])
            .build()
            .unwrap();
        assert!(controller.stack().is_empty());

        controller.open_overlay(&settings);
        frames(&controller, 2).await;
        assert_eq!(kinds(&controller), ["settings"]);
        assert!(settings.is_opened());

        controller.open_overlay(&confirm);
        frames(&controller, 2).await;
        assert_eq!(kinds(&controller), ["settings", "confirm"]);
        assert!(!settings.is_opened());
        assert_eq!(controller.current_overlay().unwrap().id(), confirm.id());

        controller.go_back(true);
        frames(&controller, 2).await;
        assert_eq!(kinds(&controller), ["settings"]);
        assert!(settings.is_interactable());
        assert!(!confirm.is_opened());
    }

    #[tokio::test]
    async fn test_open_on_top_keeps_previous_open() {
        let home = default_overlay("home");
        let toast = Overlay::builder("toast")
            .transition(tween())
            .close_previous_when_opened(false)
            .build();
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&toast)])
            .build()
            .unwrap();

        controller.open_overlay(&toast);
        frames(&controller, 2).await;
        assert!(home.is_opened());
        assert!(toast.is_opened());
        assert_eq!(kinds(&controller), ["home", "toast"]);
    }

    #[tokio::test]
    async fn test_reopening_current_does_not_push() {
        let home = default_overlay("home");
        let controller = MenuController::builder("main")
            .active(true)
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();

        controller.open_overlay(&home);
        frames(&controller, 2).await;
        assert_eq!(kinds(&controller), ["home"]);
        assert!(home.is_interactable());
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected() {
        let home = default_overlay("home");
        let controller = MenuController::builder("main")
            .active(true)
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();

        let handle = controller.open_overlay(7_usize);
        assert_eq!(handle.outcome().await, NavOutcome::Rejected);
        let stranger = overlay("stranger");
        let handle = controller.open_overlay(&stranger);
        assert_eq!(handle.outcome().await, NavOutcome::Rejected);
        assert_eq!(kinds(&controller), ["home"]);
        assert!(home.is_opened());
    }

    #[tokio::test]
    async fn test_sequential_open_waits_for_close() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let controller = MenuController::builder("main")
            .active(true)
            .sequential_transitions(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings)])
            .build()
            .unwrap();

        controller.open_overlay(&settings);
        settle().await;
        assert!(!settings.is_opened());
        assert_eq!(kinds(&controller), ["home"]);

        frames(&controller, 2).await;
        assert_eq!(home.transition_state(), TransitionState::None);
        assert_eq!(settings.transition_state(), TransitionState::Opening);
        assert_eq!(kinds(&controller), ["home", "settings"]);

        frames(&controller, 2).await;
        assert!(settings.is_interactable());
        assert_eq!(controller.navigation_state(), NavigationState::Idle);
    }

    #[tokio::test]
    async fn test_newer_open_cancels_older() {
        let home = default_overlay("home");
        let first = overlay("first");
        let second = overlay("second");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&first), Arc::clone(&second)])
            .build()
            .unwrap();

        let superseded = controller.open_overlay(&first);
        let latest = controller.open_overlay(&second);
        assert_eq!(kinds(&controller), ["home", "first", "second"]);

        frames(&controller, 2).await;
        assert_eq!(superseded.outcome().await, NavOutcome::Cancelled);
        assert_eq!(latest.outcome().await, NavOutcome::Completed);

        assert!(!first.is_opened());
        assert!(!first.is_interactable());
        assert_eq!(first.transition_state(), TransitionState::None);
        assert!(second.is_interactable());
        assert_eq!(controller.current_overlay().unwrap().id(), second.id());
    }

    fn stacked_overlay(kind: &'static str) -> Arc<Overlay> {
        Overlay::builder(kind)
            .transition(tween())
            .close_previous_when_opened(false)
            .build()
    }

    #[tokio::test]
    async fn test_superseded_open_still_settles_overlay() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let toast = stacked_overlay("toast");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings), Arc::clone(&toast)])
            .build()
            .unwrap();

        let superseded = controller.open_overlay(&settings);
        controller.open_overlay(&toast);

        frames(&controller, 2).await;
        assert_eq!(superseded.outcome().await, NavOutcome::Cancelled);
        assert_eq!(kinds(&controller), ["home", "settings", "toast"]);
        assert!(settings.is_opened());
        assert_eq!(settings.transition_state(), TransitionState::None);
        assert!(settings.is_interactable());
        assert!(settings.blocks_raycasts());
        assert!(toast.is_interactable());
    }

    #[tokio::test]
    async fn test_open_superseding_reveal_keeps_back_working() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let toast = stacked_overlay("toast");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings), Arc::clone(&toast)])
            .build()
            .unwrap();

        controller.open_overlay(&settings);
        frames(&controller, 3).await;

        controller.go_back(true);
        controller.open_overlay(&toast);
        frames(&controller, 6).await;
        assert_eq!(kinds(&controller), ["home", "toast"]);

        controller.go_back(true);
        frames(&controller, 6).await;
        assert_eq!(kinds(&controller), ["home"]);
        assert!(home.is_opened());
        assert_eq!(home.transition_state(), TransitionState::None);
        assert!(home.is_interactable());

        controller.update(FRAME, true);
        settle().await;
        assert!(kinds(&controller).is_empty());
    }

    #[tokio::test]
    async fn test_sequential_superseded_open_still_settles_overlay() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let toast = stacked_overlay("toast");
        let controller = MenuController::builder("main")
            .active(true)
            .sequential_transitions(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings), Arc::clone(&toast)])
            .build()
            .unwrap();

        let superseded = controller.open_overlay(&settings);
        frames(&controller, 2).await;
        assert_eq!(settings.transition_state(), TransitionState::Opening);

        controller.open_overlay(&toast);
        frames(&controller, 3).await;
        assert_eq!(superseded.outcome().await, NavOutcome::Cancelled);
        assert_eq!(kinds(&controller), ["home", "settings", "toast"]);
        assert!(settings.is_opened());
        assert_eq!(settings.transition_state(), TransitionState::None);
        assert!(settings.is_interactable());
        assert!(toast.is_interactable());
        assert_eq!(controller.navigation_state(), NavigationState::Idle);
    }

    #[tokio::test]
    async fn test_go_back_reveals_previous() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings)])
            .build()
            .unwrap();

        controller.open_overlay(&settings);
        frames(&controller, 2).await;

        let handle = controller.go_back(true);
        assert_eq!(kinds(&controller), ["home"]);
        assert_eq!(controller.current_overlay().unwrap().id(), home.id());
        assert!(!settings.is_interactable());

        frames(&controller, 2).await;
        assert_eq!(handle.outcome().await, NavOutcome::Completed);
        assert!(home.is_interactable());
        assert!(!settings.is_opened());
    }

    #[tokio::test]
    async fn test_go_back_to_empty_stack() {
        let home = default_overlay("home");
        let controller = MenuController::builder("main")
            .active(true)
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();

        controller.go_back(false);
        assert!(controller.stack().is_empty());
        assert!(controller.current_overlay().is_none());
        assert!(!home.is_opened());

        let handle = controller.go_back(true);
        assert_eq!(handle.outcome().await, NavOutcome::NoOp);
    }

    #[tokio::test]
    async fn test_back_input_requires_interactable_top() {
        let effects = Arc::new(RecordedEffects::default());
        let home = default_overlay("home");
        let settings = overlay("settings");
        let controller = MenuController::builder("main")
            .active(true)
            .effects(Arc::clone(&effects) as Arc<dyn EffectPlayer>)
            .overlays([Arc::clone(&home), Arc::clone(&settings)])
            .build()
            .unwrap();

        controller.open_overlay(&settings);
        controller.update(FRAME, true);
        settle().await;
        assert_eq!(kinds(&controller), ["home", "settings"]);

        frames(&controller, 1).await;
        assert!(settings.is_interactable());

        controller.update(FRAME, true);
        assert_eq!(kinds(&controller), ["home"]);
        assert_eq!(*effects.0.lock().unwrap(), ["menu-back"]);
    }

    #[tokio::test]
    async fn test_inactive_controller_ignores_back() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings)])
            .build()
            .unwrap();
        controller.open_overlay(&settings);
        frames(&controller, 2).await;

        controller.set_active(false);
        assert!(!controller.accepts_input());
        controller.update(FRAME, true);
        assert_eq!(kinds(&controller), ["home", "settings"]);
    }

    #[tokio::test]
    async fn test_deactivation_hides_root_after_transition() {
        let home = default_overlay("home");
        let controller = MenuController::builder("main")
            .active(true)
            .transition(tween())
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();

        controller.set_active(false);
        frames(&controller, 1).await;
        assert!(controller.is_root_enabled());

        frames(&controller, 1).await;
        assert!(!controller.is_root_enabled());
        assert!(!home.is_enabled());

        controller.set_active(true);
        assert!(controller.is_root_enabled());
        assert!(home.is_enabled());
        assert!(controller.accepts_input());
    }

    #[tokio::test]
    async fn test_hiding_root_mid_open_snaps_overlay() {
        let home = default_overlay("home");
        let settings = overlay("settings");
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&home), Arc::clone(&settings)])
            .build()
            .unwrap();

        let handle = controller.open_overlay(&settings);
        controller.set_active(false);
        assert!(!controller.is_root_enabled());

        let status = settings.status();
        assert_eq!(status.transition, TransitionState::None);
        assert!(status.interactable);
        assert!(status.blocks_raycasts);
        let status = home.status();
        assert_eq!(status.transition, TransitionState::None);
        assert!(!status.interactable);

        settle().await;
        assert_eq!(handle.outcome().await, NavOutcome::Completed);
        assert_eq!(settings.transition_state(), TransitionState::None);
    }

    #[tokio::test]
    async fn test_inactive_controller_starts_when_shown() {
        let home = default_overlay("home");
        let controller = MenuController::builder("pause")
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();
        assert!(!controller.is_started());
        assert!(!home.is_enabled());

        controller.set_active(true);
        assert!(controller.is_started());
        assert!(home.is_interactable());
        assert_eq!(kinds(&controller), ["home"]);
    }

    #[tokio::test]
    async fn test_kind_target_instantiates_from_factory() {
        let repository = UiRepository::new().with_template("prompt", || {
            Overlay::builder("prompt").transition(tween()).build()
        });
        let home = default_overlay("home");
        let controller = MenuController::builder("main")
            .active(true)
            .factory(Arc::new(repository))
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();

        let prompt = OverlayKind::from_static("prompt");
        controller.open_overlay(prompt.clone());
        frames(&controller, 2).await;
        assert_eq!(kinds(&controller), ["home", "prompt"]);
        assert!(controller.get_overlay(&prompt).is_some());
        assert_eq!(controller.get_overlays(&prompt).len(), 1);

        let missing = OverlayKind::from_static("missing");
        assert!(controller.get_overlay(&missing).is_none());
    }

    #[tokio::test]
    async fn test_close_overlay_below_top_keeps_stack_consistent() {
        let a = default_overlay("a");
        let b = Overlay::builder("b").transition(tween()).close_previous_when_opened(false).build();
        let controller = MenuController::builder("main")
            .active(true)
            .overlays([Arc::clone(&a), Arc::clone(&b)])
            .build()
            .unwrap();

        controller.open_overlay(&b);
        frames(&controller, 2).await;
        controller.open_overlay(&a);
        frames(&controller, 2).await;
        assert_eq!(kinds(&controller), ["a", "b", "a"]);

        controller.close_overlay(&b, false);
        assert_eq!(kinds(&controller), ["a"]);
        assert!(!b.is_opened());
        assert_eq!(controller.current_overlay().unwrap().id(), a.id());
    }

    #[tokio::test]
    async fn test_set_current_overlay_seeds_empty_stack() {
        let home = overlay("home");
        let controller = MenuController::builder("main")
            .active(true)
            .overlay(Arc::clone(&home))
            .build()
            .unwrap();
        assert!(controller.stack().is_empty());

        controller.set_current_overlay(0_usize).unwrap();
        assert_eq!(kinds(&controller), ["home"]);
        assert!(controller.set_current_overlay(3_usize).is_err());
    }
}
