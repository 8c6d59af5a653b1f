//! Name-based controller lookup.
//!
//! The directory holds weak references only: it never keeps a controller
//! alive. Registering hands back a [`Registration`] guard; dropping the
//! guard removes the entry, but only while the entry still points at the
//! controller that registered it.
//!
//! The directory also records which registered controller is active, so
//! activating one controller deactivates the previous one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::controller::{MenuController, WeakController};
use crate::sync::lock;

#[derive(Default)]
struct DirectoryState {
    controllers: HashMap<String, WeakController>,
    active: Option<WeakController>,
}

#[derive(Clone, Default)]
pub struct ControllerDirectory {
    inner: Arc<Mutex<DirectoryState>>,
}

impl fmt::Debug for ControllerDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDirectory")
            .field("names", &self.names())
            .field("active", &self.active().map(|c| c.name().to_string()))
            .finish()
    }
}

impl ControllerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `controller` under its name, replacing any previous entry.
    pub fn register(&self, controller: &MenuController) -> Registration {
        let name = controller.name().to_string();
        let replaced = lock(&self.inner).controllers.insert(name.clone(), controller.downgrade());
        if let Some(previous) = replaced.and_then(|weak| weak.upgrade())
            && !previous.ptr_eq(controller)
        {
            warn!(controller = %name, "replacing registered controller with the same name");
        }

        controller.attach_directory(self.clone());
        if controller.is_active() {
            if let Some(previous) = self.active_other_than(controller) {
                previous.set_active(false);
            }
            self.set_active_entry(controller);
        }
        debug!(controller = %name, "controller registered");

        Registration {
            directory: Arc::downgrade(&self.inner),
            name,
            controller: controller.downgrade(),
        }
    }

    /// Removes `name` if it still refers to `controller`.
    pub fn unregister(&self, name: &str, controller: &MenuController) -> bool {
        let removed = self.remove_if(name, &controller.downgrade());
        if removed {
            controller.detach_directory(self);
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Option<MenuController> {
        lock(&self.inner).controllers.get(name).and_then(WeakController::upgrade)
    }

    /// Activates or deactivates the controller registered as `name`.
    ///
    /// Returns `false` when no live controller has that name.
    pub fn set_controller_active(&self, name: &str, active: bool) -> bool {
        let Some(controller) = self.lookup(name) else {
            warn!(controller = name, "no controller registered under this name");
            return false;
        };
        controller.set_active(active);
        true
    }

    pub fn activate(&self, name: &str) -> bool {
        self.set_controller_active(name, true)
    }

    pub fn active(&self) -> Option<MenuController> {
        lock(&self.inner).active.as_ref().and_then(WeakController::upgrade)
    }

    /// Registered names, sorted. Includes entries whose controller is gone.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner).controllers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ticks every live controller in name order.
    pub fn update_all(&self, dt: Duration, back_requested: bool) {
        let mut controllers: Vec<(String, MenuController)> = lock(&self.inner)
            .controllers
            .iter()
            .filter_map(|(name, weak)| weak.upgrade().map(|c| (name.clone(), c)))
            .collect();
        controllers.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, controller) in controllers {
            controller.update(dt, back_requested);
        }
    }

    pub(crate) fn ptr_eq(&self, other: &ControllerDirectory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn active_other_than(&self, controller: &MenuController) -> Option<MenuController> {
        self.active().filter(|active| !active.ptr_eq(controller))
    }

    pub(crate) fn set_active_entry(&self, controller: &MenuController) {
        lock(&self.inner).active = Some(controller.downgrade());
    }

    pub(crate) fn clear_active_if(&self, controller: &MenuController) {
        let mut state = lock(&self.inner);
        let weak = controller.downgrade();
        if state.active.as_ref().is_some_and(|active| active.ptr_eq(&weak)) {
            state.active = None;
        }
    }

    fn remove_if(&self, name: &str, controller: &WeakController) -> bool {
        let mut state = lock(&self.inner);
        let matches = state.controllers.get(name).is_some_and(|entry| entry.ptr_eq(controller));
        if !matches {
            return false;
        }
        state.controllers.remove(name);
        if state.active.as_ref().is_some_and(|active| active.ptr_eq(controller)) {
            state.active = None;
        }
        debug!(controller = name, "controller unregistered");
        true
    }
}

/// Keeps a controller registered until dropped.
pub struct Registration {
    directory: Weak<Mutex<DirectoryState>>,
    name: String,
    controller: WeakController,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(inner) = self.directory.upgrade() else {
            return;
        };
        let directory = ControllerDirectory { inner };
        if directory.remove_if(&self.name, &self.controller)
            && let Some(controller) = self.controller.upgrade()
        {
            controller.detach_directory(&directory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Overlay;
    use crate::transition::{Transition, Tween};

    fn controller(name: &str, active: bool) -> MenuController {
        MenuController::builder(name)
            .active(active)
            .overlay(Overlay::builder("home").default_overlay(true).build())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let directory = ControllerDirectory::new();
        let main = controller("main", true);
        let _registration = directory.register(&main);

        assert!(directory.lookup("main").unwrap().ptr_eq(&main));
        assert!(directory.lookup("pause").is_none());
        assert!(directory.active().unwrap().ptr_eq(&main));
    }

    #[tokio::test]
    async fn test_register_overwrites_and_stale_drop_keeps_newer() {
        let directory = ControllerDirectory::new();
        let first = controller("main", false);
        let second = controller("main", false);

        let first_registration = directory.register(&first);
        let _second_registration = directory.register(&second);
        assert!(directory.lookup("main").unwrap().ptr_eq(&second));

        drop(first_registration);
        assert!(directory.lookup("main").unwrap().ptr_eq(&second));
        assert!(!directory.unregister("main", &first));
        assert!(directory.unregister("main", &second));
        assert!(directory.lookup("main").is_none());
    }

    #[tokio::test]
    async fn test_dropping_registration_unregisters() {
        let directory = ControllerDirectory::new();
        let main = controller("main", true);
        let registration = directory.register(&main);
        drop(registration);

        assert!(directory.lookup("main").is_none());
        assert!(directory.active().is_none());
    }

    #[tokio::test]
    async fn test_directory_does_not_keep_controllers_alive() {
        let directory = ControllerDirectory::new();
        let main = controller("main", false);
        let _registration = directory.register(&main);
        drop(main);

        assert!(directory.lookup("main").is_none());
        assert_eq!(directory.names(), ["main"]);
    }

    #[tokio::test]
    async fn test_activating_one_deactivates_the_other() {
        let directory = ControllerDirectory::new();
        let main = controller("main", true);
        let pause = controller("pause", false);
        let _main_registration = directory.register(&main);
        let _pause_registration = directory.register(&pause);

        assert!(directory.activate("pause"));
        assert!(pause.is_active());
        assert!(!main.is_active());
        assert!(!main.accepts_input());
        assert!(directory.active().unwrap().ptr_eq(&pause));

        assert!(directory.set_controller_active("main", true));
        assert!(main.is_active());
        assert!(!pause.is_active());
        assert!(!directory.activate("missing"));
    }

    #[tokio::test]
    async fn test_registering_active_controller_takes_over() {
        let directory = ControllerDirectory::new();
        let main = controller("main", true);
        let pause = controller("pause", true);
        assert!(main.is_active() && pause.is_active());

        let _main_registration = directory.register(&main);
        let _pause_registration = directory.register(&pause);

        assert!(!main.is_active());
        assert!(pause.is_active());
    }

    #[tokio::test]
    async fn test_deactivating_active_clears_entry() {
        let directory = ControllerDirectory::new();
        let main = controller("main", true);
        let _registration = directory.register(&main);

        directory.set_controller_active("main", false);
        assert!(directory.active().is_none());
    }

    #[tokio::test]
    async fn test_update_all_ticks_controller_transitions() {
        let directory = ControllerDirectory::new();
        let tween = Arc::new(Tween::new(Duration::from_millis(250)));
        let main = MenuController::builder("main")
            .transition(Arc::clone(&tween) as Arc<dyn Transition>)
            .build()
            .unwrap();
        let _registration = directory.register(&main);

        directory.activate("main");
        directory.update_all(Duration::from_millis(250), false);
        assert!((tween.progress() - 1.0).abs() < f32::EPSILON);
    }
}
