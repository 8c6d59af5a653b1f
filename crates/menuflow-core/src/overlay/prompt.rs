//! Confirmation prompt behavior.
//!
//! A prompt shows a title, a description and up to two buttons. Without
//! a callback a button simply closes the prompt. With a callback the
//! prompt stays open unless the caller armed auto-close for that button
//! beforehand; arming lasts for a single press.

use std::sync::{Arc, Mutex};

use super::{Overlay, OverlayBehavior};
use crate::sync::lock;

pub const DEFAULT_CLICK_EFFECT: &str = "menu-click";
pub const DEFAULT_CLICK_VOLUME: f32 = 0.4;

pub type PromptCallback = Arc<dyn Fn() + Send + Sync>;

/// Content and callbacks a prompt is opened with.
#[derive(Default, Clone)]
pub struct PromptData {
    pub title: String,
    pub description: String,
    pub accept_text: String,
    pub reject_text: String,
    pub on_accept: Option<PromptCallback>,
    pub on_reject: Option<PromptCallback>,
}

impl PromptData {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn accept(mut self, text: impl Into<String>) -> Self {
        self.accept_text = text.into();
        self
    }

    #[must_use]
    pub fn reject(mut self, text: impl Into<String>) -> Self {
        self.reject_text = text.into();
        self
    }

    #[must_use]
    pub fn on_accept(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_accept = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_reject(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reject = Some(Arc::new(callback));
        self
    }
}

/// What the prompt currently displays. `None` hides the element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptView {
    pub title: String,
    pub description: Option<String>,
    pub accept_label: Option<String>,
    pub reject_label: Option<String>,
}

#[derive(Default)]
struct PromptState {
    view: PromptView,
    on_accept: Option<PromptCallback>,
    on_reject: Option<PromptCallback>,
    close_on_accept: bool,
    close_on_reject: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Accept,
    Reject,
}

pub struct Prompt {
    click_effect: String,
    click_volume: f32,
    state: Mutex<PromptState>,
}

impl Default for Prompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt {
    pub fn new() -> Self {
        Self::with_click_effect(DEFAULT_CLICK_EFFECT, DEFAULT_CLICK_VOLUME)
    }

    pub fn with_click_effect(name: impl Into<String>, volume: f32) -> Self {
        Self {
            click_effect: name.into(),
            click_volume: volume,
            state: Mutex::new(PromptState::default()),
        }
    }

    pub fn set_prompt_data(&self, data: PromptData) {
        let mut state = lock(&self.state);
        state.view = PromptView {
            title: data.title,
            description: non_empty(data.description),
            accept_label: non_empty(data.accept_text),
            reject_label: non_empty(data.reject_text),
        };
        state.on_accept = data.on_accept;
        state.on_reject = data.on_reject;
    }

    pub fn set_button_events(&self, on_accept: Option<PromptCallback>, on_reject: Option<PromptCallback>) {
        let mut state = lock(&self.state);
        state.on_accept = on_accept;
        state.on_reject = on_reject;
    }

    /// Closes the prompt after the next accept, even with a callback set.
    pub fn close_on_accept(&self) {
        lock(&self.state).close_on_accept = true;
    }

    /// Closes the prompt after the next reject, even with a callback set.
    pub fn close_on_reject(&self) {
        lock(&self.state).close_on_reject = true;
    }

    pub fn view(&self) -> PromptView {
        lock(&self.state).view.clone()
    }

    pub fn accept(&self, overlay: &Arc<Overlay>) {
        self.resolve(overlay, Choice::Accept);
    }

    pub fn reject(&self, overlay: &Arc<Overlay>) {
        self.resolve(overlay, Choice::Reject);
    }

    fn resolve(&self, overlay: &Arc<Overlay>, choice: Choice) {
        overlay.play_effect(&self.click_effect, self.click_volume);

        let (callback, close_armed) = {
            let mut state = lock(&self.state);
            match choice {
                Choice::Accept => (state.on_accept.clone(), std::mem::take(&mut state.close_on_accept)),
                Choice::Reject => (state.on_reject.clone(), std::mem::take(&mut state.close_on_reject)),
            }
        };

        match callback {
            None => overlay.close_self(true),
            Some(callback) => {
                callback();
                if close_armed {
                    overlay.close_self(true);
                }
            }
        }
    }
}

impl OverlayBehavior for Prompt {
    fn on_back(&self, overlay: &Arc<Overlay>) {
        self.reject(overlay);
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
