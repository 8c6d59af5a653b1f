use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::overlay::{Overlay, OverlayKind};

/// Builds a fresh overlay instance.
pub type OverlayTemplate = Arc<dyn Fn() -> Arc<Overlay> + Send + Sync>;

/// Supplies overlay templates for kinds a controller does not host yet.
pub trait OverlayFactory: Send + Sync {
    fn template(&self, kind: &OverlayKind) -> Option<OverlayTemplate>;
}

/// Map-backed [`OverlayFactory`].
#[derive(Clone, Default)]
pub struct UiRepository {
    templates: HashMap<OverlayKind, OverlayTemplate>,
}

impl fmt::Debug for UiRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiRepository")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl UiRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `template` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<OverlayKind>, template: impl Fn() -> Arc<Overlay> + Send + Sync + 'static) {
        self.templates.insert(kind.into(), Arc::new(template));
    }

    #[must_use]
    pub fn with_template(
        mut self,
        kind: impl Into<OverlayKind>,
        template: impl Fn() -> Arc<Overlay> + Send + Sync + 'static,
    ) -> Self {
        self.register(kind, template);
        self
    }

    pub fn contains(&self, kind: &OverlayKind) -> bool {
        self.templates.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&OverlayKind> {
        let mut kinds: Vec<_> = self.templates.keys().collect();
        kinds.sort();
        kinds
    }
}

impl OverlayFactory for UiRepository {
    fn template(&self, kind: &OverlayKind) -> Option<OverlayTemplate> {
        self.templates.get(kind).map(Arc::clone)
    }
}
