use super::{Overlay, stable_kind};

stable_kind!(
    /// Stable identifier for a kind of widget (label, toggle, slider...).
    WidgetKind
);

/// A content element drawn inside an overlay.
///
/// Widgets hold no reference to their overlay; the owning overlay is
/// passed in whenever content is refreshed.
pub trait Widget: Send + Sync {
    fn kind(&self) -> WidgetKind;

    /// Pulls current state into the widget.
    fn update_widget(&self, overlay: &Overlay);
}
