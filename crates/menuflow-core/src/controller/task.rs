use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::overlay::TransitionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NavTaskId(pub u64);

#[derive(Debug, Default)]
pub struct NavTaskSeq {
    next: u64,
}

impl NavTaskSeq {
    pub fn next_id(&mut self) -> NavTaskId {
        let id = NavTaskId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// How a navigation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// Every transition of the request ran to the end.
    Completed,
    /// A newer request superseded this one.
    Cancelled,
    /// The target could not be resolved; nothing changed.
    Rejected,
    /// Nothing to do (e.g. going back on an empty stack).
    NoOp,
}

/// What a controller is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationState {
    #[default]
    Idle,
    Transitioning(TransitionState),
}

/// The in-flight navigation task of a controller.
#[derive(Debug, Default, Clone)]
pub struct NavTaskState {
    pub active: Option<NavTaskId>,
    pub cancel: Option<CancellationToken>,
    pub kind: TransitionState,
}

impl NavTaskState {
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn on_started(&mut self, id: NavTaskId, cancel: CancellationToken, kind: TransitionState) {
        self.active = Some(id);
        self.cancel = Some(cancel);
        self.kind = kind;
    }

    pub fn finish_if_active(&mut self, id: NavTaskId) -> bool {
        let ok = self.active == Some(id);
        if ok {
            self.clear();
        }
        ok
    }

    /// Cancels the in-flight task, if any, and forgets it.
    pub fn cancel(&mut self) -> Option<NavTaskId> {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        let cancelled = self.active;
        self.clear();
        cancelled
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.cancel = None;
        self.kind = TransitionState::None;
    }

    pub fn navigation_state(&self) -> NavigationState {
        if self.is_running() {
            NavigationState::Transitioning(self.kind)
        } else {
            NavigationState::Idle
        }
    }
}

/// Caller-side view of a navigation request.
///
/// Dropping the handle does not cancel the request.
#[derive(Debug)]
pub struct NavigationHandle {
    id: Option<NavTaskId>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<NavOutcome>>,
    outcome: NavOutcome,
}

impl NavigationHandle {
    pub(crate) fn ready(outcome: NavOutcome) -> Self {
        Self {
            id: None,
            cancel: None,
            task: None,
            outcome,
        }
    }

    pub(crate) fn spawned(id: NavTaskId, cancel: CancellationToken, task: JoinHandle<NavOutcome>) -> Self {
        Self {
            id: Some(id),
            cancel: Some(cancel),
            task: Some(task),
            outcome: NavOutcome::Completed,
        }
    }

    pub fn id(&self) -> Option<NavTaskId> {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancels the request. Transitions already started keep playing.
    pub fn cancel(&self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
    }

    pub async fn outcome(self) -> NavOutcome {
        match self.task {
            Some(task) => task.await.unwrap_or(NavOutcome::Cancelled),
            None => self.outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_if_active_ignores_stale_ids() {
        let mut seq = NavTaskSeq::default();
        let mut state = NavTaskState::default();

        let first = seq.next_id();
        state.on_started(first, CancellationToken::new(), TransitionState::Opening);
        let second = seq.next_id();
        state.on_started(second, CancellationToken::new(), TransitionState::Closing);

        assert!(!state.finish_if_active(first));
        assert_eq!(
            state.navigation_state(),
            NavigationState::Transitioning(TransitionState::Closing)
        );
        assert!(state.finish_if_active(second));
        assert_eq!(state.navigation_state(), NavigationState::Idle);
    }

    #[test]
    fn test_cancel_fires_token() {
        let mut seq = NavTaskSeq::default();
        let mut state = NavTaskState::default();
        let token = CancellationToken::new();
        let id = seq.next_id();
        state.on_started(id, token.clone(), TransitionState::Opening);

        assert_eq!(state.cancel(), Some(id));
        assert!(token.is_cancelled());
        assert!(!state.is_running());
    }

    #[tokio::test]
    async fn test_ready_handle_reports_outcome() {
        let handle = NavigationHandle::ready(NavOutcome::Rejected);
        assert!(handle.is_finished());
        assert_eq!(handle.id(), None);
        assert_eq!(handle.outcome().await, NavOutcome::Rejected);
    }
}
