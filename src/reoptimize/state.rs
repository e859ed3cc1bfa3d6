//! In-memory `Idle -> Checking -> {Reoptimizing | Idle}` tracker per route.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Checking,
    Reoptimizing,
}

#[derive(Default)]
pub struct RouteMonitor {
    states: Mutex<HashMap<Uuid, MonitorState>>,
}

impl RouteMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: Uuid) -> MonitorState {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .copied()
            .unwrap_or(MonitorState::Idle)
    }

    /// Moves an idle route to `Checking`. Returns `None` if the route is
    /// already being processed. The route returns to `Idle` when the guard drops.
    pub fn begin_check(self: &Arc<Self>, id: Uuid) -> Option<CheckGuard> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        if states.contains_key(&id) {
            return None;
        }
        states.insert(id, MonitorState::Checking);
        Some(CheckGuard {
            monitor: Arc::clone(self),
            id,
        })
    }

    fn set(&self, id: Uuid, state: MonitorState) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        match state {
            MonitorState::Idle => {
                states.remove(&id);
            }
            other => {
                states.insert(id, other);
            }
        }
    }
}

pub struct CheckGuard {
    monitor: Arc<RouteMonitor>,
    id: Uuid,
}

impl CheckGuard {
    pub fn reoptimizing(&self) {
        self.monitor.set(self.id, MonitorState::Reoptimizing);
    }
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        self.monitor.set(self.id, MonitorState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let monitor = Arc::new(RouteMonitor::new());
        let id = Uuid::new_v4();
        assert_eq!(monitor.state(id), MonitorState::Idle);

        let guard = monitor.begin_check(id).unwrap();
        assert_eq!(monitor.state(id), MonitorState::Checking);
        assert!(monitor.begin_check(id).is_none());

        guard.reoptimizing();
        assert_eq!(monitor.state(id), MonitorState::Reoptimizing);

        drop(guard);
        assert_eq!(monitor.state(id), MonitorState::Idle);
        assert!(monitor.begin_check(id).is_some());
    }
}
