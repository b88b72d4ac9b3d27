//! Hub lifecycle state

/// Lifecycle phase of a hub
///
/// A hub moves strictly forward: `Idle -> Running -> Draining -> Stopped`.
/// `Stopped` is terminal; streaming again needs a new hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubPhase {
    /// Constructed, control loop not started
    Idle,
    /// Control loop accepting subscribers and values
    Running,
    /// Shutdown requested, control loop closing inboxes
    Draining,
    /// Control loop exited
    Stopped,
}

impl HubPhase {
    /// Whether `publish` and `subscribe` are accepted in this phase
    pub fn is_running(self) -> bool {
        self == HubPhase::Running
    }

    /// Whether the hub can never run again
    pub fn is_terminal(self) -> bool {
        matches!(self, HubPhase::Draining | HubPhase::Stopped)
    }

    /// Move to `Running`. Returns false unless the hub was idle.
    pub(crate) fn start(&mut self) -> bool {
        if *self == HubPhase::Idle {
            *self = HubPhase::Running;
            true
        } else {
            false
        }
    }

    /// Move to `Draining`. Returns false unless the hub was running.
    pub(crate) fn begin_shutdown(&mut self) -> bool {
        if *self == HubPhase::Running {
            *self = HubPhase::Draining;
            true
        } else {
            false
        }
    }

    /// Move to `Stopped` once the control loop is gone
    pub(crate) fn finish(&mut self) {
        *self = HubPhase::Stopped;
    }
}
