//! The worker instance state machine (spec §4.2).

/// A worker instance's lifecycle state.
///
/// ```text
/// CREATING ──(ready handshake)───▶ READY
/// CREATING ──(spawn fail/timeout)▶ TERMINATED
/// READY    ──(leased)────────────▶ ACTIVE
/// ACTIVE   ──(response delivered)▶ READY
/// ACTIVE   ──(timeout | crash)───▶ TERMINATING ─▶ TERMINATED
/// READY    ──(retirement due)────▶ TERMINATING ─▶ TERMINATED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Creating,
    Ready,
    Active,
    Terminating,
    Terminated,
}

impl WorkerState {
    /// Whether a worker in this state may be handed a new request.
    pub fn is_leasable(self) -> bool {
        matches!(self, WorkerState::Ready)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Creating => "creating",
            WorkerState::Ready => "ready",
            WorkerState::Active => "active",
            WorkerState::Terminating => "terminating",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}
