// tether_sim/src/simulation/core/app_state.rs

/// Defines the major phases of a control loop's lifecycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum ControlState {
    /// The initial state. Nothing is connected yet.
    #[default]
    Uninitialized,

    /// The adapter is connected and reset, the mapping is built.
    /// No channel is subscribed yet.
    Ready,

    /// Subscribed to the inbound channel. Ticks are being executed.
    Running,

    /// SHUTDOWN was received or the tick limit reached. The next step is `shut_down`.
    Stopping,

    /// Channels released. Terminal.
    ShutDown,
}

impl ControlState {
    pub fn is_running(self) -> bool {
        self == ControlState::Running
    }

    pub fn is_terminal(self) -> bool {
        self == ControlState::ShutDown
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControlState::Uninitialized => "UNINITIALIZED",
            ControlState::Ready => "READY",
            ControlState::Running => "RUNNING",
            ControlState::Stopping => "STOPPING",
            ControlState::ShutDown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}
