use std::fmt;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    /// Not initialized, or stopped.
    #[default]
    Stopped,
    /// Bootstrap done, Api built, nothing loaded.
    Stage0,
    /// Satellites loaded, registries frozen.
    Stage1,
    /// Satellites started; accepting work.
    Running,
    /// Satellites are being stopped.
    Stopping,
}

impl EngineState {
    /// Whether the engine is serving.
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Stage0 => "stage0",
            Self::Stage1 => "stage1",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle phase a satellite can take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Stage1: register content.
    Load,
    /// Stage2: open resources, spawn loops.
    Start,
    /// Shutdown.
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Start => "start",
            Self::Stop => "stop",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn default_is_stopped() {
        assert_eq!(EngineState::default(), EngineState::Stopped);
        assert!(!EngineState::default().is_running());
    }

    #[rstest]
    #[case(EngineState::Stopped, "stopped")]
    #[case(EngineState::Stage0, "stage0")]
    #[case(EngineState::Stage1, "stage1")]
    #[case(EngineState::Running, "running")]
    #[case(EngineState::Stopping, "stopping")]
    fn state_display(#[case] state: EngineState, #[case] expected: &str) {
        assert_eq!(state.to_string(), expected);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Load.to_string(), "load");
        assert_eq!(Phase::Start.to_string(), "start");
        assert_eq!(Phase::Stop.to_string(), "stop");
    }
}
