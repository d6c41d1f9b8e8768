use std::fmt;

/// What a single Catalog -> Pipeline -> Sink pass ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayOutcome {
    Shown { name: String },
    /// The catalog is empty; the sink was left untouched.
    NoImage,
    /// The selected entry could not be decoded; the sink was left untouched.
    Unreadable { name: String },
}

impl DisplayOutcome {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Shown { name } | Self::Unreadable { name } => Some(name),
            Self::NoImage => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Timer,
    Trigger,
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timer => "timer",
            Self::Trigger => "trigger",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleState {
    #[default]
    Stopped,
    Running,
    /// `stop` was requested and the loop is finishing its current tick.
    Stopping,
}
