//! Status reporting and agent identity

use std::fmt;

/// Health of a running input, as shown to the hosting agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Starting,
    Configuring,
    Running,
    Degraded,
    Failed,
    Stopping,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "Starting",
            Self::Configuring => "Configuring",
            Self::Running => "Running",
            Self::Degraded => "Degraded",
            Self::Failed => "Failed",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

/// Receiver of status updates for one configured unit
///
/// Standalone deployments usually have none; callers must tolerate that.
pub trait StatusReporter: Send + Sync {
    fn update_status(&self, status: Status, message: &str);
}

/// Information about the hosting agent
#[derive(Debug, Clone, Default)]
pub struct AgentInfo {
    /// Agent name (e.g. "shipper")
    pub name: String,
    /// Agent version
    pub version: String,
    /// Unique id of this agent instance
    pub instance_id: String,
}
