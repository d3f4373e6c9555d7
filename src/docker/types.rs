// DTOs returned by the orchestrator adapter.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Swarm task states, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    New,
    Allocated,
    Pending,
    Assigned,
    Accepted,
    Preparing,
    Ready,
    Starting,
    Running,
    Complete,
    Shutdown,
    Failed,
    Rejected,
    Remove,
    Orphaned,
    Unknown,
}

impl TaskState {
    pub fn parse(s: &str) -> Self {
        match s {
            "new" => Self::New,
            "allocated" => Self::Allocated,
            "pending" => Self::Pending,
            "assigned" => Self::Assigned,
            "accepted" => Self::Accepted,
            "preparing" => Self::Preparing,
            "ready" => Self::Ready,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "complete" => Self::Complete,
            "shutdown" => Self::Shutdown,
            "failed" => Self::Failed,
            "rejected" => Self::Rejected,
            "remove" => Self::Remove,
            "orphaned" => Self::Orphaned,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Allocated => "allocated",
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Shutdown => "shutdown",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Remove => "remove",
            Self::Orphaned => "orphaned",
            Self::Unknown => "unknown",
        }
    }

    /// The task will never run: failed, rejected or orphaned.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Rejected | Self::Orphaned)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One overlay address of a task, CIDR suffix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAddress {
    pub network: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub id: String,
    pub state: TaskState,
    pub message: String,
    pub error: Option<String>,
    pub addresses: Vec<TaskAddress>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskDescriptor {
    /// Error detail if the task reported one, otherwise its status message.
    pub fn failure_detail(&self) -> String {
        match &self.error {
            Some(err) if !err.is_empty() => err.clone(),
            _ if !self.message.is_empty() => self.message.clone(),
            _ => format!("task {} is {}", self.id, self.state),
        }
    }
}
