//! The machine pool entries clipforge tracks workers with

use chrono::prelude::*;
use std::fmt;
use utoipa::ToSchema;

/// The logical states a pooled machine can be in
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// This machine is executing a job
    Running,
    /// This machine is polling for work
    Idle,
    /// This machine is stopped and available for reuse
    Stopped,
}

impl MachineState {
    /// Get this state as its wire token
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MachineState::Running => "running",
            MachineState::Idle => "idle",
            MachineState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One machine in the pool, whether running or stopped
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct MachinePoolEntry {
    /// The provider assigned id for this machine
    pub machine_id: String,
    /// The logical state this machine is in
    pub state: MachineState,
    /// The last time this machine did anything
    pub last_active_at: DateTime<Utc>,
    /// When this machine was first added to the pool
    pub created_at: DateTime<Utc>,
}

impl MachinePoolEntry {
    /// Build a fresh pool entry for a machine that just started running
    ///
    /// # Arguments
    ///
    /// * `machine_id` - The provider assigned id for this machine
    #[must_use]
    pub fn new<T: Into<String>>(machine_id: T) -> Self {
        let now = Utc::now();
        MachinePoolEntry {
            machine_id: machine_id.into(),
            state: MachineState::Running,
            last_active_at: now,
            created_at: now,
        }
    }

    /// Move this entry to a new state and refresh its activity time
    ///
    /// # Arguments
    ///
    /// * `state` - The state to move this entry to
    #[must_use]
    pub fn transition(mut self, state: MachineState) -> Self {
        self.state = state;
        self.last_active_at = Utc::now();
        self
    }

    /// How long this machine has been inactive in milliseconds
    #[must_use]
    pub fn idle_ms(&self) -> i64 {
        (Utc::now() - self.last_active_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_entries_round_trip() {
        let entry = MachinePoolEntry::new("m1");
        let raw = serde_json::to_string(&entry).unwrap();
        let cast: MachinePoolEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(entry, cast);
    }

    #[test]
    fn transitions_preserve_created_at() {
        let entry = MachinePoolEntry::new("m1");
        let created = entry.created_at;
        let stopped = entry.transition(MachineState::Stopped);
        assert_eq!(stopped.state, MachineState::Stopped);
        assert_eq!(stopped.created_at, created);
        assert!(stopped.last_active_at >= created);
    }

    #[test]
    fn state_tokens_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&MachineState::Stopped).unwrap(),
            "\"stopped\""
        );
    }
}
