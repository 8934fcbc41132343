use super::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemEventKind {
    /// Active balance moved by at least 0.1% and less than 1%.
    ActiveBalanceChange1,
    /// At least 1% and less than 10%.
    ActiveBalanceChange2,
    /// 10% or more.
    ActiveBalanceChange3,
    JoinedSet,
    LeftSet,
}

impl SystemEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventKind::ActiveBalanceChange1 => "active_balance_change_1",
            SystemEventKind::ActiveBalanceChange2 => "active_balance_change_2",
            SystemEventKind::ActiveBalanceChange3 => "active_balance_change_3",
            SystemEventKind::JoinedSet => "joined_set",
            SystemEventKind::LeftSet => "left_set",
        }
    }
}

impl fmt::Display for SystemEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub height: u64,
    pub time: DateTime<Utc>,
    /// Stash of the validator the event is about.
    pub actor: String,
    pub kind: SystemEventKind,
    pub data: serde_json::Value,
}

impl Record for SystemEvent {
    const TABLE: &'static str = "system_events";

    fn natural_key(&self) -> String {
        format!("{}-{}-{}", self.height, self.actor, self.kind)
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn kind(&self) -> Option<String> {
        Some(self.kind.to_string())
    }

    fn update(&mut self, other: &Self) {
        self.time = other.time;
        self.data = other.data.clone();
    }
}
