use super::{Record, ValidationError};
use crate::perbill::Perbill;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Running summary of one validator across heights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorAgg {
    pub stash: String,
    /// First height the stash was seen as a validator. Never changes after create.
    pub started_at_height: u64,
    pub started_at: DateTime<Utc>,
    pub recent_as_validator_height: u64,
    #[serde(with = "crate::amount")]
    pub recent_active_balance: BigInt,
    pub recent_commission: Perbill,
    pub recent_online: bool,
    /// Heights observed online.
    pub accumulated_uptime: u64,
    /// Heights observed.
    pub accumulated_uptime_count: u64,
    pub recent_at: DateTime<Utc>,
}

impl ValidatorAgg {
    pub fn first_seen(
        stash: &str,
        height: u64,
        time: DateTime<Utc>,
        active_balance: BigInt,
        commission: Perbill,
        online: bool,
    ) -> Self {
        Self {
            stash: stash.to_string(),
            started_at_height: height,
            started_at: time,
            recent_as_validator_height: height,
            recent_active_balance: active_balance,
            recent_commission: commission,
            recent_online: online,
            accumulated_uptime: u64::from(online),
            accumulated_uptime_count: 1,
            recent_at: time,
        }
    }

    /// State after observing the validator at `height`. Uptime only accumulates for heights
    /// past the most recent one, so replaying a height changes nothing; older heights leave
    /// the recent fields alone.
    pub fn observe(
        &self,
        height: u64,
        time: DateTime<Utc>,
        active_balance: BigInt,
        commission: Perbill,
        online: bool,
    ) -> Self {
        let mut next = self.clone();
        if height > self.recent_as_validator_height {
            next.accumulated_uptime += u64::from(online);
            next.accumulated_uptime_count += 1;
        }
        if height >= self.recent_as_validator_height {
            next.recent_as_validator_height = height;
            next.recent_active_balance = active_balance;
            next.recent_commission = commission;
            next.recent_online = online;
            next.recent_at = time;
        }
        next
    }

    /// Online ratio in percent, one decimal.
    pub fn uptime_percent(&self) -> f64 {
        if self.accumulated_uptime_count == 0 {
            return 0.0;
        }
        let tenths = self.accumulated_uptime * 1000 / self.accumulated_uptime_count;
        tenths as f64 / 10.0
    }
}

impl Record for ValidatorAgg {
    const TABLE: &'static str = "validator_aggregates";

    fn natural_key(&self) -> String {
        self.stash.clone()
    }

    fn height(&self) -> u64 {
        self.recent_as_validator_height
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.accumulated_uptime > self.accumulated_uptime_count {
            return Err(self.invalid("uptime exceeds observed heights"));
        }
        if self.started_at_height > self.recent_as_validator_height {
            return Err(self.invalid("started after most recent height"));
        }
        Ok(())
    }

    fn update(&mut self, other: &Self) {
        self.recent_as_validator_height = other.recent_as_validator_height;
        self.recent_active_balance = other.recent_active_balance.clone();
        self.recent_commission = other.recent_commission;
        self.recent_online = other.recent_online;
        self.accumulated_uptime = other.accumulated_uptime;
        self.accumulated_uptime_count = other.accumulated_uptime_count;
        self.recent_at = other.recent_at;
    }
}
