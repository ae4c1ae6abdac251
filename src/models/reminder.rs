use std::fmt;

use serde::{Deserialize, Serialize};

/// A plan-expiry milestone. Each kind is sent at most once per billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderKind {
    #[serde(rename = "5_day_reminder")]
    FiveDay,
    #[serde(rename = "1_day_reminder")]
    OneDay,
    #[serde(rename = "expiry_notification")]
    Expiry,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::FiveDay => "5_day_reminder",
            ReminderKind::OneDay => "1_day_reminder",
            ReminderKind::Expiry => "expiry_notification",
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
