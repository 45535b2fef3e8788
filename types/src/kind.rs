//! Traffic classification label.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which direction of traffic a limiter governs.
///
/// Purely descriptive: it shows up in logs and stats, never in decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterKind {
    Sent,
    Received,
    Both,
}

impl fmt::Display for LimiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterKind::Sent => write!(f, "sent"),
            LimiterKind::Received => write!(f, "received"),
            LimiterKind::Both => write!(f, "both"),
        }
    }
}
