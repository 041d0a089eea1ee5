//! Wall-clock implementation of the core `Clock` port.

use chrono::{DateTime, Utc};
use jobfeed_core::Clock;

/// System clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
