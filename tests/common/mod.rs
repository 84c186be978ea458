#![allow(dead_code)]

use std::time::Duration;

/// Long enough for a slow CI worker, short enough to keep the suite quick.
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);
pub const DRAIN_GRACE: Duration = Duration::from_secs(5);
pub const POOL_WORKERS: usize = 8;
