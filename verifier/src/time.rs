// Copyright (c) 2023 The MobileCoin Foundation

//! Time handling.
//!
//! All instants are durations since the unix epoch, the same representation
//! `x509_cert::time::Time::to_unix_duration()` produces.

use core::time::Duration;
use der::DateTime;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// The current wall clock time as a duration since the unix epoch
pub fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Render a unix time as `YYYY-MM-DDTHH:MM:SSZ`
pub fn render(time: Duration) -> String {
    match DateTime::from_unix_duration(Duration::from_secs(time.as_secs())) {
        Ok(dt) => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minutes(),
            dt.seconds()
        ),
        Err(_) => format!("{}s", time.as_secs()),
    }
}

/// An overall deadline for a validation run.
///
/// Every blocking sub-call bounds its own timeout by the time remaining.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No overall deadline
    pub fn none() -> Self {
        Self(None)
    }

    /// A deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now().checked_add(budget))
    }

    /// `true` once the deadline has passed
    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(at) if Instant::now() >= at)
    }

    /// The smaller of `timeout` and the time remaining.
    ///
    /// `None` when the deadline has already passed.
    pub fn bound(&self, timeout: Duration) -> Option<Duration> {
        match self.0 {
            None => Some(timeout),
            Some(at) => {
                let remaining = at.checked_duration_since(Instant::now())?;
                if remaining.is_zero() {
                    None
                } else {
                    Some(remaining.min(timeout))
                }
            }
        }
    }
}
