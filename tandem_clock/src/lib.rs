//! Utilities for messing with time
//!
//! Session tokens carry their issue and expiry instants as whole seconds since
//! the Unix epoch, so everything here works at second granularity. The
//! [`Clock`] trait lets the session machinery ask "what time is it?" without
//! being welded to the system clock, and [`TestClock`] gives tests a clock
//! that can be moved forward from the outside while tasks hold a copy of it.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::{
    ops,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unix time
///
/// Unix time as represented by the number of seconds elapsed since the
/// beginning of the Unix epoch on 1970/01/01 at 00:00:00 UTC.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
#[repr(transparent)]
pub struct UnixTime(pub u64);

impl From<SystemTime> for UnixTime {
    /// Converts a system time, clamping anything before the epoch to zero
    #[inline]
    fn from(t: SystemTime) -> Self {
        let time = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        UnixTime(time)
    }
}

/// A span of time measured in whole seconds
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
#[repr(transparent)]
pub struct DurationSecs(pub u64);

impl DurationSecs {
    /// One minute
    pub const MINUTE: Self = Self(60);
}

impl From<DurationSecs> for Duration {
    #[inline]
    fn from(d: DurationSecs) -> Self {
        Duration::from_secs(d.0)
    }
}

impl From<Duration> for DurationSecs {
    /// Truncates any sub-second remainder
    #[inline]
    fn from(d: Duration) -> Self {
        DurationSecs(d.as_secs())
    }
}

impl ops::Add<DurationSecs> for UnixTime {
    type Output = UnixTime;

    #[inline]
    fn add(self, rhs: DurationSecs) -> Self::Output {
        UnixTime(self.0.saturating_add(rhs.0))
    }
}

impl ops::Sub<DurationSecs> for UnixTime {
    type Output = UnixTime;

    #[inline]
    fn sub(self, rhs: DurationSecs) -> Self::Output {
        UnixTime(self.0.saturating_sub(rhs.0))
    }
}

impl ops::Sub for UnixTime {
    type Output = DurationSecs;

    /// The time elapsed between two instants, or zero if `rhs` is later
    #[inline]
    fn sub(self, rhs: UnixTime) -> Self::Output {
        DurationSecs(self.0.saturating_sub(rhs.0))
    }
}

/// Represents a clock, which can tell the current time
pub trait Clock {
    /// Gets the current time according to this clock
    fn now(&self) -> UnixTime;
}

impl<C: Clock + ?Sized> Clock for &'_ C {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A test clock which maintains the current time as shared internal state
///
/// Clones observe the same time, so a test can hand a clone to a background
/// task and then move time forward from the test body.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicU64>);

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::Acquire))
    }
}

impl TestClock {
    /// Creates a new test clock with the specified time
    #[inline]
    pub fn new(time: UnixTime) -> Self {
        Self(Arc::new(AtomicU64::new(time.0)))
    }

    /// Updates the clock's current time to `val`
    pub fn set(&self, val: UnixTime) {
        self.0.store(val.0, Ordering::Release);
    }

    /// Increments the clock's current time by `inc`
    pub fn advance(&self, inc: DurationSecs) {
        self.0.fetch_add(inc.0, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtracting_a_later_time_saturates_at_zero() {
        assert_eq!(UnixTime(10) - UnixTime(25), DurationSecs(0));
        assert_eq!(UnixTime(25) - UnixTime(10), DurationSecs(15));
    }

    #[test]
    fn pre_epoch_system_time_clamps_to_zero() {
        let before = SystemTime::UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(UnixTime::from(before), UnixTime(0));
    }

    #[test]
    fn test_clock_clones_share_time() {
        let clock = TestClock::new(UnixTime(1_000));
        let observer = clock.clone();

        clock.advance(DurationSecs::MINUTE);

        assert_eq!(observer.now(), UnixTime(1_060));

        observer.set(UnixTime(5));
        assert_eq!(clock.now(), UnixTime(5));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_bare_seconds() {
        let raw = serde_json::to_string(&UnixTime(1_700_000_000)).unwrap();
        assert_eq!(raw, "1700000000");

        let back: DurationSecs = serde_json::from_str("900").unwrap();
        assert_eq!(back, DurationSecs(900));
    }
}
