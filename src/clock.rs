//! Time and identifier sources injected into the repository.
//!
//! Both are traits so tests can drive the engine deterministically with
//! [`ManualClock`] and [`SequentialIds`] while production code uses
//! [`SystemClock`] and [`RandomIds`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of monotonic timestamps.
///
/// Implementations must never return a value smaller than one they
/// returned before.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time, clamped so it never runs backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // A clock set before the epoch reads as zero; the clamp below keeps
        // the sequence monotonic either way.
        let wall = SystemTime::UNIX_EPOCH
            .elapsed()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let prev = self.last.fetch_max(wall, Ordering::SeqCst);
        Timestamp(prev.max(wall))
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start` milliseconds.
    pub fn starting_at(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.load(Ordering::SeqCst))
    }
}

/// Smallest OTP code (inclusive).
pub const OTP_MIN: u32 = 100_000;
/// Largest OTP code (inclusive).
pub const OTP_MAX: u32 = 999_999;

/// Source of deal identifiers and handover codes.
pub trait IdGenerator: Send + Sync + 'static {
    /// A fresh deal id of the form `DL-XXXXXXXX`.
    fn deal_id(&self) -> String;

    /// A six digit OTP code in `[OTP_MIN, OTP_MAX]`.
    fn otp(&self) -> String;
}

/// Random ids from UUID v4 and OTP codes drawn uniformly from the
/// 900,000 value space.
///
/// Codes are not unique across deals; handover lookup handles collisions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn deal_id(&self) -> String {
        let hex = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("DL-{}", hex.get(..8).unwrap_or(&hex))
    }

    fn otp(&self) -> String {
        rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
    }
}

/// Deterministic ids for tests and fixtures.
///
/// Deal ids count up from `DL-00000001`. OTP codes cycle through the
/// configured list, which makes OTP collisions reproducible.
#[derive(Debug)]
pub struct SequentialIds {
    next_deal: AtomicU64,
    next_otp: AtomicU64,
    otps: Vec<String>,
}

impl SequentialIds {
    /// Sequential ids with OTP codes counting up from `OTP_MIN`.
    pub fn new() -> Self {
        Self::with_otps(Vec::new())
    }

    /// Sequential ids handing out `otps` in order, wrapping around.
    ///
    /// An empty list falls back to counting up from `OTP_MIN`.
    pub fn with_otps(otps: Vec<String>) -> Self {
        Self {
            next_deal: AtomicU64::new(1),
            next_otp: AtomicU64::new(0),
            otps,
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn deal_id(&self) -> String {
        let n = self.next_deal.fetch_add(1, Ordering::SeqCst);
        format!("DL-{n:08X}")
    }

    fn otp(&self) -> String {
        let n = self.next_otp.fetch_add(1, Ordering::SeqCst);
        if self.otps.is_empty() {
            let span = u64::from(OTP_MAX - OTP_MIN) + 1;
            return (u64::from(OTP_MIN) + n % span).to_string();
        }
        let idx = usize::try_from(n).unwrap_or(0) % self.otps.len();
        self.otps.get(idx).cloned().unwrap_or_default()
    }
}
