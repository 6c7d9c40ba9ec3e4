//! Bounded spin lock for structural mutation of a shared table.
//!
//! The lock is a single byte in shared memory: `0x00` when free, `0xFF` when
//! held. Holders are expected to be extremely short-lived (no syscalls inside
//! the critical section), so waiters sleep with a linearly growing interval
//! and, once the next step would exceed the bound, take the lock over from
//! whoever holds it. A holder that crashed mid-update therefore cannot wedge
//! every other process attached to the table.
//!
//! The takeover is not free: if the holder was merely slow rather than dead,
//! two callers run the critical section concurrently. [`LockOutcome::Recovered`]
//! reports every takeover so callers can surface it.

use core::time::Duration;

use crate::sync::{AtomicU8, Ordering};

/// Lock byte value when nobody holds the lock.
pub const UNLOCKED: u8 = 0x00;

/// Lock byte value while the lock is held.
pub const LOCKED: u8 = 0xFF;

/// Backoff schedule for [`StructuralLock::lock_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinPolicy {
    /// Increment added to the sleep interval after each failed attempt.
    pub step: Duration,
    /// Once the next sleep interval would exceed this, the lock is taken over.
    pub bound: Duration,
}

impl SpinPolicy {
    /// 100µs steps, takeover once a step would exceed 500µs.
    pub const DEFAULT: Self = Self {
        step: Duration::from_micros(100),
        bound: Duration::from_micros(500),
    };
}

impl Default for SpinPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How a lock acquisition went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock was free (possibly after waiting).
    Acquired { waited: Duration },
    /// The wait bound was exceeded and the lock was taken over from a stale
    /// holder.
    Recovered { waited: Duration },
}

impl LockOutcome {
    #[inline]
    pub fn is_recovered(&self) -> bool {
        matches!(self, LockOutcome::Recovered { .. })
    }

    /// Total time spent sleeping before the lock was obtained.
    #[inline]
    pub fn waited(&self) -> Duration {
        match *self {
            LockOutcome::Acquired { waited } | LockOutcome::Recovered { waited } => waited,
        }
    }
}

/// A view over a lock byte living in shared memory.
pub struct StructuralLock<'a> {
    flag: &'a AtomicU8,
}

impl<'a> StructuralLock<'a> {
    #[inline]
    pub fn new(flag: &'a AtomicU8) -> Self {
        Self { flag }
    }

    /// Returns true if some caller currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Acquire) != UNLOCKED
    }

    /// Take the lock if it is free.
    #[inline]
    pub fn try_lock(&self) -> Option<LockGuard<'a>> {
        self.flag
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LockGuard { flag: self.flag })
    }

    /// Take the lock, pausing between attempts with `pause`.
    ///
    /// `pause` receives the interval to wait. Production code sleeps; loom
    /// models yield instead.
    pub fn lock_with(
        &self,
        policy: SpinPolicy,
        mut pause: impl FnMut(Duration),
    ) -> (LockGuard<'a>, LockOutcome) {
        let mut waited = Duration::ZERO;
        let mut step = Duration::ZERO;

        loop {
            if let Some(guard) = self.try_lock() {
                return (guard, LockOutcome::Acquired { waited });
            }

            step += policy.step;
            if step > policy.bound {
                // Stale holder: keep the byte locked and become the owner.
                self.flag.swap(LOCKED, Ordering::Acquire);
                return (
                    LockGuard { flag: self.flag },
                    LockOutcome::Recovered { waited },
                );
            }

            pause(step);
            waited += step;
        }
    }

    /// Take the lock, sleeping the calling thread between attempts.
    #[cfg(feature = "std")]
    pub fn lock(&self, policy: SpinPolicy) -> (LockGuard<'a>, LockOutcome) {
        self.lock_with(policy, std::thread::sleep)
    }

    /// Clear the lock byte regardless of who holds it.
    #[inline]
    pub fn force_unlock(&self) {
        self.flag.store(UNLOCKED, Ordering::Release);
    }
}

/// Releases the structural lock on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    flag: &'a AtomicU8,
}

impl LockGuard<'_> {
    /// Release the lock now.
    #[inline]
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(UNLOCKED, Ordering::Release);
    }
}
