//! Lock-free primitives for the roswell shared element table.
//!
//! This crate provides `no_std`-compatible building blocks designed for use
//! in shared memory contexts where you work with raw pointers to
//! memory-mapped regions.
//!
//! # Primitives
//!
//! - [`Region`]: a bounds-checked byte view over a mapped segment
//! - [`StructuralLock`]: a one-byte spin lock with a bounded wait that
//!   forcibly recovers a lock left behind by a crashed holder
//! - [`PingPong`]: a 16-bit published offset whose top bit selects one of two
//!   mirror copies, giving torn-free single-writer publication
//!
//! # Loom Testing
//!
//! The lock and the publication cell are modelled under loom to check every
//! interleaving of the structural lock and the ping-pong handoff.
//!
//! ```text
//! cargo test -p roswell-primitives --features loom --release
//! ```

#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod lock;
pub mod pingpong;
pub mod region;
pub mod sync;

pub use lock::{LockGuard, LockOutcome, SpinPolicy, StructuralLock};
pub use pingpong::{MIRROR_BIT, OFFSET_MASK, PingPong, mirror_of};
#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
