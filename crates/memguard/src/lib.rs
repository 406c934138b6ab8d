//! Allocation auditing for native programs.
//!
//! Route allocate/release calls through a [`MemGuard`] and it keeps a ledger of every live
//! allocation: its size, the call site that made it and optionally the call stack. Releasing
//! memory the ledger never handed out is reported instead of being forwarded to the real
//! allocator, and [`MemGuard::report`] lists everything still outstanding.
//!
//! C and C++ programs use the same machinery through the `memguard_*` functions exported by
//! the `cdylib` build, Rust programs can also install [`MemGuardAlloc`] as their global
//! allocator.
//!
//! Building with the `memguard-off` feature turns every entry point into a direct pass-through
//! to the underlying allocator. Sizes, alignment and failure behavior stay the same, only the
//! auditing goes away.

#[cfg(not(feature = "memguard-off"))]
#[doc(inline)]
pub use lib_on::*;
#[cfg(not(feature = "memguard-off"))]
mod lib_on;

// When auditing is disabled with the memguard-off feature every entry point comes from
// lib_off, which forwards straight to the allocator
#[cfg(feature = "memguard-off")]
#[doc(inline)]
pub use lib_off::*;
#[cfg(feature = "memguard-off")]
mod lib_off;

pub mod config;
pub mod error;
pub mod ffi;
pub mod frame;
pub mod origin;
pub mod raw;
pub mod redact;
pub mod sink;

pub use config::Options;
pub use error::FrameError;
pub use frame::{Frame, FrameNode, TrackedText};
pub use origin::Origin;
pub use raw::{LibcAllocator, RawAllocator};
pub use redact::PathRedactor;
pub use sink::{ChannelSink, ConsoleSink, LogSink, SinkSlot, TracingSink};
