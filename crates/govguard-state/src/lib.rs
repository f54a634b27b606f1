//! GovGuard State: snapshot persistence for release candidates
//!
//! This crate is the persistence boundary of GovGuard. The coordination engine
//! calls into it synchronously at every lifecycle transition; it never drives
//! the lifecycle itself.
//!
//! ## Layer 0 - Data/Persistence
//!
//! ## Key Components
//!
//! - `SnapshotStore`: async trait implemented by every backend
//! - `SnapshotRecord`: the persisted (candidate id, state, decision) tuple
//! - `FsSnapshotStore`: one JSON document per candidate on disk
//! - `fakes::MemorySnapshotStore`: in-memory backend with failure injection

mod error;
pub mod fakes;
mod fs;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::FsSnapshotStore;
pub use storage_traits::{ContentDigest, SnapshotRecord, SnapshotStore, StorageResult};
