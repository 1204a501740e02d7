//! Core data model for the conversion engine: devices, partitions, and
//! the closed set of filesystem kinds the engine knows how to target.
//!
//! A filesystem-bearing volume is a `Partition` plus an `FsKind`; the
//! engine and backend pass that pair explicitly rather than through a
//! combined type, since the pair's one derived fact worth caching —
//! used space — is queried fresh every iteration (§4.5) rather than
//! cached on a long-lived value.

mod device;
mod fs_kind;
mod partition;

pub use self::device::{Device, DiskRotation};
pub use self::fs_kind::FsKind;
pub use self::partition::Partition;
