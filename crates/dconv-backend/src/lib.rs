//! The three system-facing components of the conversion engine (§2):
//! the Block Layer Adapter, the Volume Inspector, and the Verified
//! Migrator, unified behind one `Backend` trait.

extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;

mod backend;
mod block;
mod error;
mod inspector;
mod migrator;
mod mount;

pub use self::backend::{Backend, DryRunBackend, DummyBackend, DummyCall, SystemBackend};
pub use self::error::{BlockError, MigrateError};
pub use self::inspector::{disk_total_kb, is_mounted, is_rotational, mount_point, used_kb};
pub use self::migrator::{MigrationJob, VerifyOutcome};
pub use self::mount::{mount_readonly, mount_rw, MountHandle};
