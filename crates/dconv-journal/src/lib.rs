//! State Journal (§4.4): a crash-safe, per-device record of conversion
//! progress, written as a whole-file overwrite after every completed
//! state transition, and read back on startup to drive resume.

extern crate failure;
#[macro_use]
extern crate failure_derive;

mod error;
mod state;
mod store;

pub use self::error::JournalError;
pub use self::state::{ConversionState, LastOperation};
pub use self::store::JournalStore;
