//! telemetry-backup — persistence for metric stores.
//!
//! # Architecture
//!
//! ```text
//! Stores<K>  name → MemStore<K, RawValue>
//!   ├── dump_to_file()      gzip(DumpEntry DumpEntry ...) → file
//!   ├── restore_from_file() file → entries applied to the named stores
//!   └── BackupJob::run()    periodic dump + final dump on shutdown
//! ```
//!
//! Each [`DumpEntry`] is tagged with the name of the store it came from, so
//! several stores share one file without key collisions. Entries are JSON
//! objects written back-to-back inside a single gzip stream.

pub mod dump;
pub mod error;
pub mod job;

pub use dump::{
    DumpEntry, RestoreReport, Stores, dump, dump_to_file, restore, restore_from_file,
    with_traversal_bits,
};
pub use error::{BackupError, BackupResult};
pub use job::BackupJob;
