//! telemetry-state — in-memory metric store for the telemetry server and agent.
//!
//! # Architecture
//!
//! ```text
//! MemStore<K, V>          generic keyed container, one RwLock per instance
//!   └── MetricStore       MemStore<MetricKey, RawValue>
//!         ├── apply()     merge a Metric (counter: add, gauge: replace)
//!         └── value()     decode the stored raw bytes back into a MetricValue
//!
//! codec                   MetricValue ⇄ 8-byte little-endian RawValue
//! ```
//!
//! Keys are `(kind, name)` pairs with the name folded to lowercase, so
//! lookups are case-insensitive. Values are always exactly
//! [`RAW_VALUE_LEN`] bytes; decoding shorter input yields the zero value.
//!
//! `MemStore` is `Clone` + `Send` + `Sync` (backed by `Arc<RwLock<_>>`)
//! and can be shared across async tasks.

pub mod codec;
pub mod error;
pub mod store;
pub mod types;

pub use codec::{RAW_VALUE_LEN, RawValue};
pub use error::{StateError, StateResult};
pub use store::{Cancellation, MemStore, MetricStore, Uncancellable};
pub use types::*;
