//! fleetpulse-state — embedded state store for fleetpulse.
//!
//! Backed by [redb](https://docs.rs/redb), holds the device registry and
//! the append-only history of health-check outcomes.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Status-check keys are `(device_id, cycle)` tuples, so the range
//! `(id, 0)..=(id, u64::MAX)` yields exactly one device's history in cycle
//! order, whatever characters the id contains.
//!
//! A whole health-check cycle is written by [`StateStore::commit_cycle`]
//! inside a single write transaction: either every record and every
//! device status lands, or none does.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
