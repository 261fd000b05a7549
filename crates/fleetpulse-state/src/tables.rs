//! redb table definitions for the fleetpulse state store.

use redb::TableDefinition;

/// Registered devices keyed by `{device_id}`.
pub const DEVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");

/// Status-check history keyed by `(device_id, cycle)`.
pub const STATUS_CHECKS: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("status_checks");

/// Store-wide counters.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// `META` key holding the number of the last committed cycle.
pub const LAST_CYCLE_KEY: &str = "last_cycle";
