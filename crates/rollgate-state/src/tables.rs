//! redb table definitions. `&str` keys, JSON-serialized `&[u8]` values.

use redb::TableDefinition;

/// Write-authority leases keyed by pair key.
pub const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");

/// Latest rollout record keyed by pair key.
pub const ROLLOUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollouts");
