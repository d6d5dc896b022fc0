//! redb table definitions for the savings ledger.

use redb::TableDefinition;

/// Accumulated savings keyed by `(service_id, app_id)`.
pub const SAVINGS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("savings");
