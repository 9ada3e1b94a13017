//! Purge paths: classification, the entry predicate, single-key purge, the
//! incremental sweep, and rule state/TTL management.

pub mod criteria;
pub mod key;
pub mod rules;
pub mod sweep;

pub use criteria::{PurgeAttributes, PurgeCriteria, PurgeMode, WILDCARD_NAME};
pub use key::{KeyPurgeOutcome, build_purge_key, purge_by_key};
pub use rules::{RuleUpdate, apply_rule_update, parse_state, parse_ttl};
pub use sweep::{PurgeSweep, SweepBudget};
