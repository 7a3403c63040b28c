//! Token quota accounting.
//!
//! Every user has a balance of quota units that is materialized lazily and
//! expires after a fixed window, after which the next access starts again
//! from the user's full limit. Model calls are charged
//! `tokens * model multiplier` after they complete.
//!
//! - [`QuotaStore`]: the atomic key/value primitives balances live behind
//! - [`InMemoryQuotaStore`]: process-local store
//! - [`SqliteQuotaStore`]: durable store shared by several processes
//! - [`QuotaBucket`]: one user's balance with `check` / `consume`

pub mod bucket;
pub mod store;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use bucket::{QuotaBucket, QuotaManager};
pub use lingoclaw_core::error::QuotaError;
pub use store::{InMemoryQuotaStore, QuotaStore, parse_balance};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteQuotaStore;
