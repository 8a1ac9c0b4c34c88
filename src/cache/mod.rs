//! Local cache and the online/offline sync policy.
//!
//! - `CacheStore` is the persistence seam; `SqliteStore` implements it on a
//!   single SQLite file with per-install table names
//! - `SyncPolicy` decides per request whether to refresh from the network or
//!   serve what is already cached

mod namespace;
mod policy;
mod storage;
mod traits;

pub use namespace::Namespace;
pub use policy::SyncPolicy;
pub use storage::SqliteStore;
pub use traits::{CacheResult, CacheSource, CacheStore};
