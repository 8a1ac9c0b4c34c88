//! Offline-first catalog of African countries and their universities.
//!
//! Data comes from two public APIs, is persisted in a local SQLite cache and
//! served from there whenever the network is unreachable or too slow.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod model;
pub mod remote;
pub mod watch;

pub use cache::{CacheResult, CacheSource, CacheStore, SqliteStore};
pub use catalog::Catalog;
pub use config::Config;
pub use connectivity::{ConnectivityMonitor, Subscription};
pub use error::{RemoteError, StoreError, SyncError};
pub use model::{Country, CountryFilter, University};
