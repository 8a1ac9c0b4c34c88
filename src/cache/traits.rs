//! Core traits and types for the caching system.

use crate::error::StoreResult;
use crate::model::{Country, CountryFilter, NewCountry, NewUniversity, University};

/// Local store for countries and universities.
///
/// Every operation is a synchronous read or write against local storage and
/// none of them touch the network. Storage faults are returned, never hidden.
pub trait CacheStore: Send + Sync {
  /// Insert or overwrite a country by code.
  fn upsert_country(&self, country: &NewCountry) -> StoreResult<()>;

  /// Countries matching `filter`, ascending by population.
  fn query_countries(&self, filter: &CountryFilter) -> StoreResult<Vec<Country>>;

  fn get_country_by_code(&self, code: &str) -> StoreResult<Option<Country>>;

  /// Delete a country and, before it, all of its universities.
  fn delete_country(&self, code: &str) -> StoreResult<()>;

  /// Make the university set for `code` exactly `universities`.
  fn replace_universities_for_country(
    &self,
    code: &str,
    universities: &[NewUniversity],
  ) -> StoreResult<()>;

  /// Universities of a country, ascending by name.
  fn query_universities(&self, code: &str) -> StoreResult<Vec<University>>;

  fn delete_university(&self, id: i64) -> StoreResult<bool>;

  fn has_any_country_data(&self) -> StoreResult<bool>;

  fn country_count(&self) -> StoreResult<usize>;

  /// Remove every country and university of this namespace.
  fn clear_all(&self) -> StoreResult<()>;
}

/// Result of a sync policy run, with where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Fresh remote data, read back from the cache after persisting.
  pub fn from_remote(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Remote,
    }
  }

  /// Cache read because the device was offline.
  pub fn offline(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
    }
  }

  /// Cache read because the online path failed.
  pub fn fallback(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Remote fetch succeeded and was persisted
  Remote,
  /// No connectivity, served from cache without trying the network
  Offline,
  /// Online, but the remote path failed; served from cache
  Fallback,
}

impl CacheSource {
  /// Whether the data may be older than what the remote holds.
  pub fn is_local(self) -> bool {
    !matches!(self, CacheSource::Remote)
  }
}
