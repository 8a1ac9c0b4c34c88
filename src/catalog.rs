//! Offline-first access to countries and universities.

use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheResult, CacheStore, SyncPolicy};
use crate::config::RemoteConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{StoreResult, SyncError};
use crate::model::{Country, CountryFilter, NewCountry, NewUniversity, University};
use crate::remote::RemoteSource;

const COUNTRIES_KEY: &str = "countries";

/// Country and university catalog with transparent caching.
///
/// Every load goes through the [`SyncPolicy`]: online loads refresh the cache
/// and read back from it, offline loads and failed refreshes read the cache.
pub struct Catalog<S: CacheStore> {
  remote: Arc<dyn RemoteSource>,
  store: Arc<S>,
  policy: SyncPolicy,
  region: String,
}

impl<S: CacheStore> Catalog<S> {
  pub fn new(
    remote: Arc<dyn RemoteSource>,
    store: Arc<S>,
    monitor: ConnectivityMonitor,
    config: &RemoteConfig,
  ) -> Self {
    Self {
      remote,
      store,
      policy: SyncPolicy::new(monitor, config.timeout()),
      region: config.region.clone(),
    }
  }

  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  pub fn monitor(&self) -> &ConnectivityMonitor {
    self.policy.monitor()
  }

  /// Countries matching `filter`, ascending by population.
  pub async fn load_countries(
    &self,
    filter: &CountryFilter,
  ) -> StoreResult<CacheResult<Vec<Country>>> {
    self
      .policy
      .handle_request(
        COUNTRIES_KEY,
        || self.refresh_countries(filter),
        || self.store.query_countries(filter),
      )
      .await
  }

  /// Universities of a country, ascending by name.
  ///
  /// `country_name` is what the remote API searches by; `code` keys the cache.
  pub async fn load_universities(
    &self,
    country_name: &str,
    code: &str,
  ) -> StoreResult<CacheResult<Vec<University>>> {
    let key = format!("universities:{}", code);
    self
      .policy
      .handle_request(
        &key,
        || self.refresh_universities(country_name, code),
        || self.store.query_universities(code),
      )
      .await
  }

  /// Like [`Catalog::load_universities`], resolving the display name from the
  /// cached country. `None` when the country is not cached.
  pub async fn load_universities_by_code(
    &self,
    code: &str,
  ) -> StoreResult<Option<CacheResult<Vec<University>>>> {
    let Some(country) = self.store.get_country_by_code(code)? else {
      return Ok(None);
    };
    let result = self.load_universities(&country.common_name, code).await?;
    Ok(Some(result))
  }

  /// Whether anything has ever been cached, to tell "no data yet" apart from
  /// "nothing matched".
  pub fn has_local_data(&self) -> StoreResult<bool> {
    self.store.has_any_country_data()
  }

  async fn refresh_countries(&self, filter: &CountryFilter) -> Result<Vec<Country>, SyncError> {
    let countries = self.remote.fetch_region_countries(&self.region).await?;
    let count = countries.len();

    for api in countries {
      self.store.upsert_country(&NewCountry::from(api))?;
    }
    info!(count, region = %self.region, "persisted countries");

    Ok(self.store.query_countries(filter)?)
  }

  async fn refresh_universities(
    &self,
    country_name: &str,
    code: &str,
  ) -> Result<Vec<University>, SyncError> {
    let universities: Vec<NewUniversity> = self
      .remote
      .fetch_universities(country_name)
      .await?
      .into_iter()
      .map(NewUniversity::from)
      .collect();

    self
      .store
      .replace_universities_for_country(code, &universities)?;
    info!(count = universities.len(), code, country_name, "persisted universities");

    Ok(self.store.query_universities(code)?)
  }
}
