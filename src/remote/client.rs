use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{ApiCountry, ApiUniversity};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Source of raw country and university records.
///
/// Implementations either return the full decoded payload or fail; the sync
/// policy decides what a failure means.
pub trait RemoteSource: Send + Sync {
  /// All countries of a region (e.g. "africa").
  fn fetch_region_countries<'a>(
    &'a self,
    region: &'a str,
  ) -> BoxFuture<'a, Result<Vec<ApiCountry>, RemoteError>>;

  /// Universities of a country, by its display name.
  fn fetch_universities<'a>(
    &'a self,
    country_name: &'a str,
  ) -> BoxFuture<'a, Result<Vec<ApiUniversity>, RemoteError>>;
}

/// HTTP client for REST Countries and the Hipolabs universities API
#[derive(Clone)]
pub struct RemoteClient {
  http: reqwest::Client,
  countries_url: Url,
  universities_url: Url,
}

impl RemoteClient {
  pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
    let http = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(config.timeout_secs.max(1)))
      .user_agent(concat!("afriuni/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      http,
      countries_url: Url::parse(&config.countries_url)?,
      universities_url: Url::parse(&config.universities_url)?,
    })
  }

  /// `{countries_url}/region/{region}`
  fn region_url(&self, region: &str) -> Result<Url, RemoteError> {
    let mut url = self.countries_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
      .pop_if_empty()
      .push("region")
      .push(region);
    Ok(url)
  }

  /// `{universities_url}/search?country={name}`
  fn search_url(&self, country_name: &str) -> Result<Url, RemoteError> {
    let mut url = self.universities_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
      .pop_if_empty()
      .push("search");
    url.query_pairs_mut().append_pair("country", country_name);
    Ok(url)
  }

  /// GET a URL and decode its JSON body. Non-2xx is an error.
  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
    debug!(%url, "remote GET");

    let response = self.http.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Status {
        url: url.to_string(),
        status,
      });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|source| RemoteError::Decode {
      url: url.to_string(),
      source,
    })
  }
}

impl RemoteSource for RemoteClient {
  fn fetch_region_countries<'a>(
    &'a self,
    region: &'a str,
  ) -> BoxFuture<'a, Result<Vec<ApiCountry>, RemoteError>> {
    Box::pin(async move {
      let url = self.region_url(region)?;
      self.get_json(url).await
    })
  }

  fn fetch_universities<'a>(
    &'a self,
    country_name: &'a str,
  ) -> BoxFuture<'a, Result<Vec<ApiUniversity>, RemoteError>> {
    Box::pin(async move {
      let url = self.search_url(country_name)?;
      self.get_json(url).await
    })
  }
}
