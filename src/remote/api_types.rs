//! Serde-deserializable types matching the REST Countries and Hipolabs
//! universities responses.
//!
//! These types are separate from the cached records so decoding stays lenient
//! while the store keeps one canonical shape.

use serde::Deserialize;

use crate::model::{NewCountry, NewUniversity};

// ============================================================================
// REST Countries (/region/{region})
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCountryName {
  pub common: String,
  pub official: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiFlags {
  pub png: Option<String>,
  pub svg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCountry {
  pub name: ApiCountryName,
  pub cca2: String,
  #[serde(default)]
  pub flags: ApiFlags,
  #[serde(default)]
  pub population: i64,
  #[serde(default)]
  pub region: String,
  pub subregion: Option<String>,
}

// ============================================================================
// Hipolabs universities (/search?country=)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUniversity {
  pub name: String,
  #[serde(default)]
  pub web_pages: Vec<String>,
  #[serde(default)]
  pub domains: Vec<String>,
}

// ============================================================================
// Conversions to cache records
// ============================================================================

impl From<ApiCountry> for NewCountry {
  fn from(api: ApiCountry) -> Self {
    NewCountry {
      code: api.cca2,
      common_name: api.name.common,
      official_name: api.name.official.filter(|s| !s.is_empty()),
      flag_url: api.flags.png.or(api.flags.svg),
      population: api.population,
      region: api.region,
      subregion: api.subregion.filter(|s| !s.is_empty()),
    }
  }
}

impl From<ApiUniversity> for NewUniversity {
  fn from(api: ApiUniversity) -> Self {
    NewUniversity {
      name: api.name,
      website: api.web_pages.into_iter().next().unwrap_or_default(),
      domains: api.domains,
    }
  }
}
