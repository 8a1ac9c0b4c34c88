use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Country as stored in the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
  /// Two-letter ISO code (cca2), unique
  pub code: String,
  pub common_name: String,
  pub official_name: Option<String>,
  pub flag_url: Option<String>,
  pub population: i64,
  pub region: String,
  pub subregion: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// University as stored in the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct University {
  pub id: i64,
  pub country_code: String,
  pub name: String,
  /// First listed web page, empty when the source had none
  pub website: String,
  pub domains: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Country fields written by an upsert; timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCountry {
  pub code: String,
  pub common_name: String,
  pub official_name: Option<String>,
  pub flag_url: Option<String>,
  pub population: i64,
  pub region: String,
  pub subregion: Option<String>,
}

/// University fields written by a replace-all; the owning country code is
/// given separately.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUniversity {
  pub name: String,
  pub website: String,
  pub domains: Vec<String>,
}

/// Filters for country queries. All fields are optional and compose with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryFilter {
  /// Case-insensitive substring of the common or official name
  pub search: Option<String>,
  /// Inclusive lower population bound
  pub min_population: Option<i64>,
  /// Inclusive upper population bound
  pub max_population: Option<i64>,
}

impl CountryFilter {
  pub fn search(mut self, text: impl Into<String>) -> Self {
    self.search = Some(text.into());
    self
  }

  pub fn min_population(mut self, min: i64) -> Self {
    self.min_population = Some(min);
    self
  }

  pub fn max_population(mut self, max: i64) -> Self {
    self.max_population = Some(max);
    self
  }

  /// Trimmed, lowercased search text; `None` when blank.
  pub(crate) fn needle(&self) -> Option<String> {
    self
      .search
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_lowercase)
  }

  pub(crate) fn matches_name(&self, country: &Country) -> bool {
    let Some(needle) = self.needle() else {
      return true;
    };
    country.common_name.to_lowercase().contains(&needle)
      || country
        .official_name
        .as_deref()
        .is_some_and(|n| n.to_lowercase().contains(&needle))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn country(common: &str, official: Option<&str>) -> Country {
    Country {
      code: "XX".to_string(),
      common_name: common.to_string(),
      official_name: official.map(String::from),
      flag_url: None,
      population: 0,
      region: "Africa".to_string(),
      subregion: None,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn test_blank_search_matches_everything() {
    let filter = CountryFilter::default().search("   ");
    assert!(filter.needle().is_none());
    assert!(filter.matches_name(&country("Kenya", None)));
  }

  #[test]
  fn test_search_is_case_insensitive() {
    let filter = CountryFilter::default().search("KEN");
    assert!(filter.matches_name(&country("Kenya", None)));
    assert!(!filter.matches_name(&country("Ghana", None)));
  }

  #[test]
  fn test_search_matches_official_name() {
    let filter = CountryFilter::default().search("république");
    assert!(filter.matches_name(&country("Senegal", Some("République du Sénégal"))));
  }

  #[test]
  fn test_search_folds_non_ascii() {
    let filter = CountryFilter::default().search("CÔTE");
    assert!(filter.matches_name(&country("Côte d'Ivoire", None)));
  }
}
