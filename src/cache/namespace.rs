//! Per-install table namespacing.
//!
//! Several installs may share one database file. Each gets its own pair of
//! tables whose names are fixed when the store is opened, so no query text is
//! ever built from caller input afterwards.

use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// Table names for one install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
  prefix: String,
}

impl Namespace {
  /// Derive a namespace from an opaque install key.
  ///
  /// The key is hashed so any string (including one with spaces or quotes)
  /// maps to a stable identifier.
  pub fn derive(install_key: &str) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(install_key.as_bytes());
    let digest = hex::encode(hasher.finalize());

    Self {
      prefix: format!("ns_{}", &digest[..16]),
    }
  }

  /// Use an explicit table prefix. Must be a plain SQL identifier.
  pub fn with_prefix(prefix: &str) -> StoreResult<Self> {
    if !is_safe_identifier(prefix) {
      return Err(StoreError::InvalidNamespace(prefix.to_string()));
    }
    Ok(Self {
      prefix: prefix.to_string(),
    })
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  pub fn countries_table(&self) -> String {
    format!("{}_countries", self.prefix)
  }

  pub fn universities_table(&self) -> String {
    format!("{}_universities", self.prefix)
  }
}

/// ASCII letter or underscore first, then letters, digits and underscores.
fn is_safe_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  s.len() <= 48 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_derive_is_stable() {
    assert_eq!(Namespace::derive("install-1"), Namespace::derive("install-1"));
    assert_ne!(Namespace::derive("install-1"), Namespace::derive("install-2"));
  }

  #[test]
  fn test_derive_yields_safe_identifier() {
    let ns = Namespace::derive("Robert'); DROP TABLE students;--");
    assert!(is_safe_identifier(ns.prefix()));
    assert!(ns.countries_table().ends_with("_countries"));
  }

  #[test]
  fn test_with_prefix_accepts_identifier() {
    let ns = Namespace::with_prefix("sig_abc123").unwrap();
    assert_eq!(ns.universities_table(), "sig_abc123_universities");
  }

  #[test]
  fn test_with_prefix_rejects_unsafe() {
    for bad in ["", "1abc", "a b", "a;b", "a\"b", "pays-2"] {
      assert!(matches!(
        Namespace::with_prefix(bad),
        Err(StoreError::InvalidNamespace(_))
      ));
    }
  }
}
