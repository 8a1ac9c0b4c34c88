//! SQLite implementation of the cache store.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::namespace::Namespace;
use super::traits::CacheStore;
use crate::error::{StoreError, StoreResult};
use crate::model::{Country, CountryFilter, NewCountry, NewUniversity, University};

/// SQLite-based cache store.
///
/// One connection behind a mutex. The namespace is turned into SQL text once,
/// in [`Statements::new`], and every value afterwards is bound as a parameter.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  namespace: Namespace,
  sql: Statements,
}

impl SqliteStore {
  /// Open (or create) the store at an explicit path.
  pub fn open(path: &Path, namespace: Namespace) -> StoreResult<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    info!(path = %path.display(), namespace = namespace.prefix(), "opening cache database");

    let conn = Connection::open(path)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.busy_timeout(Duration::from_secs(5))?;

    Self::with_connection(conn, namespace)
  }

  /// In-memory store, gone when dropped.
  pub fn open_in_memory(namespace: Namespace) -> StoreResult<Self> {
    Self::with_connection(Connection::open_in_memory()?, namespace)
  }

  fn with_connection(conn: Connection, namespace: Namespace) -> StoreResult<Self> {
    let sql = Statements::new(&namespace);
    let store = Self {
      conn: Mutex::new(conn),
      namespace,
      sql,
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> StoreResult<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StoreError::NoDataDir)?;

    Ok(data_dir.join("afriuni").join("catalog.db"))
  }

  pub fn namespace(&self) -> &Namespace {
    &self.namespace
  }

  fn run_migrations(&self) -> StoreResult<()> {
    self.conn()?.execute_batch(&self.sql.schema)?;
    Ok(())
  }

  fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }
}

/// SQL text for one namespace.
struct Statements {
  schema: String,
  upsert_country: String,
  select_countries: String,
  select_country: String,
  delete_country: String,
  count_countries: String,
  delete_all_countries: String,
  insert_university: String,
  select_universities: String,
  delete_universities_of: String,
  delete_university: String,
  delete_all_universities: String,
}

const COUNTRY_COLUMNS: &str =
  "code, common_name, official_name, flag_url, population, region, subregion, created_at, updated_at";

const UNIVERSITY_COLUMNS: &str = "id, country_code, name, website, domains, created_at, updated_at";

impl Statements {
  fn new(ns: &Namespace) -> Self {
    let c = ns.countries_table();
    let u = ns.universities_table();

    Self {
      schema: format!(
        r#"
CREATE TABLE IF NOT EXISTS {c} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    common_name TEXT NOT NULL,
    official_name TEXT,
    flag_url TEXT,
    population INTEGER NOT NULL DEFAULT 0,
    region TEXT NOT NULL DEFAULT '',
    subregion TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{c}_population ON {c}(population);

CREATE TABLE IF NOT EXISTS {u} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    country_code TEXT NOT NULL,
    name TEXT NOT NULL,
    website TEXT NOT NULL DEFAULT '',
    domains TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{u}_country ON {u}(country_code);
"#
      ),
      upsert_country: format!(
        "INSERT INTO {c} ({COUNTRY_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(code) DO UPDATE SET
           common_name = excluded.common_name,
           official_name = excluded.official_name,
           flag_url = excluded.flag_url,
           population = excluded.population,
           region = excluded.region,
           subregion = excluded.subregion,
           updated_at = excluded.updated_at"
      ),
      select_countries: format!(
        "SELECT {COUNTRY_COLUMNS} FROM {c}
         WHERE (?1 IS NULL OR population >= ?1)
           AND (?2 IS NULL OR population <= ?2)
         ORDER BY population ASC, common_name ASC"
      ),
      select_country: format!("SELECT {COUNTRY_COLUMNS} FROM {c} WHERE code = ?1"),
      delete_country: format!("DELETE FROM {c} WHERE code = ?1"),
      count_countries: format!("SELECT COUNT(*) FROM {c}"),
      delete_all_countries: format!("DELETE FROM {c}"),
      insert_university: format!(
        "INSERT INTO {u} (country_code, name, website, domains, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)"
      ),
      select_universities: format!(
        "SELECT {UNIVERSITY_COLUMNS} FROM {u}
         WHERE country_code = ?1
         ORDER BY name ASC, id ASC"
      ),
      delete_universities_of: format!("DELETE FROM {u} WHERE country_code = ?1"),
      delete_university: format!("DELETE FROM {u} WHERE id = ?1"),
      delete_all_universities: format!("DELETE FROM {u}"),
    }
  }
}

impl CacheStore for SqliteStore {
  fn upsert_country(&self, country: &NewCountry) -> StoreResult<()> {
    let conn = self.conn()?;
    conn.execute(
      &self.sql.upsert_country,
      params![
        country.code,
        country.common_name,
        country.official_name,
        country.flag_url,
        country.population,
        country.region,
        country.subregion,
        Utc::now().to_rfc3339(),
      ],
    )?;
    Ok(())
  }

  fn query_countries(&self, filter: &CountryFilter) -> StoreResult<Vec<Country>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(&self.sql.select_countries)?;

    let rows = stmt.query_map(
      params![filter.min_population, filter.max_population],
      row_to_country,
    )?;

    // Name matching happens here rather than with LIKE, which only folds ASCII.
    let mut countries = Vec::new();
    for row in rows {
      let country = row?;
      if filter.matches_name(&country) {
        countries.push(country);
      }
    }
    Ok(countries)
  }

  fn get_country_by_code(&self, code: &str) -> StoreResult<Option<Country>> {
    let conn = self.conn()?;
    let country = conn
      .query_row(&self.sql.select_country, params![code], row_to_country)
      .optional()?;
    Ok(country)
  }

  fn delete_country(&self, code: &str) -> StoreResult<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    let universities = tx.execute(&self.sql.delete_universities_of, params![code])?;
    tx.execute(&self.sql.delete_country, params![code])?;
    tx.commit()?;

    debug!(code, universities, "deleted country");
    Ok(())
  }

  fn replace_universities_for_country(
    &self,
    code: &str,
    universities: &[NewUniversity],
  ) -> StoreResult<()> {
    let now = Utc::now().to_rfc3339();
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let removed = tx.execute(&self.sql.delete_universities_of, params![code])?;
    {
      let mut insert = tx.prepare_cached(&self.sql.insert_university)?;
      for university in universities {
        let domains = serde_json::to_string(&university.domains)?;
        insert.execute(params![code, university.name, university.website, domains, now])?;
      }
    }
    tx.commit()?;

    debug!(code, removed, inserted = universities.len(), "replaced universities");
    Ok(())
  }

  fn query_universities(&self, code: &str) -> StoreResult<Vec<University>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(&self.sql.select_universities)?;
    let rows = stmt.query_map(params![code], row_to_university)?;

    let mut universities = Vec::new();
    for row in rows {
      universities.push(row?);
    }
    Ok(universities)
  }

  fn delete_university(&self, id: i64) -> StoreResult<bool> {
    let affected = self.conn()?.execute(&self.sql.delete_university, params![id])?;
    Ok(affected > 0)
  }

  fn has_any_country_data(&self) -> StoreResult<bool> {
    Ok(self.country_count()? > 0)
  }

  fn country_count(&self) -> StoreResult<usize> {
    let count: i64 = self
      .conn()?
      .query_row(&self.sql.count_countries, [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
  }

  fn clear_all(&self) -> StoreResult<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    tx.execute(&self.sql.delete_all_universities, [])?;
    tx.execute(&self.sql.delete_all_countries, [])?;
    tx.commit()?;

    info!(namespace = self.namespace.prefix(), "cleared cache");
    Ok(())
  }
}

fn row_to_country(row: &Row<'_>) -> rusqlite::Result<Country> {
  Ok(Country {
    code: row.get(0)?,
    common_name: row.get(1)?,
    official_name: row.get(2)?,
    flag_url: row.get(3)?,
    population: row.get(4)?,
    region: row.get(5)?,
    subregion: row.get(6)?,
    created_at: parse_timestamp(row, 7)?,
    updated_at: parse_timestamp(row, 8)?,
  })
}

fn row_to_university(row: &Row<'_>) -> rusqlite::Result<University> {
  let domains: String = row.get(4)?;
  let domains = serde_json::from_str(&domains)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

  Ok(University {
    id: row.get(0)?,
    country_code: row.get(1)?,
    name: row.get(2)?,
    website: row.get(3)?,
    domains,
    created_at: parse_timestamp(row, 5)?,
    updated_at: parse_timestamp(row, 6)?,
  })
}

/// Parse an RFC 3339 timestamp column.
fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
  let s: String = row.get(idx)?;
  DateTime::parse_from_rfc3339(&s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
