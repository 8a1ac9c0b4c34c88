use afriuni::cache::{CacheResult, CacheSource, CacheStore, SqliteStore};
use afriuni::catalog::Catalog;
use afriuni::config::Config;
use afriuni::connectivity::{ConnectivityMonitor, ManualConnectivity};
use afriuni::model::{Country, CountryFilter, University};
use afriuni::remote::RemoteClient;
use afriuni::watch::{watch, WatchEvent};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "afriuni")]
#[command(about = "Offline-first catalog of African countries and universities")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/afriuni/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Never touch the network, serve the local cache only
  #[arg(long)]
  offline: bool,

  /// Log to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List countries, ascending by population
  Countries {
    /// Case-insensitive substring of the common or official name
    #[arg(short, long)]
    search: Option<String>,

    #[arg(long)]
    min_population: Option<i64>,

    #[arg(long)]
    max_population: Option<i64>,
  },

  /// List the universities of a country
  Universities {
    /// Two-letter country code, e.g. KE
    code: String,
  },

  /// Show connectivity and cache state
  Status,

  /// Reload the country list on every connectivity change until Ctrl-C
  Watch,

  /// Delete everything cached for this install
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let db_path = match &config.database_path {
    Some(path) => path.clone(),
    None => SqliteStore::default_path()?,
  };
  let _log_guard = setup_logging(&db_path, args.log_stderr);

  let store = Arc::new(SqliteStore::open(&db_path, config.namespace()?)?);
  let monitor = if args.offline {
    ConnectivityMonitor::new(
      Arc::new(ManualConnectivity::new(false)),
      config.connectivity.interval(),
    )
  } else {
    ConnectivityMonitor::from_config(&config.connectivity)
  };
  let remote = Arc::new(RemoteClient::new(&config.remote)?);
  let catalog = Arc::new(Catalog::new(remote, store, monitor, &config.remote));

  match args.command {
    Command::Countries {
      search,
      min_population,
      max_population,
    } => {
      let filter = CountryFilter {
        search,
        min_population,
        max_population,
      };
      let result = catalog.load_countries(&filter).await?;
      print_source(result.source);
      if result.data.is_empty() && !catalog.has_local_data()? {
        println!("No data cached yet. Connect to the internet and try again.");
      } else {
        print_countries(&result.data);
      }
    }
    Command::Universities { code } => {
      let code = code.to_uppercase();
      let Some(result) = catalog.load_universities_by_code(&code).await? else {
        return Err(eyre!(
          "Unknown country {}. Run `afriuni countries` while online first.",
          code
        ));
      };
      print_source(result.source);
      print_universities(&result.data);
    }
    Command::Status => {
      let online = catalog.monitor().is_online().await;
      println!("Connectivity: {}", if online { "online" } else { "offline" });
      println!("Database:     {}", db_path.display());
      println!("Namespace:    {}", catalog.store().namespace().prefix());
      println!("Countries:    {}", catalog.store().country_count()?);
    }
    Command::Watch => run_watch(catalog).await?,
    Command::Clear => {
      catalog.store().clear_all()?;
      println!("Cache cleared.");
    }
  }

  Ok(())
}

async fn run_watch(catalog: Arc<Catalog<SqliteStore>>) -> Result<()> {
  let monitor = catalog.monitor().clone();
  let (_subscription, mut events) = watch(&monitor, move || {
    let catalog = Arc::clone(&catalog);
    async move { catalog.load_countries(&CountryFilter::default()).await }
  });

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      event = events.recv() => match event {
        Some(WatchEvent::Connectivity(online)) => {
          println!("== {} ==", if online { "online" } else { "offline" });
        }
        Some(WatchEvent::Refreshed(Ok(CacheResult { data, source }))) => {
          print_source(source);
          print_countries(&data);
        }
        Some(WatchEvent::Refreshed(Err(e))) => eprintln!("Failed to read cache: {}", e),
        None => break,
      },
    }
  }

  Ok(())
}

/// Log to a file next to the database, or to stderr when asked to or when
/// the directory is unusable. The guard must live until exit.
fn setup_logging(db_path: &Path, to_stderr: bool) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let log_dir = db_path.parent().filter(|dir| std::fs::create_dir_all(dir).is_ok());
  match log_dir {
    Some(dir) if !to_stderr => {
      let appender = tracing_appender::rolling::never(dir, "afriuni.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    _ => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}

fn print_source(source: CacheSource) {
  if !source.is_local() {
    return;
  }
  match source {
    CacheSource::Offline => println!("(offline, showing cached data)"),
    _ => println!("(network unavailable, showing cached data)"),
  }
}

fn print_countries(countries: &[Country]) {
  if countries.is_empty() {
    println!("No countries match.");
    return;
  }
  for country in countries {
    println!(
      "{:<4} {:<32} {:>12}  {}",
      country.code,
      country.common_name,
      country.population,
      country.subregion.as_deref().unwrap_or("-")
    );
  }
}

fn print_universities(universities: &[University]) {
  if universities.is_empty() {
    println!("No universities cached for this country.");
    return;
  }
  for university in universities {
    println!("{}", university.name);
    if !university.website.is_empty() {
      println!("  {}", university.website);
    }
  }
}
