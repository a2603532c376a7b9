use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default public Astrometry.net API endpoint
pub const DEFAULT_ASTROMETRY_URL: &str = "https://nova.astrometry.net/api";

/// Configuration for the Skymmich server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// URL for the database connection
    pub database_url: String,
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,
    /// Base URL of the Immich server, e.g. `http://immich.local:2283`
    pub immich_url: Option<String>,
    pub immich_api_key: Option<String>,
    /// Base URL of the Astrometry.net API
    pub astrometry_url: String,
    pub astrometry_api_key: Option<String>,
    /// Directory XMP sidecars are written to
    pub sidecar_dir: Option<PathBuf>,
    /// Directory for rolling log files; logs only go to stderr when unset
    pub log_dir: Option<PathBuf>,
    /// Minutes between automatic Immich syncs, 0 disables them
    pub sync_interval_minutes: u64,
    /// Seconds between plate-solve worker ticks
    pub poll_interval_seconds: u64,
    /// Failed attempts before a plate-solve job is marked failed
    pub max_solve_attempts: u32,
    /// Minutes a submission may spend solving before it is abandoned
    pub solve_timeout_minutes: u64,
}

/// Update structure for Config with all fields optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ConfigUpdate {
    pub database_url: Option<String>,
    pub listen_addr: Option<SocketAddr>,
    pub immich_url: Option<String>,
    pub immich_api_key: Option<String>,
    pub astrometry_url: Option<String>,
    pub astrometry_api_key: Option<String>,
    pub sidecar_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub sync_interval_minutes: Option<u64>,
    pub poll_interval_seconds: Option<u64>,
    pub max_solve_attempts: Option<u32>,
    pub solve_timeout_minutes: Option<u64>,
    /// Server URL used by the CLI client; ignored by the server
    pub server_url: Option<String>,
}

/// Command line arguments for the server
#[derive(Parser, Debug, Default)]
#[clap(name = "skymmich", about = "Astrophotography gallery backed by Immich and Astrometry.net")]
pub struct CliArgs {
    /// Path to a config file (defaults to config.toml in the platform config directory)
    #[clap(long, env = "SKYMMICH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database URL
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Address to listen on
    #[clap(long, env = "SKYMMICH_LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// Immich server URL
    #[clap(long, env = "IMMICH_URL")]
    pub immich_url: Option<String>,

    /// Immich API key
    #[clap(long, env = "IMMICH_API_KEY", hide_env_values = true)]
    pub immich_api_key: Option<String>,

    /// Astrometry.net API URL
    #[clap(long, env = "ASTROMETRY_URL")]
    pub astrometry_url: Option<String>,

    /// Astrometry.net API key
    #[clap(long, env = "ASTROMETRY_API_KEY", hide_env_values = true)]
    pub astrometry_api_key: Option<String>,

    /// Directory to write XMP sidecars to
    #[clap(long, env = "SKYMMICH_SIDECAR_DIR")]
    pub sidecar_dir: Option<PathBuf>,

    /// Directory for log files
    #[clap(long, env = "SKYMMICH_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Minutes between automatic syncs (0 disables)
    #[clap(long, env = "SKYMMICH_SYNC_INTERVAL_MINUTES")]
    pub sync_interval_minutes: Option<u64>,

    /// Seconds between plate-solve polls
    #[clap(long, env = "SKYMMICH_POLL_INTERVAL_SECONDS")]
    pub poll_interval_seconds: Option<u64>,

    /// Attempts before a plate-solve job fails
    #[clap(long, env = "SKYMMICH_MAX_SOLVE_ATTEMPTS")]
    pub max_solve_attempts: Option<u32>,

    /// Minutes before a running solve is abandoned
    #[clap(long, env = "SKYMMICH_SOLVE_TIMEOUT_MINUTES")]
    pub solve_timeout_minutes: Option<u64>,

    /// Debug mode
    #[clap(long, env = "SKYMMICH_DEBUG", default_value_t = false)]
    pub debug: bool,
}

impl Config {
    /// Applies a config update to the current configuration
    pub fn apply_update(self, update: ConfigUpdate) -> Self {
        Self {
            database_url: update.database_url.unwrap_or(self.database_url),
            listen_addr: update.listen_addr.unwrap_or(self.listen_addr),
            immich_url: update.immich_url.or(self.immich_url),
            immich_api_key: update.immich_api_key.or(self.immich_api_key),
            astrometry_url: update.astrometry_url.unwrap_or(self.astrometry_url),
            astrometry_api_key: update.astrometry_api_key.or(self.astrometry_api_key),
            sidecar_dir: update.sidecar_dir.or(self.sidecar_dir),
            log_dir: update.log_dir.or(self.log_dir),
            sync_interval_minutes: update.sync_interval_minutes.unwrap_or(self.sync_interval_minutes),
            poll_interval_seconds: update.poll_interval_seconds.unwrap_or(self.poll_interval_seconds),
            max_solve_attempts: update.max_solve_attempts.unwrap_or(self.max_solve_attempts),
            solve_timeout_minutes: update.solve_timeout_minutes.unwrap_or(self.solve_timeout_minutes),
        }
    }

    /// Returns the plate-solve poll interval, never shorter than one second
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    /// Returns the automatic sync interval, or None when disabled
    pub fn sync_interval(&self) -> Option<Duration> {
        match self.sync_interval_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        }
    }

    /// Returns how long a submission may stay unsolved
    pub fn solve_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.solve_timeout_minutes.min(i32::MAX as u64) as i64)
    }
}

/// Returns the base (default) configuration
pub fn base_config(config_path: Option<PathBuf>) -> Config {
    let database_url = config_path.map_or("skymmich.db".to_string(), |path| {
        path.join("skymmich.db").to_string_lossy().to_string()
    });

    Config {
        database_url,
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        immich_url: None,
        immich_api_key: None,
        astrometry_url: DEFAULT_ASTROMETRY_URL.to_string(),
        astrometry_api_key: None,
        sidecar_dir: None,
        log_dir: None,
        sync_interval_minutes: 60,
        poll_interval_seconds: 10,
        max_solve_attempts: 3,
        solve_timeout_minutes: 30,
    }
}

/// Loads configuration from a TOML file
///
/// A missing path or missing file yields an empty update; unreadable or
/// malformed files are reported as errors.
pub fn config_from_file(config_path: Option<PathBuf>) -> Result<ConfigUpdate, String> {
    let Some(config_path) = config_path else {
        return Ok(ConfigUpdate::default());
    };

    if !config_path.exists() {
        info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(ConfigUpdate::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        warn!("Failed to read config file: {}", e);
        format!("Failed to read config file: {}", e)
    })?;

    toml::from_str::<ConfigUpdate>(&content)
        .map(|config| {
            info!("Loaded configuration from {:?}", config_path);
            config
        })
        .map_err(|e| {
            warn!("Failed to parse config file: {}", e);
            format!("Failed to parse config file: {}", e)
        })
}

/// Loads configuration from command line arguments
pub fn config_from_args(args: CliArgs) -> ConfigUpdate {
    ConfigUpdate {
        database_url: args.database_url,
        listen_addr: args.listen_addr,
        immich_url: args.immich_url,
        immich_api_key: args.immich_api_key,
        astrometry_url: args.astrometry_url,
        astrometry_api_key: args.astrometry_api_key,
        sidecar_dir: args.sidecar_dir,
        log_dir: args.log_dir,
        sync_interval_minutes: args.sync_interval_minutes,
        poll_interval_seconds: args.poll_interval_seconds,
        max_solve_attempts: args.max_solve_attempts,
        solve_timeout_minutes: args.solve_timeout_minutes,
        server_url: None,
    }
}

/// Returns the platform config directory for Skymmich, if one can be determined
pub fn get_config_dir_path() -> Option<PathBuf> {
    match ProjectDirs::from("com", "skymmich", "skymmich") {
        Some(proj_dirs) => Some(proj_dirs.config_dir().to_path_buf()),
        None => {
            warn!("Could not determine platform config directory, skipping config file");
            None
        }
    }
}

/// Gets the complete configuration by combining defaults with
/// values from config file, environment variables, and command line arguments
/// in order of increasing precedence
pub fn get_config(mut args: CliArgs) -> Config {
    let config_dir = get_config_dir_path().filter(|path| {
        if path.exists() {
            true
        } else {
            info!("Config path not found at {:?}, using defaults", path);
            false
        }
    });

    let config_file = args
        .config
        .take()
        .or_else(|| config_dir.as_ref().map(|dir| dir.join("config.toml")));

    let config = base_config(config_dir)
        .apply_update(config_from_file(config_file).unwrap_or_default())
        .apply_update(config_from_args(args));

    info!(
        "Final configuration: database_url={}, listen_addr={}, immich={}, astrometry={}, sync_interval={}min",
        config.database_url,
        config.listen_addr,
        config.immich_url.as_deref().unwrap_or("<unset>"),
        config.astrometry_url,
        config.sync_interval_minutes,
    );

    config
}

#[cfg(test)]
mod tests;
