use crate::catalog::FieldSpec;
use crate::core::db::client::{open_client, DatabaseClient};
use crate::core::db::connection::ConnectionConfig;
use crate::core::{DbError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV: &str = "PLANTDB_CONFIG";

/// Name of the profile used by [`connect_default`].
pub const DEFAULT_PROFILE: &str = "default";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Named connection profiles (`[profiles.<name>]`)
    #[serde(default)]
    pub profiles: BTreeMap<String, ConnectionConfig>,
    /// Field catalog entries (`[[fields]]`)
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl Config {
    /// Looks up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&ConnectionConfig> {
        self.profiles.get(name).ok_or_else(|| {
            DbError::Config(format!(
                "no profile named {:?} (known: {})",
                name,
                self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = plantdb::config::load_config("plantdb.toml").expect("Failed to load config");
/// println!("{:?}", config.profiles.keys());
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let content = fs::read_to_string(path)
        .map_err(|e| DbError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(toml::from_str(&content)?)
}

/// `$PLANTDB_CONFIG`, else `<config dir>/plantdb/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("plantdb").join("config.toml"))
        .ok_or_else(|| DbError::Config("no configuration directory on this platform".to_string()))
}

/// Loads the configuration from [`default_config_path`].
pub fn load_default_config() -> Result<Config> {
    load_config(default_config_path()?)
}

/// Opens and connects a client for a named profile.
///
/// Unlike `DatabaseClient::connect`, an unreachable store is reported as an
/// error, since there is no client left for the caller to retry with.
pub fn connect_profile(config: &Config, name: &str) -> Result<Box<dyn DatabaseClient>> {
    let profile = config.profile(name)?;
    let mut client = open_client(profile);
    if !client.connect()? {
        return Err(DbError::connection(format!(
            "cannot connect using profile {:?}",
            name
        )));
    }
    info!("Profile {} connected", name);
    Ok(client)
}

/// Connects with the `default` profile of the default configuration file.
pub fn connect_default() -> Result<Box<dyn DatabaseClient>> {
    connect_profile(&load_default_config()?, DEFAULT_PROFILE)
}
