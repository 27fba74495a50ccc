//! Shared configuration for ARCL clients.
//!
//! TOML profiles, password resolution (env + keyring + plaintext),
//! translation to `arcl_core::EngineConfig`, and tracing setup.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use arcl_api::ConnectionSettings;
use arcl_core::{EngineConfig, ExtIoSpec};

const KEYRING_SERVICE: &str = "arcl";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("logging setup failed: {reason}")]
    Logging { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            logging: LoggingConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Settings shared by every profile. Intervals use humantime syntax.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Connect and login timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Poll interval for robots, status, range devices and external I/O.
    #[serde(default = "default_poll")]
    pub poll: String,

    /// Delay before re-dumping after creating external I/O sets.
    #[serde(default = "default_redump")]
    pub redump: String,

    /// Default bound for modify, cancel and section reads.
    #[serde(default = "default_wait")]
    pub wait: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            poll: default_poll(),
            redump: default_redump(),
            wait: default_wait(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}
fn default_poll() -> String {
    "500ms".into()
}
fn default_redump() -> String {
    "10s".into()
}
fn default_wait() -> String {
    "10s".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

/// A named ARCL server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// `ip:port` of the server.
    pub address: String,

    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override poll interval.
    pub poll: Option<String>,

    /// External I/O sets to create on the server.
    #[serde(default)]
    pub io: Vec<ExtIoSpec>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "arcl", "arcl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("arcl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`; a missing file just leaves the defaults in place.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ARCL_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a profile's password: env var, then keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

fn parse_interval(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let interval = humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{raw}': {e}"),
    })?;
    if interval.is_zero() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(interval)
}

/// Build an `EngineConfig` from a profile and the shared defaults.
pub fn profile_to_engine_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<EngineConfig, ConfigError> {
    let addr: SocketAddrV4 = profile
        .address
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "address".into(),
            reason: format!("expected ip:port, got '{}'", profile.address),
        })?;

    let password = resolve_password(profile, profile_name)?;
    let connection = ConnectionSettings::new(*addr.ip(), addr.port(), password).map_err(|e| {
        ConfigError::Validation {
            field: "password".into(),
            reason: e.to_string(),
        }
    })?;

    let poll = parse_interval("poll", profile.poll.as_deref().unwrap_or(&defaults.poll))?;

    let mut config = EngineConfig::new(connection).with_desired_io(profile.io.clone());
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.robot_poll_interval = poll;
    config.status_poll_interval = poll;
    config.range_poll_interval = poll;
    config.extio_poll_interval = poll;
    config.extio_redump_delay = parse_interval("redump", &defaults.redump)?;
    config.wait_timeout = parse_interval("wait", &defaults.wait)?;
    Ok(config)
}

// ── Logging ─────────────────────────────────────────────────────────

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| ConfigError::Logging {
            reason: format!("bad level '{}': {e}", logging.level),
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if logging.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| ConfigError::Logging {
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const CONFIG: &str = r#"
        default_profile = "lab"

        [defaults]
        timeout = 3
        poll = "250ms"

        [logging]
        level = "arcl_core=debug"

        [profiles.lab]
        address = "192.168.0.20:7171"
        password = "adept"

        [[profiles.lab.io]]
        name = "Bay1"
        inputs = 16
        outputs = 8
    "#;

    fn profile(address: &str) -> Profile {
        Profile {
            address: address.into(),
            password: Some("adept".into()),
            password_env: None,
            timeout: None,
            poll: None,
            io: Vec::new(),
        }
    }

    #[test]
    fn loads_file_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", CONFIG)?;
            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.default_profile.as_deref(), Some("lab"));
            assert_eq!(config.defaults.timeout, 3);
            assert_eq!(config.defaults.redump, "10s");
            assert_eq!(config.logging.level, "arcl_core=debug");
            assert!(!config.logging.json);

            let (name, lab) = config.profile(None).map_err(|e| e.to_string())?;
            assert_eq!(name, "lab");
            assert_eq!(lab.io, vec![ExtIoSpec::new("Bay1", 16, 8)]);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", CONFIG)?;
            jail.set_env("ARCL_DEFAULTS_TIMEOUT", "9");
            jail.set_env("ARCL_LOGGING_JSON", "true");
            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.defaults.timeout, 9);
            assert!(config.logging.json);
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let config = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.defaults.poll, "500ms");
            assert!(config.profiles.is_empty());
            assert!(matches!(
                config.profile(None),
                Err(ConfigError::UnknownProfile { ref profile }) if profile == "default"
            ));
            Ok(())
        });
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert("lab".into(), profile("10.0.0.5:7171"));
        save_config_to(&config, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[profiles.lab]"));
        let loaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(loaded.profiles["lab"].address, "10.0.0.5:7171");
    }

    #[test]
    fn password_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("ARCL_LAB_SECRET", "from-env");
            let mut lab = profile("10.0.0.5:7171");
            lab.password_env = Some("ARCL_LAB_SECRET".into());

            let secret = resolve_password(&lab, "jail-lab").map_err(|e| e.to_string())?;
            assert_eq!(secret.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn no_password_anywhere_is_an_error() {
        let mut lab = profile("10.0.0.5:7171");
        lab.password = None;
        assert!(matches!(
            resolve_password(&lab, "no-such-arcl-profile"),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn profile_builds_engine_config() {
        let mut lab = profile("192.168.0.20:7171");
        lab.io = vec![ExtIoSpec::new("Bay1", 16, 8)];
        lab.timeout = Some(7);

        let defaults = Defaults {
            poll: "250ms".into(),
            ..Defaults::default()
        };
        let config = profile_to_engine_config(&lab, "lab", &defaults).unwrap();

        assert_eq!(config.connection.port, 7171);
        assert_eq!(config.connection.host.octets(), [192, 168, 0, 20]);
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert_eq!(config.robot_poll_interval, Duration::from_millis(250));
        assert_eq!(config.extio_poll_interval.as_secs_f64(), 0.25);
        assert_eq!(config.extio_redump_delay, Duration::from_secs(10));
        assert_eq!(config.desired_io.len(), 1);
    }

    #[test]
    fn bad_profile_values_are_rejected() {
        let defaults = Defaults::default();

        let err = profile_to_engine_config(&profile("robot.local"), "lab", &defaults).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "address"));

        let mut lab = profile("10.0.0.5:7171");
        lab.poll = Some("soon".into());
        let err = profile_to_engine_config(&lab, "lab", &defaults).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "poll"));

        lab.poll = Some("0s".into());
        assert!(profile_to_engine_config(&lab, "lab", &defaults).is_err());
    }

    #[test]
    fn bad_level_is_reported_not_panicked() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let logging = LoggingConfig {
                level: "arcl=loud".into(),
                json: false,
            };
            assert!(matches!(init_tracing(&logging), Err(ConfigError::Logging { .. })));
            Ok(())
        });
    }
}
