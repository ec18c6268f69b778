//! Shared configuration for Vitrine tools.
//!
//! TOML profiles, session resolution (env + keyring + plaintext), and
//! translation to `vitrine_core::SyncConfig`. The CLI layers its
//! flag-aware overrides on top.

use std::collections::HashMap;
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

use vitrine_core::{Route, RouteTable, SyncConfig, TlsMode};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "VITRINE_CONFIG";

/// Environment variable holding the session cookie for any profile.
pub const SESSION_ENV: &str = "VITRINE_SESSION";

const KEYRING_SERVICE: &str = "vitrine";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' is not defined")]
    UnknownProfile { name: String },

    #[error("no session configured for profile '{profile}'")]
    NoSession { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

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
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, or the default profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout, e.g. `"30s"`.
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> String {
    "30s".into()
}

/// A named backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API root (e.g., "https://admin.example.com/api/").
    pub api_url: String,

    /// Websocket endpoint; derived from `api_url` when absent.
    pub realtime_url: Option<String>,

    /// Session cookie value (plaintext; prefer keyring or env var).
    pub session: Option<String>,

    /// Environment variable name containing the session cookie.
    pub session_env: Option<String>,

    /// Session cookie name. Defaults to `token`.
    pub cookie_name: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid TLS certificates (development backends).
    pub insecure: Option<bool>,

    /// Durations in humantime form (`"30s"`, `"5m"`).
    pub timeout: Option<String>,
    pub stale_after: Option<String>,
    pub gc_after: Option<String>,
    pub sweep_interval: Option<String>,

    /// Open the realtime channel. Defaults to true.
    pub realtime: Option<bool>,

    /// Per-resource route overrides.
    #[serde(default)]
    pub routes: HashMap<String, RouteOverride>,
}

/// Endpoint override for one resource collection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteOverride {
    pub path: Option<String>,
    /// Query parameter names for the key's parameters, by position.
    #[serde(default)]
    pub query: Vec<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `$VITRINE_CONFIG`, else the platform
/// config directory.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("dev", "vitrine", "vitrine").map_or_else(
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
    p.push("vitrine");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys use `__` between levels, e.g.
/// `VITRINE_PROFILES__DEFAULT__API_URL`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("VITRINE_")
                .ignore(&["CONFIG", "SESSION"])
                .split("__"),
        );

    Ok(figment.extract()?)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Session resolution ──────────────────────────────────────────────

/// Resolve the session cookie: the profile's `session_env` variable,
/// then `$VITRINE_SESSION`, then the system keyring, then plaintext.
pub fn resolve_session(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Env vars
    let env_names = profile.session_env.iter().map(String::as_str).chain([SESSION_ENV]);
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            if !val.is_empty() {
                return Ok(SecretString::from(val));
            }
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref session) = profile.session {
        return Ok(SecretString::from(session.clone()));
    }

    Err(ConfigError::NoSession {
        profile: profile_name.into(),
    })
}

/// Store a session cookie in the system keyring.
pub fn store_session(profile_name: &str, session: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(session)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/session")
}

// ── Profile → SyncConfig ────────────────────────────────────────────

/// Parse a humantime duration field.
pub fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{value}': {e}"),
    })
}

fn optional_duration(field: &str, value: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    value.map(|v| parse_duration(field, v)).transpose()
}

fn parse_url(field: &str, value: &str) -> Result<url::Url, ConfigError> {
    value.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{value}': {e}"),
    })
}

/// Build a `SyncConfig` from a profile. A missing session is not an
/// error here: reads against open endpoints still work without one.
pub fn profile_to_sync_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url)?;
    let mut config = SyncConfig::new(api_url);

    if let Some(ref raw) = profile.realtime_url {
        config.realtime_url = Some(parse_url("realtime_url", raw)?);
    }

    config.session = resolve_session(profile, profile_name).ok();
    if let Some(ref name) = profile.cookie_name {
        config.cookie_name.clone_from(name);
    }

    config.tls = if profile.insecure.unwrap_or(false) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    config.timeout = parse_duration(
        "timeout",
        profile.timeout.as_deref().unwrap_or(&defaults.timeout),
    )?;
    if let Some(d) = optional_duration("stale_after", profile.stale_after.as_deref())? {
        config.stale_after = d;
    }
    if let Some(d) = optional_duration("gc_after", profile.gc_after.as_deref())? {
        config.gc_after = d;
    }
    if let Some(d) = optional_duration("sweep_interval", profile.sweep_interval.as_deref())? {
        config.sweep_interval = d;
    }
    config.realtime_enabled = profile.realtime.unwrap_or(true);

    let mut routes = RouteTable::new();
    for (resource, route) in &profile.routes {
        routes.insert(
            resource.clone(),
            Route {
                path: route.path.clone(),
                query: route.query.clone(),
            },
        );
    }
    config.routes = routes;

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "prod"

[defaults]
output = "json"

[profiles.prod]
api_url = "https://admin.example.com/api/"
session = "plain-token"
stale_after = "2m"
sweep_interval = "10s"
realtime = false

[profiles.prod.routes.networkAddresses]
path = "wallet/addresses"
query = ["network"]
"#;

    #[test]
    fn loads_profiles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.timeout, "30s");

        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "prod");
        assert_eq!(profile.stale_after.as_deref(), Some("2m"));
        assert_eq!(profile.routes["networkAddresses"].query, vec!["network"]);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
        assert!(matches!(
            config.profile(None),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn profile_translates_to_sync_config() {
        let profile = Profile {
            api_url: "https://admin.example.com/api/".into(),
            session: Some("plain-token".into()),
            stale_after: Some("2m".into()),
            gc_after: Some("10m".into()),
            realtime: Some(false),
            insecure: Some(true),
            ..Profile::default()
        };

        let config = profile_to_sync_config(&profile, "vitrine-test-unused", &Defaults::default()).unwrap();

        assert_eq!(config.stale_after, Duration::from_secs(120));
        assert_eq!(config.gc_after, Duration::from_secs(600));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.realtime_enabled);
        assert!(matches!(config.tls, TlsMode::DangerAcceptInvalid));
        assert!(config.session.is_some());
    }

    #[test]
    fn bad_duration_is_a_validation_error() {
        let profile = Profile {
            api_url: "https://admin.example.com/api/".into(),
            stale_after: Some("soon".into()),
            ..Profile::default()
        };
        let err = profile_to_sync_config(&profile, "p", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "stale_after"));
    }

    #[test]
    fn bad_url_is_rejected() {
        let profile = Profile {
            api_url: "not a url".into(),
            ..Profile::default()
        };
        assert!(profile_to_sync_config(&profile, "p", &Defaults::default()).is_err());
    }

    #[test]
    fn session_env_takes_precedence() {
        Jail::expect_with(|jail| {
            jail.set_env("SHOP_SESSION", "from-env");
            let profile = Profile {
                session_env: Some("SHOP_SESSION".into()),
                session: Some("plain".into()),
                ..Profile::default()
            };
            let secret = resolve_session(&profile, "vitrine-test-unused").unwrap();
            assert_eq!(secret.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file_values() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("VITRINE_PROFILES__PROD__API_URL", "https://staging.example.com/api/");
            let config = load_config_from(Path::new("config.toml")).unwrap();
            let (_, profile) = config.profile(Some("prod")).unwrap();
            assert_eq!(profile.api_url, "https://staging.example.com/api/");
            Ok(())
        });
    }
}
