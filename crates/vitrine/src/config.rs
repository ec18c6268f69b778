//! Flag-aware profile resolution on top of `vitrine-config`.
//!
//! Precedence: command-line flag > environment > profile > defaults.

use std::time::Duration;

use secrecy::SecretString;

use vitrine_config::{Config, Profile};
use vitrine_core::{SyncConfig, TlsMode};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `SyncConfig` from the config file, profile, and CLI overrides.
pub fn build_sync_config(global: &GlobalOpts, cmd: &Command) -> Result<SyncConfig, CliError> {
    let cfg = vitrine_config::load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut config = match cfg.profiles.get(&profile_name) {
        Some(profile) => resolve_profile(profile, &profile_name, &cfg, global)?,
        None => from_flags(global, &cfg, &profile_name)?,
    };

    // One-shot commands never need pushes or background sweeps.
    if !cmd.wants_realtime() {
        config.realtime_enabled = false;
        config.sweep_interval = Duration::ZERO;
    }
    Ok(config)
}

fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<SyncConfig, CliError> {
    let mut profile = profile.clone();
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }

    let mut config = vitrine_config::profile_to_sync_config(&profile, profile_name, &cfg.defaults)?;
    apply_overrides(&mut config, global);
    Ok(config)
}

/// No profile by that name: the API URL must come from flags or env.
fn from_flags(global: &GlobalOpts, cfg: &Config, profile_name: &str) -> Result<SyncConfig, CliError> {
    let Some(url_str) = global.api_url.as_deref() else {
        if global.profile.is_some() {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name.into(),
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
                path: vitrine_config::config_path().display().to_string(),
            });
        }
        return Err(CliError::NoConfig {
            path: vitrine_config::config_path().display().to_string(),
        });
    };

    let url: url::Url = url_str.parse().map_err(|_| CliError::Validation {
        field: "api-url".into(),
        reason: format!("invalid URL: {url_str}"),
    })?;

    let mut config = SyncConfig::new(url);
    config.timeout = vitrine_config::parse_duration("timeout", &cfg.defaults.timeout)?;
    apply_overrides(&mut config, global);
    Ok(config)
}

fn apply_overrides(config: &mut SyncConfig, global: &GlobalOpts) {
    if let Some(ref session) = global.session {
        config.session = Some(SecretString::from(session.clone()));
    }
    if global.insecure {
        config.tls = TlsMode::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        config.timeout = timeout;
    }
}
