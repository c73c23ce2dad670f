//! CLI flag overrides on top of `cloudmon-config` profiles.
//!
//! Core never sees these types -- it receives a pre-built `CloudConfig`.

use cloudmon_config::{Config, Profile};
use cloudmon_core::CloudConfig;
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `CloudConfig` from the config file, profile, and CLI overrides.
pub fn build_cloud_config(global: &GlobalOpts) -> Result<CloudConfig, CliError> {
    let cfg = cloudmon_config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg, global);
    }

    // An explicitly requested profile must exist
    if global.profile.is_some() {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    // No profile -- flags / env vars alone
    if global.username.is_none() {
        return Err(CliError::NoConfig {
            path: cloudmon_config::config_path().display().to_string(),
        });
    }
    resolve_profile(&Profile::default(), &profile_name, &cfg, global)
}

/// Apply flag overrides to `profile` and translate it.
///
/// Flags win over everything the profile or keyring provide.
fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<CloudConfig, CliError> {
    let mut merged = profile.clone();
    if let Some(ref url) = global.url {
        merged.url.clone_from(url);
    }
    if global.username.is_some() {
        merged.username.clone_from(&global.username);
    }
    if let Some(ref password) = global.password {
        merged.password = Some(password.clone());
        merged.password_env = None;
    }
    if global.insecure {
        merged.insecure = Some(true);
    }
    if global.timeout.is_some() {
        merged.timeout = global.timeout;
    }

    let mut config = cloudmon_config::profile_to_cloud_config(&merged, profile_name, &cfg.defaults)?;
    if let Some(ref password) = global.password {
        config.password = SecretString::from(password.clone());
    }
    Ok(config)
}
