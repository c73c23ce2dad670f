//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use cloudmon_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

/// A profile as shown to the user. Passwords are never printed, only
/// where they come from.
#[derive(Clone, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Default")]
    default: bool,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Password")]
    password: String,
}

impl ProfileRow {
    fn new(name: &str, profile: &Profile, cfg: &Config) -> Self {
        let password = match (&profile.password_env, &profile.password) {
            (Some(var), _) => format!("env:{var}"),
            (None, Some(_)) => "plaintext".into(),
            (None, None) => "keyring".into(),
        };
        Self {
            name: name.to_owned(),
            default: cfg.default_profile.as_deref() == Some(name),
            url: profile.url.clone(),
            username: profile.username.clone().unwrap_or_else(|| "-".into()),
            password,
        }
    }
}

fn profile_rows(cfg: &Config) -> Vec<ProfileRow> {
    let mut rows: Vec<ProfileRow> = cfg
        .profiles
        .iter()
        .map(|(name, profile)| ProfileRow::new(name, profile, cfg))
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = cloudmon_config::load_config_or_default();
            if !global.quiet {
                eprintln!("Config: {}", cloudmon_config::config_path().display());
                eprintln!(
                    "Default profile: {}",
                    cfg.default_profile.as_deref().unwrap_or("-")
                );
                eprintln!(
                    "Timeout: {}s, overflow: {}, registration retries: {}",
                    cfg.defaults.timeout,
                    cfg.defaults.monitor.overflow,
                    cfg.defaults.monitor.registration_retries
                );
            }
            let rows = profile_rows(&cfg);
            let out = output::render_list(
                &global.output,
                &rows,
                ProfileRow::clone,
                |r| r.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &cloudmon_config::config_path().display().to_string(),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = cloudmon_config::load_config_or_default();
            let names: Vec<String> = profile_rows(&cfg).into_iter().map(|r| r.name).collect();
            output::print_output(&names.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::AddProfile {
            name,
            url,
            username,
        } => {
            let mut cfg = cloudmon_config::load_config_or_default();
            let profile = cfg.profiles.entry(name.clone()).or_default();
            if let Some(url) = url {
                url.parse::<url::Url>().map_err(|_| CliError::Validation {
                    field: "url".into(),
                    reason: format!("invalid URL: {url}"),
                })?;
                profile.url = url;
            }
            profile.username = Some(username);

            if cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }
            cloudmon_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Profile '{name}' saved");
                eprintln!("  Store its password with: cloudmon config set-password --profile {name}");
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = cloudmon_config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
                available.sort_unstable();
                return Err(CliError::ProfileNotFound {
                    name,
                    available: available.join(", "),
                });
            }
            cfg.default_profile = Some(name.clone());
            cloudmon_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetPassword { profile } => {
            let cfg = cloudmon_config::load_config_or_default();
            let name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            let password = rpassword::prompt_password(format!("Password for '{name}': "))?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            cloudmon_config::store_password(&name, &password)?;
            if !global.quiet {
                eprintln!("Password for '{name}' stored in system keyring");
            }
            Ok(())
        }
    }
}
