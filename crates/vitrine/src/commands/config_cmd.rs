//! Config subcommand handlers.

use std::io::BufRead;

use vitrine_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::active_profile_name;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&vitrine_config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = vitrine_config::load_config()?;
            redact(&mut cfg);
            let rendered = toml::to_string_pretty(&cfg).map_err(vitrine_config::ConfigError::from)?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::SetSession => {
            let cfg = vitrine_config::load_config_or_default();
            let profile_name = active_profile_name(global, &cfg);

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let session = line.trim();
            if session.is_empty() {
                return Err(CliError::Validation {
                    field: "session".into(),
                    reason: "expected the cookie value on stdin".into(),
                });
            }

            vitrine_config::store_session(&profile_name, session)?;
            output::status(
                &format!("Session stored in system keyring for profile '{profile_name}'"),
                output::should_color(global.color),
                global.quiet,
            );
            Ok(())
        }
    }
}

fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.session.is_some() {
            profile.session = Some(REDACTED.into());
        }
    }
}
