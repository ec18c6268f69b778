//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use vitrine_config::ConfigError;
use vitrine_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the API: {reason}")]
    #[diagnostic(
        code(vitrine::connection_failed),
        help(
            "Check that the backend is running and the api_url in your profile is right.\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(vitrine::timeout),
        help("Increase the timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Session expired or missing")]
    #[diagnostic(
        code(vitrine::auth_expired),
        help(
            "Sign in to the admin panel again and store the new cookie:\n\
             vitrine config set-session --profile {profile}\n\
             Or set the VITRINE_SESSION environment variable."
        )
    )]
    AuthExpired { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(vitrine::not_found), help("Run: vitrine list {resource}"))]
    NotFound { resource: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(vitrine::in_flight),
        help("Wait for the pending change to finish and try again.")
    )]
    Conflict { message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(vitrine::api_error))]
    Api { status: Option<u16>, message: String },

    #[error("Realtime channel: {reason}")]
    #[diagnostic(code(vitrine::realtime))]
    Realtime { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vitrine::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(vitrine::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Add one under [profiles.{name}] in {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("No API URL configured")]
    #[diagnostic(
        code(vitrine::no_config),
        help(
            "Pass --api-url, set VITRINE_API_URL, or create a profile.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(vitrine::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(vitrine::json), help("Check the JSON document and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Realtime { .. } => exit_code::CONNECTION,
            Self::AuthExpired { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) | Self::NoConfig { .. } => exit_code::USAGE,
            Self::Api { .. } | Self::Config(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }

    /// Like `From<CoreError>`, with context for help text.
    pub fn from_core(err: CoreError, profile: &str, resource: &str) -> Self {
        match err {
            CoreError::MutationFailed { message, cause } => {
                // Keep the user-facing text, classify by the cause.
                match Self::from_core(*cause, profile, resource) {
                    Self::Api { status, .. } => Self::Api { status, message },
                    Self::NotFound { resource, .. } => Self::NotFound { resource, message },
                    other => other,
                }
            }
            CoreError::AuthExpired => Self::AuthExpired {
                profile: profile.into(),
            },
            CoreError::Server {
                status: 404,
                message,
            } => Self::NotFound {
                resource: resource.into(),
                message: message.unwrap_or_else(|| format!("Not found in {resource}")),
            },
            other => other.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Network { reason } => Self::ConnectionFailed { reason },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Server { status, .. } => {
                let message = err.user_message(&format!("Server error (HTTP {status})"));
                Self::Api {
                    status: Some(status),
                    message,
                }
            }
            CoreError::Shape { message } | CoreError::Internal(message) => Self::Api {
                status: None,
                message,
            },
            CoreError::AuthExpired => Self::AuthExpired {
                profile: "current".into(),
            },
            CoreError::AlreadyInFlight { .. } | CoreError::StaleBase { .. } => Self::Conflict {
                message: err.to_string(),
            },
            CoreError::MutationFailed { message, .. } => Self::Api {
                status: None,
                message,
            },
            CoreError::Realtime { reason } => Self::Realtime { reason },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_failure_keeps_server_text() {
        let err = CoreError::MutationFailed {
            message: "Price must be positive".into(),
            cause: Box::new(CoreError::Server {
                status: 422,
                message: Some("Price must be positive".into()),
            }),
        };
        let cli = CliError::from_core(err, "default", "products");
        assert_eq!(cli.to_string(), "Price must be positive");
        assert_eq!(cli.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn expired_session_maps_to_auth_exit_code() {
        let err = CoreError::MutationFailed {
            message: "Failed to delete product".into(),
            cause: Box::new(CoreError::AuthExpired),
        };
        let cli = CliError::from_core(err, "prod", "products");
        assert!(matches!(cli, CliError::AuthExpired { ref profile } if profile == "prod"));
        assert_eq!(cli.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn missing_item_is_not_found() {
        let err = CoreError::Server {
            status: 404,
            message: None,
        };
        let cli = CliError::from_core(err, "default", "products");
        assert_eq!(cli.exit_code(), exit_code::NOT_FOUND);
        assert_eq!(cli.to_string(), "Not found in products");
    }

    #[test]
    fn in_flight_is_a_conflict() {
        let cli = CliError::from(CoreError::AlreadyInFlight {
            key: "products".into(),
            item: "1".into(),
        });
        assert_eq!(cli.exit_code(), exit_code::CONFLICT);
    }
}
