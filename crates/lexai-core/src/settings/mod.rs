pub mod model;
pub mod repository;

pub use model::{FileTypeRule, LexaiSettings, ModelSettings, accepted_labels, default_file_types};
pub use repository::{JsonSettingsRepository, SettingsError, SettingsRepository, SettingsResult};

/// Environment variables consulted for the remote model API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

/// Read the API key from the environment.
pub fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}
