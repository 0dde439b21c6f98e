use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Scheme prefix some hosting providers still hand out
pub const LEGACY_POSTGRES_SCHEME: &str = "postgres://";
/// The spelling database drivers expect
pub const POSTGRES_SCHEME: &str = "postgresql://";

/// Default location of the rendered diagram
pub const DEFAULT_DIAGRAM_OUTPUT: &str = "diagram.svg";

#[derive(Debug, Deserialize)]
pub struct Database {
    /// Connection string of the database to introspect
    pub url: Option<String>,
    /// SQLite file used by the store
    pub path: String,
}

impl Database {
    /// The configured connection string with its scheme normalized.
    ///
    /// Returns `None` when the value is missing or blank.
    pub fn connection_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(normalize_database_url)
    }
}

#[derive(Debug, Deserialize)]
pub struct Diagram {
    pub output: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: Database,
    pub diagram: Diagram,
}

impl Settings {
    /// Load settings from `settings.toml` (if present) and the process environment.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Load settings, reading environment overrides through `env`.
    pub fn load<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();

        // 1. Try to load from settings.toml (optional)
        let config_file_name = "settings.toml";

        let current_dir_path = PathBuf::from(config_file_name);
        if current_dir_path.exists() {
            builder = builder.add_source(File::from(current_dir_path).required(false));
        }

        // 2. Defaults, then environment variables (highest priority)
        builder = builder
            .set_default("database.path", "snapgram.db")?
            .set_default("diagram.output", DEFAULT_DIAGRAM_OUTPUT)?;

        if let Some(url) = env("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }
        if let Some(path) = env("DATABASE_PATH") {
            builder = builder.set_override("database.path", path)?;
        }
        if let Some(output) = env("DIAGRAM_OUTPUT") {
            builder = builder.set_override("diagram.output", output)?;
        }

        let s = builder.build()?;
        s.try_deserialize()
    }
}

/// Rewrite a leading `postgres://` to `postgresql://`, leaving the rest untouched.
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix(LEGACY_POSTGRES_SCHEME) {
        Some(rest) => format!("{POSTGRES_SCHEME}{rest}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::load(|key| vars.get(key).cloned()).expect("Failed to load settings")
    }

    #[test]
    fn test_normalize_legacy_scheme() {
        assert_eq!(
            normalize_database_url("postgres://host/db"),
            "postgresql://host/db"
        );
    }

    #[test]
    fn test_normalize_leaves_other_urls_alone() {
        for url in [
            "postgresql://host/db",
            "sqlite://snapgram.db",
            "mysql://postgres://nested",
            " postgres://host/db",
        ] {
            assert_eq!(normalize_database_url(url), url);
        }
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = load_with(&[]);
        assert!(settings.database.url.is_none());
        assert!(settings.database.connection_url().is_none());
        assert_eq!(settings.database.path, "snapgram.db");
        assert_eq!(settings.diagram.output, DEFAULT_DIAGRAM_OUTPUT);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = load_with(&[
            ("DATABASE_URL", "postgres://u:p@db.example.com:5432/snapgram"),
            ("DATABASE_PATH", "/tmp/other.db"),
            ("DIAGRAM_OUTPUT", "docs/schema.svg"),
        ]);
        assert_eq!(
            settings.database.connection_url().as_deref(),
            Some("postgresql://u:p@db.example.com:5432/snapgram")
        );
        assert_eq!(settings.database.path, "/tmp/other.db");
        assert_eq!(settings.diagram.output, "docs/schema.svg");
    }

    #[test]
    fn test_blank_url_counts_as_missing() {
        let settings = load_with(&[("DATABASE_URL", "   ")]);
        assert!(settings.database.connection_url().is_none());
    }

    proptest! {
        #[test]
        fn prop_normalize_only_touches_scheme(rest in ".*") {
            let url = format!("postgres://{rest}");
            prop_assert_eq!(normalize_database_url(&url), format!("postgresql://{rest}"));
        }

        #[test]
        fn prop_normalize_is_identity_elsewhere(url in "[a-z]{0,10}://.*") {
            prop_assume!(!url.starts_with(LEGACY_POSTGRES_SCHEME));
            prop_assert_eq!(normalize_database_url(&url), url);
        }
    }
}
