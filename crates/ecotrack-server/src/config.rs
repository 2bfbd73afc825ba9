use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use tracing::info;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_MAIL_FROM: &str = "EcoTrack <no-reply@ecotrack.local>";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub cookie_secure: bool,
    pub mail_endpoint: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub frontend_url: String,
    pub admin_email: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("ECOTRACK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ECOTRACK_JWT_SECRET is unset or still a placeholder");
        }

        Ok(Self {
            host: var("ECOTRACK_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(var("ECOTRACK_PORT"), "ECOTRACK_PORT", 4000)?,
            db_path: var("ECOTRACK_DB_PATH")
                .unwrap_or_else(|| "ecotrack.db".into())
                .into(),
            jwt_secret,
            token_ttl_days: parse_or(var("ECOTRACK_TOKEN_TTL_DAYS"), "ECOTRACK_TOKEN_TTL_DAYS", 7)?,
            cookie_secure: parse_or(var("ECOTRACK_COOKIE_SECURE"), "ECOTRACK_COOKIE_SECURE", false)?,
            mail_endpoint: var("ECOTRACK_MAIL_ENDPOINT"),
            mail_api_key: var("ECOTRACK_MAIL_API_KEY"),
            mail_from: var("ECOTRACK_MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.into()),
            frontend_url: var("ECOTRACK_FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".into())
                .trim_end_matches('/')
                .to_string(),
            admin_email: var("ECOTRACK_ADMIN_EMAIL"),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw.parse().with_context(|| format!("invalid {key} value '{raw}'")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = load(&[("ECOTRACK_JWT_SECRET", "a-long-random-value")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4000);
        assert_eq!(config.db_path, PathBuf::from("ecotrack.db"));
        assert_eq!(config.token_ttl_days, 7);
        assert!(!config.cookie_secure);
        assert!(config.mail_endpoint.is_none());
        assert_eq!(config.mail_from, DEFAULT_MAIL_FROM);
        assert_eq!(config.frontend_url, "http://localhost:5173");
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(load(&[]).is_err());
        assert!(load(&[("ECOTRACK_JWT_SECRET", "  ")]).is_err());
        assert!(load(&[("ECOTRACK_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = load(&[("ECOTRACK_JWT_SECRET", "a-long-random-value"), ("ECOTRACK_PORT", "eighty")])
            .unwrap_err();
        assert!(err.to_string().contains("ECOTRACK_PORT"));
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            ("ECOTRACK_JWT_SECRET", "a-long-random-value"),
            ("ECOTRACK_PORT", "8080"),
            ("ECOTRACK_COOKIE_SECURE", "true"),
            ("ECOTRACK_MAIL_ENDPOINT", "https://mail.example/send"),
            ("ECOTRACK_FRONTEND_URL", "https://eco.example/"),
            ("ECOTRACK_ADMIN_EMAIL", "ada@example.com"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.cookie_secure);
        assert_eq!(config.mail_endpoint.as_deref(), Some("https://mail.example/send"));
        assert_eq!(config.frontend_url, "https://eco.example");
        assert_eq!(config.admin_email.as_deref(), Some("ada@example.com"));
    }
}
