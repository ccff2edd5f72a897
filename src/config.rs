//! Environment configuration, read once at startup.

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is not a valid number: {value}")]
    NotANumber { name: &'static str, value: String },
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: &'static str },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub media_root: String,
    pub media_url: String,
    pub allowed_origins: Vec<String>,
    pub mail_from: String,
    pub delivery_otp_max_attempts: i32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: number("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            port: number("PORT", 8083)?,
            nats_url: optional("NATS_URL"),
            media_root: optional("MEDIA_ROOT").unwrap_or_else(|| "./media".into()),
            media_url: media_url(optional("MEDIA_URL"))?,
            allowed_origins: optional("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            mail_from: optional("MAIL_FROM").unwrap_or_else(|| "no-reply@linkzur.com".into()),
            delivery_otp_max_attempts: number("DELIVERY_OTP_MAX_ATTEMPTS", 5)?,
        })
    }

    /// Settings for router tests: nothing is read from the environment.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: "postgres://localhost/linkzur_test".into(),
            database_max_connections: 1,
            jwt_secret: jwt_secret.into(),
            port: 0,
            nats_url: None,
            media_root: env::temp_dir().join("linkzur-media").to_string_lossy().into_owned(),
            media_url: "/media/".into(),
            allowed_origins: vec![],
            mail_from: "no-reply@linkzur.test".into(),
            delivery_otp_max_attempts: 5,
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::NotANumber { name, value }),
    }
}

/// The media mount needs at least one path segment; `/` would shadow the API.
fn media_url(raw: Option<String>) -> Result<String, ConfigError> {
    let Some(raw) = raw else { return Ok("/media/".into()) };
    let segment = raw.trim_matches('/');
    if segment.is_empty() {
        return Err(ConfigError::Invalid { name: "MEDIA_URL", reason: "must name a path such as /media/" });
    }
    Ok(format!("/{segment}/"))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|o| !o.is_empty()).map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origins_split_and_trimmed() {
        assert_eq!(parse_origins(" https://a.com, ,https://b.com "), vec!["https://a.com", "https://b.com"]);
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_media_url_needs_a_segment() {
        assert_eq!(media_url(None).unwrap(), "/media/");
        assert_eq!(media_url(Some("files".into())).unwrap(), "/files/");
        assert_eq!(media_url(Some("/static/media/".into())).unwrap(), "/static/media/");
        assert!(matches!(media_url(Some("/".into())), Err(ConfigError::Invalid { name: "MEDIA_URL", .. })));
        assert!(matches!(media_url(Some("///".into())), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_test_config_defaults() {
        let c = Config::for_tests("s");
        assert_eq!(c.delivery_otp_max_attempts, 5);
        assert!(c.nats_url.is_none());
    }
}
