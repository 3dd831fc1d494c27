use std::path::PathBuf;

use chrono::Duration;

use crate::uploads::DocumentKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub document_fields: Vec<DocumentKind>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let token_ttl = match var("TOKEN_TTL_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|m| *m > 0)
                .and_then(Duration::try_minutes)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "TOKEN_TTL_MINUTES",
                    reason: format!("expected a positive number of minutes, got `{}`", raw),
                })?,
            None => Duration::hours(1),
        };

        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
                name: "MAX_UPLOAD_BYTES",
                reason: e.to_string(),
            })?,
            None => 5 * 1024 * 1024,
        };

        let document_fields = match var("DOCUMENT_FIELDS") {
            Some(raw) => parse_document_fields(&raw)?,
            None => DocumentKind::ALL.to_vec(),
        };

        let mut public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000/api/uploads/".to_string());
        if !public_base_url.ends_with('/') {
            public_base_url.push('/');
        }

        Ok(Config {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://students.db?mode=rwc".to_string()),
            jwt_secret,
            token_ttl,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            upload_dir: var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            public_base_url,
            max_upload_bytes,
            document_fields,
        })
    }
}

fn parse_document_fields(raw: &str) -> Result<Vec<DocumentKind>, ConfigError> {
    let mut kinds = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let kind = DocumentKind::from_field_name(name).ok_or_else(|| ConfigError::Invalid {
            name: "DOCUMENT_FIELDS",
            reason: format!("unknown document field `{}`", name),
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.token_ttl, Duration::hours(1));
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.public_base_url, "http://localhost:3000/api/uploads/");
        assert_eq!(config.document_fields.len(), 7);
    }

    #[test]
    fn secret_is_required() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn document_fields_can_be_narrowed() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("DOCUMENT_FIELDS", "cv, pasFoto,cv"),
            ("PUBLIC_BASE_URL", "https://files.example.org/u"),
        ]))
        .unwrap();
        assert_eq!(
            config.document_fields,
            vec![DocumentKind::Cv, DocumentKind::PasFoto]
        );
        assert_eq!(config.public_base_url, "https://files.example.org/u/");
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_MINUTES", "-5"),
        ]))
        .is_err());
        assert!(matches!(
            Config::from_lookup(lookup(&[
                ("JWT_SECRET", "s3cret"),
                ("TOKEN_TTL_MINUTES", "9223372036854775807"),
            ])),
            Err(ConfigError::Invalid { name: "TOKEN_TTL_MINUTES", .. })
        ));
        assert!(Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("DOCUMENT_FIELDS", "avatar"),
        ]))
        .is_err());
    }
}
