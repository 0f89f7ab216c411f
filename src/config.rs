use std::path::PathBuf;

use thiserror::Error;

pub const MIN_SECRET_CHARS: usize = 16;
const DEV_FALLBACK_SECRET: &str = "raf-dev-secret-min-16-chars";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    fn parse(raw: Option<&str>) -> RunMode {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("development") | Some("dev") => RunMode::Development,
            _ => RunMode::Production,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Development => "development",
            RunMode::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("AUTH_SECRET is not set")]
    MissingSecret,
    #[error("AUTH_SECRET must be at least {min} characters (got {len})")]
    SecretTooShort { len: usize, min: usize },
}

/// HMAC key for session tokens. Only constructible from a secret of at least
/// [`MIN_SECRET_CHARS`] characters.
#[derive(Clone)]
pub struct AuthSecret(String);

impl AuthSecret {
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        let len = s.chars().count();
        if len < MIN_SECRET_CHARS {
            return Err(ConfigError::SecretTooShort {
                len,
                min: MIN_SECRET_CHARS,
            });
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for AuthSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthSecret(..)")
    }
}

/// Resolves the configured secret once. Development builds fall back to a fixed
/// local secret; production never does.
pub fn resolve_secret(raw: Option<&str>, mode: RunMode) -> Result<AuthSecret, ConfigError> {
    let configured = AuthSecret::new(raw.unwrap_or(""));
    match (configured, mode) {
        (Ok(secret), _) => Ok(secret),
        (Err(_), RunMode::Development) => AuthSecret::new(DEV_FALLBACK_SECRET),
        (Err(e), RunMode::Production) => Err(e),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: RunMode,
    pub auth_secret: Result<AuthSecret, ConfigError>,
    pub super_password: Option<String>,
    pub super_hash: Option<String>,
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mode = RunMode::parse(lookup("RAFD_ENV").as_deref());
        let auth_secret = resolve_secret(lookup("AUTH_SECRET").as_deref(), mode);
        Self {
            mode,
            auth_secret,
            super_password: non_empty("AUTH_SUPER_PASSWORD"),
            super_hash: non_empty("AUTH_SUPER_HASH").map(|h| h.to_ascii_lowercase()),
            workspace: non_empty("RAFD_WORKSPACE").map(PathBuf::from),
        }
    }

    pub fn secret(&self) -> Result<&AuthSecret, &ConfigError> {
        self.auth_secret.as_ref()
    }

    pub fn is_production(&self) -> bool {
        self.mode == RunMode::Production
    }
}
