use serde::Deserialize;

use crate::error::AppError;

/// Service configuration.
///
/// Sources, later ones overriding earlier ones:
/// - built-in defaults
/// - `internconnect.toml` in the working directory (optional)
/// - environment variables prefixed with `INTERNCONNECT_`, nested keys
///   separated by `__` (e.g. `INTERNCONNECT_SMTP__HOST`)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub otp_ttl_minutes: i64,
    pub upload_max_bytes: usize,
    /// Set the `Secure` attribute on the auth cookie.
    pub secure_cookies: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// When set, uploads go to this S3 bucket instead of `upload_dir`.
    pub s3_bucket: Option<String>,
    /// Custom endpoint for MinIO / LocalStack.
    pub s3_endpoint: Option<String>,
    pub upload_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            s3_bucket: None,
            s3_endpoint: None,
            upload_dir: "./uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Without a host, mail is only logged.
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: "InternConnect <no-reply@internconnect.local>".to_string(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from file and environment.
    pub fn load() -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .set_default("bind_addr", "0.0.0.0:5000")
            .and_then(|b| b.set_default("mongodb_uri", "mongodb://localhost:27017"))
            .and_then(|b| b.set_default("mongodb_database", "internconnect"))
            .and_then(|b| b.set_default("jwt_ttl_hours", 24))
            .and_then(|b| b.set_default("otp_ttl_minutes", 10))
            .and_then(|b| b.set_default("upload_max_bytes", 5 * 1024 * 1024))
            .and_then(|b| b.set_default("secure_cookies", false))
            .map_err(|e| AppError::Internal(format!("Invalid config default: {e}")))?
            .add_source(config::File::with_name("internconnect").required(false))
            .add_source(
                config::Environment::with_prefix("INTERNCONNECT")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors_origins")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to load configuration: {e}")))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| AppError::Internal(format!("Invalid configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.jwt_secret.trim().len() < 16 {
            return Err(AppError::Internal(
                "INTERNCONNECT_JWT_SECRET must be set to at least 16 characters".into(),
            ));
        }
        if self.jwt_ttl_hours <= 0 {
            return Err(AppError::Internal("jwt_ttl_hours must be positive".into()));
        }
        if self.otp_ttl_minutes <= 0 {
            return Err(AppError::Internal("otp_ttl_minutes must be positive".into()));
        }
        Ok(())
    }

    /// Build with explicit values (useful for testing).
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_database: "internconnect_test".to_string(),
            jwt_secret: jwt_secret.to_string(),
            jwt_ttl_hours: 24,
            otp_ttl_minutes: 10,
            upload_max_bytes: 5 * 1024 * 1024,
            secure_cookies: false,
            cors_origins: vec![],
            storage: StorageConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_rejected() {
        let config = AppConfig::for_tests("short");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_config_is_valid() {
        let config = AppConfig::for_tests("a-sufficiently-long-secret");
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.upload_dir, "./uploads");
        assert!(config.smtp.host.is_none());
    }

    #[test]
    fn test_nonpositive_ttl_rejected() {
        let mut config = AppConfig::for_tests("a-sufficiently-long-secret");
        config.otp_ttl_minutes = 0;
        assert!(config.validate().is_err());
    }
}
