use crate::constants::*;
use std::env;

/// SMTP relay settings. The relay is an external collaborator; when it is
/// not configured every send fails gracefully and callers downgrade the
/// failure to a warning.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub notify_recipient: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub data_path: String,
    pub jwt_secret: String,
    pub admin_user: String,
    pub admin_password: String,
    pub admin_email: Option<String>,
    pub master_token: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingJwtSecret,
    InvalidJwtSecret(String),
    MissingAdminCredentials,
    InvalidPort(String),
    InvalidSmtpPort(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingJwtSecret => {
                write!(f, "JWT_SECRET environment variable is required")
            }
            ConfigError::InvalidJwtSecret(msg) => {
                write!(f, "Invalid JWT secret: {}", msg)
            }
            ConfigError::MissingAdminCredentials => {
                write!(f, "ADMIN_USER and ADMIN_PASSWORD are required to seed the admin account")
            }
            ConfigError::InvalidPort(port) => {
                write!(f, "Invalid port number: {}", port)
            }
            ConfigError::InvalidSmtpPort(port) => {
                write!(f, "Invalid SMTP port number: {}", port)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("SERVER_PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let data_path = env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());

        if port.parse::<u16>().is_err() {
            return Err(ConfigError::InvalidPort(port));
        }

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::MissingJwtSecret)?;
        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::InvalidJwtSecret(format!(
                "must be at least {} characters long",
                MIN_JWT_SECRET_LENGTH
            )));
        }

        let admin_user = env::var("ADMIN_USER").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();
        let (admin_user, admin_password) = match (admin_user, admin_password) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => (u, p),
            _ => return Err(ConfigError::MissingAdminCredentials),
        };
        let admin_email = env::var("ADMIN_EMAIL").ok().filter(|e| !e.trim().is_empty());

        let master_token = env::var("MASTER_TOKEN").ok().filter(|t| !t.is_empty());

        let smtp = Self::smtp_from_env()?;

        Ok(Config {
            host,
            port,
            data_path,
            jwt_secret,
            admin_user,
            admin_password,
            admin_email,
            master_token,
            smtp,
        })
    }

    /// SMTP is optional: when SMTP_SERVER is absent the mailer is disabled
    /// and every send reports a failure to its caller.
    fn smtp_from_env() -> Result<Option<SmtpConfig>, ConfigError> {
        let server = match env::var("SMTP_SERVER") {
            Ok(s) if !s.trim().is_empty() => s,
            _ => return Ok(None),
        };
        let port_str = env::var("SMTP_PORT").unwrap_or_else(|_| "587".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidSmtpPort(port_str))?;
        let user = env::var("EMAIL_USER").unwrap_or_default();
        let password = env::var("EMAIL_PASSWORD").unwrap_or_default();
        let notify_recipient =
            env::var("NOTIFY_RECIPIENT").unwrap_or_else(|_| user.clone());

        Ok(Some(SmtpConfig {
            server,
            port,
            user,
            password,
            notify_recipient,
        }))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
