use std::net::IpAddr;

use chrono::{FixedOffset, NaiveTime};

use crate::tenancy::MAX_CODE_LEN;

/// Postgres truncates identifiers longer than this.
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub frontend_url: String,
    pub environment: Environment,
    pub tenant_db_prefix: String,
    pub tenant_max_connections: u32,
    pub max_body_size: usize,
    pub log_level: String,
    pub smtp: Option<SmtpConfig>,
    pub reminders: ReminderConfig,
    pub admin_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Receives a copy of every plan expiry reminder.
    pub super_admin_email: Option<String>,
    pub time: NaiveTime,
    pub utc_offset: FixedOffset,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("HRMS_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid HRMS_HOST: {e}"))?;

        let port: u16 = env_or("HRMS_PORT", "5000")
            .parse()
            .map_err(|e| format!("Invalid HRMS_PORT: {e}"))?;

        let frontend_url = env_or("HRMS_FRONTEND_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();

        let environment = match env_or("HRMS_ENV", "production").as_str() {
            "development" => Environment::Development,
            _ => Environment::Production,
        };

        let tenant_db_prefix = env_or("HRMS_TENANT_DB_PREFIX", "hrms_");
        validate_tenant_db_prefix(&tenant_db_prefix)?;

        let tenant_max_connections: u32 = env_or("HRMS_TENANT_MAX_CONNECTIONS", "5")
            .parse()
            .map_err(|e| format!("Invalid HRMS_TENANT_MAX_CONNECTIONS: {e}"))?;

        let max_body_size: usize = env_or("HRMS_MAX_BODY_SIZE", "1048576")
            .parse()
            .map_err(|e| format!("Invalid HRMS_MAX_BODY_SIZE: {e}"))?;

        let log_level = env_or("HRMS_LOG_LEVEL", "info");

        let smtp = match (
            std::env::var("HRMS_SMTP_HOST").ok(),
            std::env::var("HRMS_SMTP_PORT").ok(),
            std::env::var("HRMS_SMTP_USER").ok(),
            std::env::var("HRMS_SMTP_PASS").ok(),
            std::env::var("HRMS_SMTP_FROM").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid HRMS_SMTP_PORT: {e}"))?,
                user,
                pass,
                from,
            }),
            _ => None,
        };

        let time = NaiveTime::parse_from_str(&env_or("HRMS_REMINDER_TIME", "09:00"), "%H:%M")
            .map_err(|e| format!("Invalid HRMS_REMINDER_TIME: {e}"))?;

        let utc_offset: FixedOffset = env_or("HRMS_REMINDER_UTC_OFFSET", "+05:30")
            .parse()
            .map_err(|e| format!("Invalid HRMS_REMINDER_UTC_OFFSET: {e}"))?;

        let run_on_startup = match std::env::var("HRMS_RUN_REMINDERS_ON_STARTUP") {
            Ok(v) => v == "true" || v == "1",
            Err(_) => environment == Environment::Development,
        };

        let reminders = ReminderConfig {
            super_admin_email: env_optional("HRMS_SUPER_ADMIN_EMAIL"),
            time,
            utc_offset,
            run_on_startup,
        };

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            frontend_url,
            environment,
            tenant_db_prefix,
            tenant_max_connections,
            max_body_size,
            log_level,
            smtp,
            reminders,
            admin_api_key: env_optional("HRMS_ADMIN_API_KEY"),
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Lowercase letters, digits and `_`, short enough that prefix plus the
/// longest company code fits in a Postgres identifier.
fn validate_tenant_db_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty()
        || !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(format!(
            "Invalid HRMS_TENANT_DB_PREFIX '{prefix}': use lowercase letters, digits and '_'"
        ));
    }
    let max = MAX_IDENTIFIER_LEN - MAX_CODE_LEN;
    if prefix.len() > max {
        return Err(format!(
            "Invalid HRMS_TENANT_DB_PREFIX '{prefix}': at most {max} characters"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefix_is_valid() {
        assert!(validate_tenant_db_prefix("hrms_").is_ok());
    }

    #[test]
    fn prefix_rejects_uppercase_and_symbols() {
        assert!(validate_tenant_db_prefix("").is_err());
        assert!(validate_tenant_db_prefix("HRMS_").is_err());
        assert!(validate_tenant_db_prefix("hrms-").is_err());
    }

    #[test]
    fn prefix_leaves_room_for_longest_code() {
        assert!(validate_tenant_db_prefix(&"p".repeat(31)).is_ok());
        assert!(validate_tenant_db_prefix(&"p".repeat(32)).is_err());

        let longest = crate::tenancy::TenantCode::parse(&"A".repeat(MAX_CODE_LEN)).unwrap();
        assert_eq!(longest.database_name(&"p".repeat(31)).len(), MAX_IDENTIFIER_LEN);
    }
}
