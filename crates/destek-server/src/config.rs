use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, bail};
use tracing::{debug, warn};

const DEV_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    /// Email and password of the admin account created at startup, if any.
    pub admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = env::var("DESTEK_JWT_SECRET").unwrap_or_else(|_| {
            warn!("DESTEK_JWT_SECRET not set, using the development secret");
            DEV_SECRET.to_string()
        });

        let ttl_hours: i64 = try_load("DESTEK_TOKEN_TTL_HOURS", "168")?;
        if ttl_hours <= 0 {
            bail!("DESTEK_TOKEN_TTL_HOURS must be positive, got {ttl_hours}");
        }

        let admin = match (env::var("DESTEK_ADMIN_EMAIL"), env::var("DESTEK_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some((email, password)),
            (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
                bail!("DESTEK_ADMIN_EMAIL and DESTEK_ADMIN_PASSWORD must be set together")
            }
            _ => None,
        };

        Ok(Self {
            host: try_load("DESTEK_HOST", "0.0.0.0")?,
            port: try_load("DESTEK_PORT", "3000")?,
            db_path: try_load("DESTEK_DB_PATH", "destek.db")?,
            jwt_secret,
            token_ttl: chrono::Duration::hours(ttl_hours),
            admin,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        debug!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}
