//! Runtime configuration read from the environment

use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 8080;

/// Which platform adapter backs the store and auth seams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Rest { url: String, service_key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub api_key: Option<String>,
    pub sender: String,
    pub sender_name: Option<String>,
}

impl MailConfig {
    pub fn is_configured(&self) -> bool {
        self.relay_url.is_some() && self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Cookie signing key; at least 64 bytes when given
    pub session_key: Option<Vec<u8>>,
    pub cookie_secure: bool,
    pub backend: Backend,
    pub mail: MailConfig,
    pub static_dir: PathBuf,
    /// `email:password` of an admin seeded into the memory backend
    pub seed_admin: Option<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            session_key: None,
            cookie_secure: true,
            backend: Backend::Memory,
            mail: MailConfig {
                sender: "planning@localhost".to_string(),
                ..MailConfig::default()
            },
            static_dir: PathBuf::from("static"),
            seed_admin: None,
        }
    }
}

impl Config {
    /// Commands that read existing rows need the hosted platform; the memory backend starts empty
    pub fn require_hosted_backend(&self, command: &str) -> Result<()> {
        match self.backend {
            Backend::Rest { .. } => Ok(()),
            Backend::Memory => Err(Error::config(format!(
                "`{}` reads the hosted platform; set PLANNER_BACKEND=rest with PLATFORM_URL and PLATFORM_SERVICE_KEY",
                command
            ))),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let port = match get("PLANNER_PORT") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| Error::config(format!("PLANNER_PORT is not a port: {}", p)))?,
            None => defaults.port,
        };

        let session_key = match get("PLANNER_SESSION_KEY") {
            Some(key) if key.len() < 64 => {
                return Err(Error::config("PLANNER_SESSION_KEY must be at least 64 bytes"));
            }
            Some(key) => Some(key.into_bytes()),
            None => None,
        };

        let backend = match get("PLANNER_BACKEND").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("memory") => Backend::Memory,
            Some("rest") => Backend::Rest {
                url: get("PLATFORM_URL").ok_or_else(|| Error::config("PLATFORM_URL is required for the rest backend"))?,
                service_key: get("PLATFORM_SERVICE_KEY")
                    .ok_or_else(|| Error::config("PLATFORM_SERVICE_KEY is required for the rest backend"))?,
            },
            Some(other) => {
                return Err(Error::config(format!("Unknown PLANNER_BACKEND: {}. Use 'memory' or 'rest'", other)));
            }
        };

        let seed_admin = match get("PLANNER_SEED_ADMIN") {
            Some(pair) => {
                let (email, password) = pair
                    .split_once(':')
                    .ok_or_else(|| Error::config("PLANNER_SEED_ADMIN must be email:password"))?;
                Some((email.to_string(), password.to_string()))
            }
            None => None,
        };

        Ok(Self {
            bind: get("PLANNER_BIND").unwrap_or(defaults.bind),
            port,
            session_key,
            cookie_secure: get("PLANNER_COOKIE_SECURE").map_or(defaults.cookie_secure, |v| v != "false" && v != "0"),
            backend,
            mail: MailConfig {
                relay_url: get("MAIL_RELAY_URL"),
                api_key: get("MAIL_RELAY_API_KEY"),
                sender: get("MAIL_SENDER").unwrap_or(defaults.mail.sender),
                sender_name: get("MAIL_SENDER_NAME"),
            },
            static_dir: get("PLANNER_STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
            seed_admin,
        })
    }
}
