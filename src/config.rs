//! Configuration loading for the relay.
//!
//! Every setting comes from the process environment, optionally layered over a
//! `.env` file in the working directory. Each variable also accepts the
//! `TELEGRAM_*` name used by earlier deployments; the current name wins when
//! both are set.
//!
//! Loading never fails on missing values: numeric ids default to `0`, which
//! means "unconfigured". Credential completeness is checked later, when the
//! agent is about to connect.

use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// A logical setting with its current and legacy variable names.
struct Var {
    name: &'static str,
    legacy: Option<&'static str>,
}

const ACCOUNT_ID: Var = Var {
    name: "ACCOUNT_ID",
    legacy: Some("TELEGRAM_API_ID"),
};
const ACCOUNT_SECRET: Var = Var {
    name: "ACCOUNT_SECRET",
    legacy: Some("TELEGRAM_API_HASH"),
};
const ACCOUNT_PHONE: Var = Var {
    name: "ACCOUNT_PHONE",
    legacy: Some("TELEGRAM_PHONE"),
};
const TARGET_GROUP_ID: Var = Var {
    name: "TARGET_GROUP_ID",
    legacy: Some("TELEGRAM_TARGET_GROUP_ID"),
};
const TARGET_USER_HANDLES: Var = Var {
    name: "TARGET_USER_HANDLES",
    legacy: Some("TELEGRAM_TARGET_USER_HANDLES"),
};
const DESTINATION_CHAT_ID: Var = Var {
    name: "DESTINATION_CHAT_ID",
    legacy: Some("TELEGRAM_ME_ID"),
};
const SESSION_PATH: Var = Var {
    name: "SESSION_PATH",
    legacy: None,
};

/// Session file used when `SESSION_PATH` is not set.
pub const DEFAULT_SESSION_PATH: &str = "relay.session";

/// Account credentials for the messaging backend.
pub struct Credentials {
    /// Application id from my.telegram.org
    pub account_id: i32,
    /// Application hash from my.telegram.org
    pub secret: SecretString,
    /// Phone number used for interactive login
    pub phone: String,
}

impl Credentials {
    /// Check that every credential is present.
    ///
    /// Reports all missing variables at once so the operator can fix them in
    /// a single pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.account_id == 0 {
            missing.push(ACCOUNT_ID.name);
        }
        if self.secret.expose_secret().is_empty() {
            missing.push(ACCOUNT_SECRET.name);
        }
        if self.phone.is_empty() {
            missing.push(ACCOUNT_PHONE.name);
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(missing))
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("secret", &"[REDACTED]")
            .field("phone", &self.phone)
            .finish()
    }
}

/// Set of sender handles eligible for forwarding.
///
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList(HashSet<String>);

impl AllowList {
    /// Parse a comma-separated list, trimming entries and dropping empty ones.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|handle| !handle.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.0.contains(handle)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Handles in sorted order, for logging.
    pub fn handles(&self) -> Vec<&str> {
        let mut handles: Vec<&str> = self.0.iter().map(String::as_str).collect();
        handles.sort_unstable();
        handles
    }
}


/// Non-fatal configuration gaps reported after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    DestinationUnset,
    TargetGroupUnset,
    AllowListEmpty,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::DestinationUnset => write!(
                f,
                "{} is not set, matched messages will not be forwarded",
                DESTINATION_CHAT_ID.name
            ),
            ConfigWarning::TargetGroupUnset => write!(
                f,
                "{} is not set, no group is being monitored",
                TARGET_GROUP_ID.name
            ),
            ConfigWarning::AllowListEmpty => write!(
                f,
                "{} is empty, no sender will ever match",
                TARGET_USER_HANDLES.name
            ),
        }
    }
}

/// Application configuration, loaded once at start-up.
#[derive(Debug)]
pub struct Config {
    pub credentials: Credentials,
    /// Chat to monitor (0 = unconfigured)
    pub target_group_id: i64,
    /// Senders whose messages are forwarded
    pub target_user_handles: AllowList,
    /// Chat that receives forwarded copies (0 = unconfigured)
    pub destination_chat_id: i64,
    /// Where the backend session is persisted
    pub session_path: PathBuf,
}

impl Config {
    /// Load configuration from the process environment and `./.env`.
    pub fn load() -> Result<Self, ConfigError> {
        let env_file = Path::new(".env");
        let env_file = env_file.exists().then_some(env_file);
        Self::from_sources(env_file, |key| env::var(key).ok())
    }

    /// Build configuration from an optional env file and a variable lookup.
    ///
    /// Values returned by `lookup` take precedence over the file.
    pub fn from_sources<F>(env_file: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_vars = match env_file {
            Some(path) => read_env_file(path)?,
            None => HashMap::new(),
        };
        let get = |var: &Var| -> Option<String> {
            std::iter::once(var.name)
                .chain(var.legacy)
                .find_map(|key| lookup(key).or_else(|| file_vars.get(key).cloned()))
        };

        let credentials = Credentials {
            account_id: parse_id(ACCOUNT_ID.name, get(&ACCOUNT_ID))?,
            secret: SecretString::from(get(&ACCOUNT_SECRET).unwrap_or_default()),
            phone: get(&ACCOUNT_PHONE).unwrap_or_default().trim().to_string(),
        };

        Ok(Self {
            credentials,
            target_group_id: parse_id(TARGET_GROUP_ID.name, get(&TARGET_GROUP_ID))?,
            target_user_handles: AllowList::parse(&get(&TARGET_USER_HANDLES).unwrap_or_default()),
            destination_chat_id: parse_id(DESTINATION_CHAT_ID.name, get(&DESTINATION_CHAT_ID))?,
            session_path: get(&SESSION_PATH)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_PATH)),
        })
    }

    /// Configuration gaps that leave the relay running but inert.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.destination_chat_id == 0 {
            warnings.push(ConfigWarning::DestinationUnset);
        }
        if self.target_group_id == 0 {
            warnings.push(ConfigWarning::TargetGroupUnset);
        }
        if self.target_user_handles.is_empty() {
            warnings.push(ConfigWarning::AllowListEmpty);
        }
        warnings
    }
}

/// Read `KEY=value` pairs from an env file without touching the process environment.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Parse an optional integer setting; absent or blank means 0.
fn parse_id<T>(var: &'static str, value: Option<String>) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default,
{
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidInteger {
            var,
            value: raw.to_string(),
        }),
    }
}
