use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use usersync::config::{BidderInfos, HostCookie, UserSyncConfig};

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("cookie_sync.max_limit ({max}) cannot be lower than cookie_sync.default_limit ({default})")]
    MaxLimitBelowDefault { max: i64, default: i64 },

    #[error("user_sync.priority_groups[{0}] is empty")]
    EmptyPriorityGroup(usize),

    #[error("bidder {0} is listed in more than one priority group")]
    DuplicatePriorityBidder(String),

    #[error("gdpr.default_value must be \"0\" or \"1\", got \"{0}\"")]
    InvalidGdprDefault(String),
}

/// Endpoint server configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for `/cookie_sync` and `/setuid`
    pub listener: Listener,
    /// Listener for `/health` and `/ready`
    pub admin_listener: Listener,
    /// Public url of this server, used in sync redirects
    #[serde(default)]
    pub external_url: String,
    #[serde(default)]
    pub host_cookie: HostCookie,
    #[serde(default)]
    pub user_sync: UserSyncConfig,
    #[serde(default)]
    pub cookie_sync: CookieSyncConfig,
    #[serde(default)]
    pub gdpr: GdprConfig,
    #[serde(default)]
    pub ccpa: CcpaConfig,
    #[serde(default)]
    pub activities: ActivitiesConfig,
    /// Bidder name to bidder info
    #[serde(default)]
    pub bidders: BidderInfos,
}

impl Config {
    /// Validates the endpoint configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.cookie_sync.validate()?;
        self.gdpr.validate()?;

        let mut group_of: HashMap<&str, usize> = HashMap::new();
        for (index, group) in self.user_sync.priority_groups.iter().enumerate() {
            if group.is_empty() {
                return Err(ValidationError::EmptyPriorityGroup(index));
            }
            for bidder in group {
                if group_of.insert(bidder, index).is_some() {
                    return Err(ValidationError::DuplicatePriorityBidder(bidder.clone()));
                }
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CookieSyncConfig {
    /// Used when the request carries no limit. Zero or less means unlimited.
    #[serde(default)]
    pub default_limit: Option<i64>,
    /// Upper bound applied to every request. Zero or less means no bound.
    #[serde(default)]
    pub max_limit: Option<i64>,
    #[serde(default)]
    pub default_coop_sync: Option<bool>,
}

impl CookieSyncConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(max), Some(default)) = (self.max_limit, self.default_limit)
            && max > 0
            && max < default
        {
            return Err(ValidationError::MaxLimitBelowDefault { max, default });
        }
        Ok(())
    }

    /// Resolves the effective limit for a request. Zero means unlimited.
    pub fn resolve_limit(&self, requested: Option<i64>) -> i64 {
        let limit = requested.or(self.default_limit).unwrap_or(0).max(0);
        match self.max_limit {
            Some(max) if max > 0 && (limit == 0 || limit > max) => max,
            _ => limit,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GdprConfig {
    /// Applied when a request carries no usable GDPR signal
    #[serde(default = "default_gdpr_value")]
    pub default_value: String,
}

fn default_gdpr_value() -> String {
    "0".to_string()
}

impl Default for GdprConfig {
    fn default() -> Self {
        GdprConfig {
            default_value: default_gdpr_value(),
        }
    }
}

impl GdprConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.default_value.as_str() {
            "0" | "1" => Ok(()),
            other => Err(ValidationError::InvalidGdprDefault(other.to_string())),
        }
    }

    pub fn applies_by_default(&self) -> bool {
        self.default_value == "1"
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CcpaConfig {
    #[serde(default)]
    pub enforce: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ActivitiesConfig {
    #[serde(default)]
    pub sync_user: ActivityRule,
}

/// Allow and deny lists for one activity. Deny wins over allow.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ActivityRule {
    #[serde(default = "default_activity_allowed")]
    pub default: bool,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

fn default_activity_allowed() -> bool {
    true
}

impl Default for ActivityRule {
    fn default() -> Self {
        ActivityRule {
            default: default_activity_allowed(),
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}
