//! Configuration consumed by the sync engine: host cookie settings, host-level
//! user sync settings and per-bidder syncer definitions.

use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;

pub const DEFAULT_REDIRECT_URL: &str = "{{.ExternalURL}}/setuid?bidder={{.SyncerKey}}&gdpr={{.GDPR}}&gdpr_consent={{.GDPRConsent}}&gpp={{.GPP}}&gpp_sid={{.GPPSID}}&f={{.SyncType}}&uid={{.UserMacro}}";

const DEFAULT_COOKIE_TTL_DAYS: i64 = 90;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HostCookie {
    #[serde(default)]
    pub domain: String,
    /// Syncer key the host's own cookie is stored under.
    #[serde(default)]
    pub family: String,
    /// Name of the host's own id cookie. Empty disables host cookie sync.
    #[serde(default)]
    pub cookie_name: String,
    /// Values of zero or less mean unbounded.
    #[serde(default)]
    pub max_cookie_size_bytes: i64,
    #[serde(default = "default_cookie_ttl_days")]
    pub ttl_days: i64,
    #[serde(default)]
    pub optout_cookie: Option<OptOutCookie>,
}

fn default_cookie_ttl_days() -> i64 {
    DEFAULT_COOKIE_TTL_DAYS
}

impl Default for HostCookie {
    fn default() -> Self {
        HostCookie {
            domain: String::new(),
            family: String::new(),
            cookie_name: String::new(),
            max_cookie_size_bytes: 0,
            ttl_days: DEFAULT_COOKIE_TTL_DAYS,
            optout_cookie: None,
        }
    }
}

impl HostCookie {
    pub fn ttl(&self) -> Duration {
        Duration::days(self.ttl_days)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OptOutCookie {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CooperativeConfig {
    #[serde(default)]
    pub enabled_by_default: bool,
}

/// Host level settings shared by every syncer.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UserSyncConfig {
    /// Overrides the host's external url for sync redirects when set.
    #[serde(default)]
    pub external_url: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    #[serde(default)]
    pub cooperative: CooperativeConfig,
    #[serde(default)]
    pub priority_groups: Vec<Vec<String>>,
}

fn default_redirect_url() -> String {
    DEFAULT_REDIRECT_URL.to_string()
}

impl Default for UserSyncConfig {
    fn default() -> Self {
        UserSyncConfig {
            external_url: String::new(),
            redirect_url: default_redirect_url(),
            cooperative: CooperativeConfig::default(),
            priority_groups: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BidderInfo {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub alias_of: Option<String>,
    #[serde(default)]
    pub syncer: Option<SyncerConfig>,
}

impl BidderInfo {
    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}

pub type BidderInfos = HashMap<String, BidderInfo>;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SyncerConfig {
    /// Defaults to the bidder name when empty.
    #[serde(default)]
    pub key: String,
    /// Declared without endpoints; only used to flag configs that should have defined one.
    #[serde(default)]
    pub supports: Vec<String>,
    #[serde(default)]
    pub iframe: Option<SyncerEndpoint>,
    #[serde(default)]
    pub redirect: Option<SyncerEndpoint>,
    #[serde(default)]
    pub external_url: String,
    #[serde(default)]
    pub support_cors: Option<bool>,
    /// "b" or "i". Forces the response format regardless of the sync type chosen.
    #[serde(default)]
    pub format_override: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub skip_when: Option<SkipWhen>,
}

impl SyncerConfig {
    pub fn has_endpoints(&self) -> bool {
        self.iframe.is_some() || self.redirect.is_some()
    }

    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SyncerEndpoint {
    pub url: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub external_url: String,
    #[serde(default)]
    pub user_macro: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SkipWhen {
    #[serde(default)]
    pub gdpr: bool,
    #[serde(default)]
    pub gpp_sid: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidder_info_from_yaml() {
        let yaml = r#"
appnexus:
  syncer:
    key: adnxs
    support_cors: true
    iframe:
      url: "https://sync.example.com/if?r={{.RedirectURL}}"
      user_macro: "$UID"
    skip_when:
      gdpr: true
      gpp_sid: ["2", "6"]
districtm:
  alias_of: appnexus
legacy:
  disabled: true
"#;
        let infos: BidderInfos = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(infos.len(), 3);

        let appnexus = infos["appnexus"].syncer.as_ref().unwrap();
        assert_eq!(appnexus.key, "adnxs");
        assert_eq!(appnexus.support_cors, Some(true));
        assert!(appnexus.has_endpoints());
        assert!(!appnexus.is_disabled());
        assert_eq!(appnexus.iframe.as_ref().unwrap().user_macro, "$UID");
        assert_eq!(
            appnexus.skip_when,
            Some(SkipWhen {
                gdpr: true,
                gpp_sid: vec!["2".into(), "6".into()]
            })
        );

        assert_eq!(infos["districtm"].alias_of.as_deref(), Some("appnexus"));
        assert!(infos["districtm"].syncer.is_none());
        assert!(!infos["legacy"].is_enabled());
    }

    #[test]
    fn test_defaults() {
        let user_sync: UserSyncConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(user_sync, UserSyncConfig::default());
        assert_eq!(user_sync.redirect_url, DEFAULT_REDIRECT_URL);

        let host_cookie: HostCookie = serde_yaml::from_str("domain: example.com").unwrap();
        assert_eq!(host_cookie.ttl(), Duration::days(90));
        assert_eq!(host_cookie.max_cookie_size_bytes, 0);
    }
}
