//! Request level privacy signals and the `Privacy` answers derived from them.
//!
//! Consent strings are only checked for presence; vendor level TCF evaluation
//! is not performed.

use crate::config::{ActivityRule, GdprConfig};
use crate::errors::EndpointError;
use std::collections::HashSet;
use std::sync::Arc;
use usersync::{Privacy, PrivacyMacros};

/// GPP section id of the EU TCF v2 section.
const GPP_SID_TCF_EU_V2: &str = "2";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GdprSignal {
    Ambiguous,
    No,
    Yes,
}

impl GdprSignal {
    /// A GPP section list takes precedence over the legacy `gdpr` flag.
    pub fn from_request(gpp_sids: &[String], gdpr: Option<i64>) -> Result<Self, EndpointError> {
        if !gpp_sids.is_empty() {
            return Ok(match gpp_sids.iter().any(|sid| sid == GPP_SID_TCF_EU_V2) {
                true => GdprSignal::Yes,
                false => GdprSignal::No,
            });
        }
        match gdpr {
            None => Ok(GdprSignal::Ambiguous),
            Some(0) => Ok(GdprSignal::No),
            Some(1) => Ok(GdprSignal::Yes),
            Some(other) => Err(EndpointError::InvalidGdpr(other.to_string())),
        }
    }

    /// Parses the `gdpr` query value; empty means no signal.
    pub fn from_query(gpp_sids: &[String], gdpr: &str) -> Result<Self, EndpointError> {
        let gdpr = match gdpr {
            "" => None,
            value => Some(
                value
                    .parse::<i64>()
                    .map_err(|_| EndpointError::InvalidGdpr(value.to_string()))?,
            ),
        };
        Self::from_request(gpp_sids, gdpr)
    }

    pub fn enforced(&self, config: &GdprConfig) -> bool {
        match self {
            GdprSignal::Yes => true,
            GdprSignal::No => false,
            GdprSignal::Ambiguous => config.applies_by_default(),
        }
    }

    fn macro_value(&self) -> &'static str {
        match self {
            GdprSignal::Yes => "1",
            GdprSignal::No => "0",
            GdprSignal::Ambiguous => "",
        }
    }
}

/// Splits a comma separated GPP section id list. Every entry must be numeric.
pub fn parse_gpp_sids(value: &str) -> Result<Vec<String>, EndpointError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|sid| !sid.is_empty())
        .map(|sid| match sid.parse::<u16>() {
            Ok(_) => Ok(sid.to_string()),
            Err(_) => Err(EndpointError::InvalidGppSid(sid.to_string())),
        })
        .collect()
}

/// True when a US Privacy string (`1YNN` style) signals opt-out of sale.
pub fn ccpa_opted_out(us_privacy: &str) -> bool {
    let bytes = us_privacy.as_bytes();
    bytes.len() == 4 && bytes[0] == b'1' && bytes[2].eq_ignore_ascii_case(&b'y')
}

/// Allow/deny decision for the `sync_user` activity.
#[derive(Clone, Debug)]
pub struct ActivityControl {
    default: bool,
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl ActivityControl {
    pub fn new(rule: &ActivityRule) -> Self {
        let lowercase = |names: &[String]| -> HashSet<String> {
            names.iter().map(|n| n.to_lowercase()).collect()
        };
        ActivityControl {
            default: rule.default,
            allow: lowercase(rule.allow.as_slice()),
            deny: lowercase(rule.deny.as_slice()),
        }
    }

    pub fn allows(&self, bidder: &str) -> bool {
        let bidder = bidder.to_lowercase();
        if self.deny.contains(&bidder) {
            return false;
        }
        self.allow.contains(&bidder) || self.default
    }
}

impl Default for ActivityControl {
    fn default() -> Self {
        ActivityControl::new(&ActivityRule::default())
    }
}

pub struct RequestPrivacy {
    pub gdpr_signal: GdprSignal,
    pub gdpr_enforced: bool,
    pub gdpr_consent: String,
    pub us_privacy: String,
    pub ccpa_enforced: bool,
    pub gpp: String,
    pub gpp_sid: String,
    pub activity: Arc<ActivityControl>,
}

impl RequestPrivacy {
    pub fn consent_missing(&self) -> bool {
        self.gdpr_enforced && self.gdpr_consent.is_empty()
    }

    pub fn macros(&self) -> PrivacyMacros {
        PrivacyMacros {
            gdpr: self.gdpr_signal.macro_value().to_string(),
            gdpr_consent: self.gdpr_consent.clone(),
            us_privacy: self.us_privacy.clone(),
            gpp: self.gpp.clone(),
            gpp_sid: self.gpp_sid.clone(),
        }
    }
}

impl Privacy for RequestPrivacy {
    fn gdpr_allows_host_cookie(&self) -> bool {
        !self.consent_missing()
    }

    fn gdpr_allows_bidder_sync(&self, _bidder: &str) -> bool {
        !self.consent_missing()
    }

    fn gdpr_in_scope(&self) -> bool {
        self.gdpr_enforced
    }

    fn ccpa_allows_bidder_sync(&self, _bidder: &str) -> bool {
        !(self.ccpa_enforced && ccpa_opted_out(&self.us_privacy))
    }

    fn activity_allows_user_sync(&self, bidder: &str) -> bool {
        self.activity.allows(bidder)
    }
}
