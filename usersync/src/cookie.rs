use crate::codec::Encoder;
use crate::config::HostCookie;
use crate::ejector::{Ejector, EjectorError};
use crate::metrics_defs::COOKIE_EJECTED;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::HashMap;

pub const UID_COOKIE_NAME: &str = "uids";

/// How long a synced uid stays live.
pub const UID_TTL: Duration = Duration::days(14);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    #[error("the user has opted out of syncs")]
    OptedOut,
    #[error("{key} uses a UID of {uid} to mean \"not yet recognized\"")]
    SentinelUid { key: String, uid: String },
    #[error("uid that's trying to be synced is bigger than MaxCookieSize")]
    UidTooBig,
    #[error("cookie encoding failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Ejector(#[from] EjectorError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidEntry {
    pub uid: String,
    pub expires: DateTime<Utc>,
}

impl UidEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}

/// Per-syncer uid values that mean "this user isn't known yet" and must never be stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentinelUids(HashMap<String, String>);

impl SentinelUids {
    pub fn new(sentinels: HashMap<String, String>) -> Self {
        SentinelUids(sentinels)
    }

    pub fn is_sentinel(&self, key: &str, uid: &str) -> bool {
        self.0.get(key).is_some_and(|sentinel| sentinel == uid)
    }
}

impl Default for SentinelUids {
    fn default() -> Self {
        SentinelUids(HashMap::from([(
            "audienceNetwork".to_string(),
            "0".to_string(),
        )]))
    }
}

/// The user's uids, one per syncer key, plus the opt-out preference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie {
    pub(crate) uids: HashMap<String, UidEntry>,
    pub(crate) opt_out: bool,
}

impl Cookie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opted_out() -> Self {
        Cookie {
            uids: HashMap::new(),
            opt_out: true,
        }
    }

    pub fn allow_syncs(&self) -> bool {
        !self.opt_out
    }

    pub fn is_opted_out(&self) -> bool {
        self.opt_out
    }

    /// Opting out drops every stored uid.
    pub fn set_opt_out(&mut self, opt_out: bool) {
        self.opt_out = opt_out;
        if opt_out {
            self.uids.clear();
        }
    }

    pub fn sync(&mut self, key: &str, uid: &str) -> Result<(), CookieError> {
        self.sync_with_sentinels(key, uid, &SentinelUids::default())
    }

    pub fn sync_with_sentinels(
        &mut self,
        key: &str,
        uid: &str,
        sentinels: &SentinelUids,
    ) -> Result<(), CookieError> {
        if self.opt_out {
            return Err(CookieError::OptedOut);
        }
        if sentinels.is_sentinel(key, uid) {
            return Err(CookieError::SentinelUid {
                key: key.to_string(),
                uid: uid.to_string(),
            });
        }
        self.uids.insert(
            key.to_string(),
            UidEntry {
                uid: uid.to_string(),
                expires: Utc::now() + UID_TTL,
            },
        );
        Ok(())
    }

    pub fn unsync(&mut self, key: &str) {
        self.uids.remove(key);
    }

    /// The uid stored under `key` and whether it's still live.
    pub fn get_uid(&self, key: &str) -> Option<(&str, bool)> {
        let now = Utc::now();
        self.uids
            .get(key)
            .map(|entry| (entry.uid.as_str(), entry.is_live(now)))
    }

    /// Every stored uid, live or expired.
    pub fn get_uids(&self) -> HashMap<String, String> {
        self.uids
            .iter()
            .map(|(key, entry)| (key.clone(), entry.uid.clone()))
            .collect()
    }

    pub fn entries(&self) -> &HashMap<String, UidEntry> {
        &self.uids
    }

    pub fn has_live_sync(&self, key: &str) -> bool {
        self.get_uid(key).is_some_and(|(_, live)| live)
    }

    pub fn has_any_live_syncs(&self) -> bool {
        self.live_sync_count() > 0
    }

    pub fn live_sync_count(&self) -> usize {
        let now = Utc::now();
        self.uids.values().filter(|e| e.is_live(now)).count()
    }

    /// Encodes the cookie, ejecting uids until it fits the host's size limit.
    pub fn prepare_for_write(
        &mut self,
        host: &HostCookie,
        encoder: &dyn Encoder,
        ejector: &mut dyn Ejector,
    ) -> Result<String, CookieError> {
        loop {
            let encoded = encoder.encode(self)?;
            if host.max_cookie_size_bytes <= 0
                || encoded.len() as i64 <= host.max_cookie_size_bytes
            {
                return Ok(encoded);
            }
            if self.uids.len() <= 1 {
                return Err(CookieError::UidTooBig);
            }

            let victim = ejector.choose(&self.uids)?;
            tracing::debug!(
                syncer = %victim,
                size = encoded.len(),
                max_size = host.max_cookie_size_bytes,
                "ejecting uid to fit cookie size"
            );
            self.uids.remove(&victim);
            counter!(COOKIE_EJECTED).increment(1);
        }
    }
}
