//! Transport encoding of the uid cookie: url-safe base64 over JSON.

use crate::cookie::{Cookie, CookieError, SentinelUids, UidEntry};
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait Encoder: Send + Sync {
    fn encode(&self, cookie: &Cookie) -> Result<String, CookieError>;
}

/// Decoding never fails: anything unreadable becomes an empty cookie.
pub trait Decoder: Send + Sync {
    fn decode(&self, encoded: &str) -> Cookie;
}

#[derive(Serialize, Deserialize, Default)]
struct CookieJson {
    /// Uids written before expiry was tracked.
    #[serde(rename = "uids", default, skip_serializing)]
    legacy_uids: Option<HashMap<String, String>>,
    #[serde(
        rename = "tempUIDs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    uids: Option<HashMap<String, UidEntry>>,
    #[serde(rename = "optout", default, skip_serializing_if = "is_false")]
    opt_out: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Base64Encoder;

impl Encoder for Base64Encoder {
    fn encode(&self, cookie: &Cookie) -> Result<String, CookieError> {
        let json = CookieJson {
            legacy_uids: None,
            uids: (!cookie.uids.is_empty()).then(|| cookie.uids.clone()),
            opt_out: cookie.opt_out,
        };
        let bytes = serde_json::to_vec(&json).map_err(|e| CookieError::Encode(e.to_string()))?;
        Ok(URL_SAFE.encode(bytes))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Base64Decoder {
    pub sentinels: SentinelUids,
}

impl Decoder for Base64Decoder {
    fn decode(&self, encoded: &str) -> Cookie {
        let Ok(bytes) = URL_SAFE.decode(encoded) else {
            return Cookie::new();
        };
        let Ok(json) = serde_json::from_slice::<CookieJson>(&bytes) else {
            return Cookie::new();
        };
        if json.opt_out {
            return Cookie::opted_out();
        }

        let mut uids = json.uids.unwrap_or_default();
        // legacy entries carry no expiry, treat them as due for a resync
        let expired = Utc::now() - Duration::minutes(5);
        for (key, uid) in json.legacy_uids.unwrap_or_default() {
            uids.entry(key).or_insert_with(|| UidEntry {
                uid,
                expires: expired,
            });
        }
        uids.retain(|key, entry| !self.sentinels.is_sentinel(key, &entry.uid));

        Cookie {
            uids,
            opt_out: false,
        }
    }
}
