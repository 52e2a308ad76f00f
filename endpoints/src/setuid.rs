//! `GET /setuid`: stores the uid a bidder assigned to this browser.

use crate::errors::EndpointError;
use crate::handler::{Handler, bytes_response};
use crate::metrics_defs::{SETUID_REQUESTS, SETUID_SYNCER};
use crate::privacy::{GdprSignal, RequestPrivacy, parse_gpp_sids};
use crate::state::SyncState;
use async_trait::async_trait;
use http::StatusCode;
use http::header::USER_AGENT;
use http::request::Parts;
use hyper::body::Bytes;
use hyper::{Request, Response};
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;
use url::form_urlencoded;
use usersync::http_cookie::{read_cookie, site_cookie_check, write_cookie};
use usersync::{
    CookieError, EjectorError, OldestEjector, Privacy, PriorityBidderEjector, SyncType,
};

/// Transparent 1x1 PNG returned to image pixel syncs.
const TRACKING_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];

fn query_param<'a>(query: &'a HashMap<String, String>, name: &str) -> &'a str {
    query.get(name).map(String::as_str).unwrap_or_default()
}

pub struct SetuidHandler {
    state: Arc<SyncState>,
}

impl SetuidHandler {
    pub fn new(state: Arc<SyncState>) -> Self {
        SetuidHandler { state }
    }

    fn set_uid(&self, parts: Parts) -> Result<(Response<Bytes>, &'static str), EndpointError> {
        let query: HashMap<String, String> =
            form_urlencoded::parse(parts.uri.query().unwrap_or_default().as_bytes())
                .into_owned()
                .collect();
        let param = |name| query_param(&query, name);
        let config = &self.state.config;

        let mut cookie = read_cookie(&parts.headers, self.state.decoder.as_ref(), &config.host_cookie);
        if !cookie.allow_syncs() {
            return Err(EndpointError::OptedOut);
        }

        let bidder = param("bidder");
        if bidder.is_empty() {
            return Err(EndpointError::MissingBidder);
        }
        let (bidder, syncer) = self
            .state
            .syncer_for(bidder)
            .ok_or_else(|| EndpointError::UnknownBidder(bidder.to_string()))?;

        let format = match param("f") {
            "" => syncer.default_response_format(),
            value => SyncType::from_format_value(value).ok_or(EndpointError::InvalidFormat)?,
        };

        let gpp_sids = parse_gpp_sids(param("gpp_sid"))?;
        let gdpr_signal = GdprSignal::from_query(&gpp_sids, param("gdpr"))?;
        let privacy = RequestPrivacy {
            gdpr_signal,
            gdpr_enforced: gdpr_signal.enforced(&config.gdpr),
            gdpr_consent: param("gdpr_consent").to_string(),
            us_privacy: String::new(),
            ccpa_enforced: config.ccpa.enforce,
            gpp: param("gpp").to_string(),
            gpp_sid: param("gpp_sid").to_string(),
            activity: self.state.activity.clone(),
        };
        if privacy.consent_missing() {
            return Err(EndpointError::ConsentRequired);
        }
        if !privacy.activity_allows_user_sync(&bidder) {
            return Err(EndpointError::PrivacyBlocked);
        }

        let key = syncer.key().to_string();
        let action = match param("uid") {
            "" => {
                cookie.unsync(&key);
                "unsync"
            }
            uid => {
                cookie.sync_with_sentinels(&key, uid, &self.state.sentinels)?;
                "sync"
            }
        };

        let mut ejector = PriorityBidderEjector {
            priority_groups: config.user_sync.priority_groups.clone(),
            syncers_by_bidder: self.state.syncers.clone(),
            is_syncer_priority: self.state.is_priority_bidder(&bidder),
            tie_ejector: Box::new(OldestEjector),
        };
        let encoded = match cookie.prepare_for_write(
            &config.host_cookie,
            self.state.encoder.as_ref(),
            &mut ejector,
        ) {
            Ok(encoded) => encoded,
            Err(e @ CookieError::Ejector(EjectorError::SyncerNotPriority)) => {
                tracing::debug!(bidder = %bidder, syncer = %key, "uid cookie full of priority syncs");
                let response = bytes_response(
                    StatusCode::OK,
                    "text/plain; charset=utf-8",
                    format!("Warning: {e}, cookie not updated"),
                );
                return Ok((response, "priority_rejected"));
            }
            Err(e) => return Err(e.into()),
        };

        let mut response = match format {
            SyncType::Redirect => bytes_response(StatusCode::OK, "image/png", TRACKING_PIXEL),
            SyncType::IFrame => bytes_response(StatusCode::OK, "text/html", Bytes::new()),
        };
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        write_cookie(
            response.headers_mut(),
            &encoded,
            &config.host_cookie,
            site_cookie_check(user_agent),
        )?;

        counter!(SETUID_SYNCER, "syncer" => key, "action" => action.to_string()).increment(1);
        Ok((response, "ok"))
    }
}

#[async_trait]
impl Handler for SetuidHandler {
    fn name(&self) -> &'static str {
        "setuid"
    }

    async fn handle(&self, request: Request<Bytes>) -> Result<Response<Bytes>, EndpointError> {
        let (parts, _body) = request.into_parts();
        let result = self.set_uid(parts);
        let status = match &result {
            Ok((_, status)) => *status,
            Err(e) => e.metric_label(),
        };
        counter!(SETUID_REQUESTS, "status" => status).increment(1);
        result.map(|(response, _)| response)
    }
}
