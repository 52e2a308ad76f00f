//! `POST /cookie_sync`: tells the browser which bidders to sync with and how.

use crate::errors::EndpointError;
use crate::handler::{Handler, json_response};
use crate::metrics_defs::{COOKIE_SYNC_REQUESTS, COOKIE_SYNC_SYNCER};
use crate::privacy::{GdprSignal, RequestPrivacy, parse_gpp_sids};
use crate::state::SyncState;
use async_trait::async_trait;
use http::StatusCode;
use hyper::body::Bytes;
use hyper::{Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::counter;
use std::sync::Arc;
use usersync::chooser::Request as ChooserRequest;
use usersync::http_cookie::read_cookie;
use usersync::{
    BidderEvaluation, BidderFilter, BidderFilterMode, ChooseResult, Cooperative,
    SpecificBidderFilter, Status, SyncType, SyncTypeFilter, UniformBidderFilter,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CookieSyncBody {
    bidders: Vec<String>,
    gdpr: Option<i64>,
    gdpr_consent: String,
    us_privacy: String,
    gpp: String,
    gpp_sid: String,
    limit: Option<i64>,
    #[serde(rename = "coopSync")]
    coop_sync: Option<bool>,
    #[serde(rename = "filterSettings")]
    filter_settings: Option<FilterSettings>,
    account: String,
    debug: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilterSettings {
    iframe: Option<FilterConfig>,
    image: Option<FilterConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilterConfig {
    /// `"*"` or a list of bidder names.
    bidders: Value,
    filter: String,
}

#[derive(Debug, Serialize)]
struct CookieSyncResponse {
    status: &'static str,
    bidder_status: Vec<BidderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<Vec<DebugEntry>>,
}

#[derive(Debug, Serialize)]
struct BidderStatus {
    bidder: String,
    no_cookie: bool,
    usersync: UserSyncInfo,
}

#[derive(Debug, Serialize)]
struct UserSyncInfo {
    url: String,
    #[serde(rename = "type")]
    sync_type: SyncType,
    #[serde(rename = "supportCORS", skip_serializing_if = "is_false")]
    support_cors: bool,
}

#[derive(Debug, Serialize)]
struct DebugEntry {
    bidder: String,
    error: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn parse_filter(
    config: Option<&FilterConfig>,
    sync_type: &'static str,
) -> Result<Arc<dyn BidderFilter>, EndpointError> {
    let invalid = |message: String| EndpointError::InvalidFilter { sync_type, message };

    let Some(config) = config else {
        return Ok(Arc::new(UniformBidderFilter {
            mode: BidderFilterMode::Include,
        }));
    };

    let mode = match config.filter.as_str() {
        "" | "include" => BidderFilterMode::Include,
        "exclude" => BidderFilterMode::Exclude,
        other => return Err(invalid(format!("invalid filter value \"{other}\""))),
    };

    match &config.bidders {
        Value::Null => Ok(Arc::new(UniformBidderFilter {
            mode: BidderFilterMode::Include,
        })),
        Value::String(all) if all == "*" => Ok(Arc::new(UniformBidderFilter { mode })),
        Value::Array(bidders) => {
            let names = bidders
                .iter()
                .map(|bidder| match bidder {
                    Value::String(name) => Ok(name.to_lowercase()),
                    other => Err(invalid(format!("invalid bidder {other}"))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Arc::new(SpecificBidderFilter::new(names, mode)))
        }
        other => Err(invalid(format!("invalid bidders value {other}"))),
    }
}

fn debug_entry(evaluation: &BidderEvaluation) -> Option<DebugEntry> {
    let message = evaluation.status.debug_message()?;
    let error = match evaluation.status {
        Status::Duplicate => format!("{message} {}", evaluation.syncer_key),
        _ => message.to_string(),
    };
    Some(DebugEntry {
        bidder: evaluation.bidder.clone(),
        error,
    })
}

pub struct CookieSyncHandler {
    state: Arc<SyncState>,
}

impl CookieSyncHandler {
    pub fn new(state: Arc<SyncState>) -> Self {
        CookieSyncHandler { state }
    }

    fn cookie_sync(
        &self,
        request: Request<Bytes>,
    ) -> Result<(Response<Bytes>, &'static str), EndpointError> {
        let (parts, body) = request.into_parts();
        let body: CookieSyncBody = serde_json::from_slice(&body)
            .map_err(|e| EndpointError::InvalidBody(e.to_string()))?;
        let config = &self.state.config;

        let gpp_sids = parse_gpp_sids(&body.gpp_sid)?;
        let gdpr_signal = GdprSignal::from_request(&gpp_sids, body.gdpr)?;
        let privacy = RequestPrivacy {
            gdpr_signal,
            gdpr_enforced: gdpr_signal.enforced(&config.gdpr),
            gdpr_consent: body.gdpr_consent.clone(),
            us_privacy: body.us_privacy.clone(),
            ccpa_enforced: config.ccpa.enforce,
            gpp: body.gpp.clone(),
            gpp_sid: body.gpp_sid.clone(),
            activity: self.state.activity.clone(),
        };
        if privacy.consent_missing() {
            return Err(EndpointError::ConsentRequired);
        }
        let macros = privacy.macros();

        let filters = body.filter_settings.as_ref();
        let sync_type_filter = SyncTypeFilter {
            iframe: parse_filter(filters.and_then(|f| f.iframe.as_ref()), "iframe")?,
            redirect: parse_filter(filters.and_then(|f| f.image.as_ref()), "image")?,
        };

        let cooperative = Cooperative {
            enabled: body
                .coop_sync
                .or(config.cookie_sync.default_coop_sync)
                .unwrap_or(config.user_sync.cooperative.enabled_by_default),
            priority_groups: config.user_sync.priority_groups.clone(),
        };

        let cookie = read_cookie(&parts.headers, self.state.decoder.as_ref(), &config.host_cookie);
        let chooser_request = ChooserRequest {
            bidders: (!body.bidders.is_empty()).then_some(body.bidders),
            cooperative,
            limit: config.cookie_sync.resolve_limit(body.limit),
            privacy: Arc::new(privacy),
            sync_type_filter,
            gpp_sid: body.gpp_sid,
            debug: body.debug,
        };
        tracing::debug!(
            account = %body.account,
            limit = chooser_request.limit,
            cooperative = chooser_request.cooperative.enabled,
            "cookie sync request"
        );

        let result = self.state.chooser.choose(&chooser_request, &cookie);
        record_evaluations(&result);
        let cookie_status = match cookie.has_any_live_syncs() {
            true => "ok",
            false => "no_cookie",
        };

        match result.status {
            Status::Ok => {}
            Status::BlockedByUserOptOut => return Err(EndpointError::OptedOut),
            status => {
                let response = CookieSyncResponse {
                    status: cookie_status,
                    bidder_status: Vec::new(),
                    debug: None,
                };
                return Ok((json_response(StatusCode::OK, &response)?, status.as_str()));
            }
        }

        let bidder_status = result
            .syncers_chosen
            .iter()
            .filter_map(|choice| {
                let sync_types = chooser_request
                    .sync_type_filter
                    .for_bidder(&choice.bidder.to_lowercase());
                match choice.syncer.get_sync(&sync_types, &macros) {
                    Ok(sync) => Some(BidderStatus {
                        bidder: choice.bidder.clone(),
                        no_cookie: true,
                        usersync: UserSyncInfo {
                            url: sync.url,
                            sync_type: sync.sync_type,
                            support_cors: sync.support_cors,
                        },
                    }),
                    Err(e) => {
                        tracing::debug!(bidder = %choice.bidder, error = %e, "no sync url");
                        None
                    }
                }
            })
            .collect();

        let response = CookieSyncResponse {
            status: cookie_status,
            bidder_status,
            debug: body.debug.then(|| {
                result
                    .bidders_evaluated
                    .iter()
                    .filter_map(debug_entry)
                    .collect()
            }),
        };
        Ok((json_response(StatusCode::OK, &response)?, Status::Ok.as_str()))
    }
}

fn record_evaluations(result: &ChooseResult) {
    for evaluation in &result.bidders_evaluated {
        if evaluation.syncer_key.is_empty() {
            continue;
        }
        counter!(
            COOKIE_SYNC_SYNCER,
            "syncer" => evaluation.syncer_key.clone(),
            "status" => evaluation.status.as_str().to_string()
        )
        .increment(1);
    }
}

#[async_trait]
impl Handler for CookieSyncHandler {
    fn name(&self) -> &'static str {
        "cookie_sync"
    }

    async fn handle(&self, request: Request<Bytes>) -> Result<Response<Bytes>, EndpointError> {
        let result = self.cookie_sync(request);
        let status = match &result {
            Ok((_, status)) => *status,
            Err(e) => e.metric_label(),
        };
        counter!(COOKIE_SYNC_REQUESTS, "status" => status).increment(1);
        result.map(|(response, _)| response)
    }
}
