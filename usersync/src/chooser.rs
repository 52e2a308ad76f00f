use crate::bidder_chooser::{BidderChooser, Cooperative, StandardBidderChooser};
use crate::bidder_filter::SyncTypeFilter;
use crate::config::BidderInfos;
use crate::cookie::Cookie;
use crate::normalizer::{BidderNormalizer, CaseInsensitiveNormalizer};
use crate::privacy::Privacy;
use crate::shuffler::{RandomShuffler, Shuffler};
use crate::syncer::Syncer;
use crate::syncers_builder::BidderSyncers;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Outcome of a choose call, or of evaluating one bidder within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    BlockedByUserOptOut,
    AlreadySynced,
    UnknownBidder,
    RejectedByFilter,
    Duplicate,
    BlockedByPrivacy,
    BlockedByRegulationScope,
    UnconfiguredBidder,
    BlockedByDisabledUsersync,
}

impl Status {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::BlockedByUserOptOut => "blocked_by_user_opt_out",
            Status::AlreadySynced => "already_synced",
            Status::UnknownBidder => "unknown_bidder",
            Status::RejectedByFilter => "rejected_by_filter",
            Status::Duplicate => "duplicate",
            Status::BlockedByPrivacy => "blocked_by_privacy",
            Status::BlockedByRegulationScope => "blocked_by_regulation_scope",
            Status::UnconfiguredBidder => "unconfigured_bidder",
            Status::BlockedByDisabledUsersync => "blocked_by_disabled_usersync",
        }
    }

    /// Human readable reason shown in debug output. `None` for successful evaluations.
    pub const fn debug_message(&self) -> Option<&'static str> {
        match self {
            Status::Ok => None,
            Status::BlockedByUserOptOut => Some("Sync blocked by user opt out"),
            Status::AlreadySynced => Some("Already in sync"),
            Status::UnknownBidder => Some("Unsupported bidder"),
            Status::RejectedByFilter => Some("Rejected by request filter"),
            Status::Duplicate => Some("Duplicate bidder synced as"),
            Status::BlockedByPrivacy => Some("Rejected by privacy"),
            Status::BlockedByRegulationScope => Some("Rejected by regulation scope"),
            Status::UnconfiguredBidder => Some("No sync config"),
            Status::BlockedByDisabledUsersync => Some("Sync disabled by config"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidderEvaluation {
    pub bidder: String,
    /// Empty when the bidder has no syncer.
    pub syncer_key: String,
    pub status: Status,
}

#[derive(Clone, Debug)]
pub struct SyncerChoice {
    pub bidder: String,
    pub syncer: Arc<dyn Syncer>,
}

#[derive(Clone, Debug)]
pub struct ChooseResult {
    pub status: Status,
    pub bidders_evaluated: Vec<BidderEvaluation>,
    pub syncers_chosen: Vec<SyncerChoice>,
}

impl ChooseResult {
    fn blocked(status: Status) -> Self {
        ChooseResult {
            status,
            bidders_evaluated: Vec::new(),
            syncers_chosen: Vec::new(),
        }
    }
}

pub struct Request {
    /// `None` syncs from every available bidder.
    pub bidders: Option<Vec<String>>,
    pub cooperative: Cooperative,
    /// Zero or less means unlimited.
    pub limit: i64,
    pub privacy: Arc<dyn Privacy>,
    pub sync_type_filter: SyncTypeFilter,
    pub gpp_sid: String,
    pub debug: bool,
}

/// Decides which bidders a user should sync with.
pub trait Chooser: Send + Sync {
    fn choose(&self, request: &Request, cookie: &Cookie) -> ChooseResult;
}

pub struct StandardChooser {
    bidder_syncers: BidderSyncers,
    bidders_available: Vec<String>,
    bidders_known: HashSet<String>,
    bidder_infos: BidderInfos,
    normalizer: Arc<dyn BidderNormalizer>,
    bidder_chooser: Box<dyn BidderChooser>,
}

impl StandardChooser {
    /// `bidders_known` holds every enabled bidder name, with or without a syncer.
    pub fn new(
        bidder_syncers: BidderSyncers,
        bidders_known: HashSet<String>,
        bidder_infos: BidderInfos,
    ) -> Self {
        let mut bidders_available: Vec<String> = bidder_syncers.keys().cloned().collect();
        bidders_available.sort();

        let normalizer = CaseInsensitiveNormalizer::new(
            bidder_infos
                .keys()
                .chain(bidders_known.iter())
                .chain(bidder_syncers.keys())
                .map(String::as_str),
        );

        StandardChooser {
            bidder_syncers,
            bidders_available,
            bidders_known,
            bidder_infos,
            normalizer: Arc::new(normalizer),
            bidder_chooser: Box::new(StandardBidderChooser::new(Arc::new(RandomShuffler))),
        }
    }

    pub fn with_shuffler(mut self, shuffler: Arc<dyn Shuffler>) -> Self {
        self.bidder_chooser = Box::new(StandardBidderChooser::new(shuffler));
        self
    }

    pub fn with_bidder_chooser(mut self, bidder_chooser: Box<dyn BidderChooser>) -> Self {
        self.bidder_chooser = bidder_chooser;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn BidderNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn bidders_available(&self) -> &[String] {
        &self.bidders_available
    }

    fn evaluate(
        &self,
        bidder: &str,
        syncers_seen: &mut HashSet<String>,
        request: &Request,
        cookie: &Cookie,
    ) -> (Option<Arc<dyn Syncer>>, BidderEvaluation) {
        let evaluation = |syncer_key: &str, status| BidderEvaluation {
            bidder: bidder.to_string(),
            syncer_key: syncer_key.to_string(),
            status,
        };

        let Some(name) = self.normalizer.normalize(bidder) else {
            return (None, evaluation("", Status::UnknownBidder));
        };

        let Some(syncer) = self.bidder_syncers.get(&name) else {
            let status = if self.bidders_known.contains(&name) {
                Status::UnconfiguredBidder
            } else {
                Status::UnknownBidder
            };
            return (None, evaluation("", status));
        };
        let key = syncer.key();

        if syncers_seen.contains(key) {
            return (None, evaluation(key, Status::Duplicate));
        }

        let sync_types = request.sync_type_filter.for_bidder(&name.to_lowercase());
        if !syncer.supports_type(&sync_types) {
            return (None, evaluation(key, Status::RejectedByFilter));
        }

        if cookie.has_live_sync(key) {
            return (None, evaluation(key, Status::AlreadySynced));
        }

        let privacy = &request.privacy;
        if !privacy.activity_allows_user_sync(&name)
            || !privacy.gdpr_allows_bidder_sync(&name)
            || !privacy.ccpa_allows_bidder_sync(&name)
        {
            return (None, evaluation(key, Status::BlockedByPrivacy));
        }

        let syncer_config = self
            .bidder_infos
            .get(&name)
            .and_then(|info| info.syncer.as_ref());
        if syncer_config.is_some_and(|config| config.is_disabled()) {
            return (None, evaluation(key, Status::BlockedByDisabledUsersync));
        }

        if let Some(skip_when) = syncer_config.and_then(|config| config.skip_when.as_ref()) {
            if privacy.gdpr_in_scope() && skip_when.gdpr {
                return (None, evaluation(key, Status::BlockedByRegulationScope));
            }
            if skip_when.gpp_sid.iter().any(|sid| *sid == request.gpp_sid) {
                return (None, evaluation(key, Status::BlockedByRegulationScope));
            }
        }

        syncers_seen.insert(key.to_string());
        (Some(syncer.clone()), evaluation(key, Status::Ok))
    }
}

impl Chooser for StandardChooser {
    fn choose(&self, request: &Request, cookie: &Cookie) -> ChooseResult {
        if !cookie.allow_syncs() {
            return ChooseResult::blocked(Status::BlockedByUserOptOut);
        }
        if !request.privacy.gdpr_allows_host_cookie() {
            return ChooseResult::blocked(Status::BlockedByPrivacy);
        }

        let candidates = self.bidder_chooser.choose(
            request.bidders.as_deref(),
            &self.bidders_available,
            &request.cooperative,
        );

        let limit = usize::try_from(request.limit).ok().filter(|l| *l > 0);
        let mut bidders_seen = HashSet::new();
        let mut syncers_seen = HashSet::new();
        let mut bidders_evaluated = Vec::new();
        let mut syncers_chosen = Vec::new();

        for bidder in &candidates {
            if limit.is_some_and(|limit| syncers_chosen.len() >= limit) {
                break;
            }
            if !bidders_seen.insert(bidder.as_str()) {
                continue;
            }

            let (syncer, evaluation) = self.evaluate(bidder, &mut syncers_seen, request, cookie);
            if let Some(syncer) = syncer {
                syncers_chosen.push(SyncerChoice {
                    bidder: bidder.clone(),
                    syncer,
                });
            }
            bidders_evaluated.push(evaluation);
        }

        ChooseResult {
            status: Status::Ok,
            bidders_evaluated,
            syncers_chosen,
        }
    }
}
