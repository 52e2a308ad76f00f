use crate::config::Config;
use crate::privacy::ActivityControl;
use std::collections::HashSet;
use std::sync::Arc;
use usersync::normalizer::{BidderNormalizer, CaseInsensitiveNormalizer};
use usersync::shuffler::{RandomShuffler, Shuffler};
use usersync::{
    Base64Decoder, Base64Encoder, BidderSyncers, Chooser, Decoder, Encoder, SentinelUids,
    StandardChooser, Syncer, SyncerBuildError, build_syncers,
};

/// Everything built once from config and shared by the endpoints.
pub struct SyncState {
    pub config: Config,
    pub syncers: BidderSyncers,
    pub chooser: Box<dyn Chooser>,
    pub normalizer: CaseInsensitiveNormalizer,
    pub encoder: Box<dyn Encoder>,
    pub decoder: Box<dyn Decoder>,
    pub sentinels: SentinelUids,
    pub activity: Arc<ActivityControl>,
}

impl SyncState {
    pub fn new(config: Config) -> Result<Self, Vec<SyncerBuildError>> {
        Self::with_shuffler(config, Arc::new(RandomShuffler))
    }

    pub fn with_shuffler(
        config: Config,
        shuffler: Arc<dyn Shuffler>,
    ) -> Result<Self, Vec<SyncerBuildError>> {
        let syncers = build_syncers(&config.user_sync, &config.external_url, &config.bidders)?;

        let bidders_known: HashSet<String> = config
            .bidders
            .iter()
            .filter(|(_, info)| info.is_enabled())
            .map(|(name, _)| name.clone())
            .collect();
        let normalizer = CaseInsensitiveNormalizer::new(bidders_known.iter().map(String::as_str));
        let chooser = StandardChooser::new(syncers.clone(), bidders_known, config.bidders.clone())
            .with_shuffler(shuffler);

        let sentinels = SentinelUids::default();
        let activity = Arc::new(ActivityControl::new(&config.activities.sync_user));

        Ok(SyncState {
            syncers,
            chooser: Box::new(chooser),
            normalizer,
            encoder: Box::new(Base64Encoder),
            decoder: Box::new(Base64Decoder {
                sentinels: sentinels.clone(),
            }),
            sentinels,
            activity,
            config,
        })
    }

    /// Resolves a requested bidder name to its configured name and syncer.
    pub fn syncer_for(&self, bidder: &str) -> Option<(String, Arc<dyn Syncer>)> {
        let name = self.normalizer.normalize(bidder)?;
        let syncer = self.syncers.get(&name)?.clone();
        Some((name, syncer))
    }

    pub fn is_priority_bidder(&self, bidder: &str) -> bool {
        self.config
            .user_sync
            .priority_groups
            .iter()
            .flatten()
            .any(|name| name.eq_ignore_ascii_case(bidder))
    }
}
