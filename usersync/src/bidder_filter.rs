use crate::syncer::SyncType;
use std::collections::HashSet;
use std::sync::Arc;

/// Whether a bidder is permitted for a sync type.
pub trait BidderFilter: Send + Sync {
    fn allowed(&self, bidder: &str) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BidderFilterMode {
    Include,
    Exclude,
}

/// Applies the same answer to every bidder.
#[derive(Clone, Copy, Debug)]
pub struct UniformBidderFilter {
    pub mode: BidderFilterMode,
}

impl BidderFilter for UniformBidderFilter {
    fn allowed(&self, _bidder: &str) -> bool {
        self.mode == BidderFilterMode::Include
    }
}

/// Includes or excludes an explicit list of bidders.
#[derive(Clone, Debug)]
pub struct SpecificBidderFilter {
    bidders: HashSet<String>,
    mode: BidderFilterMode,
}

impl SpecificBidderFilter {
    pub fn new<I, S>(bidders: I, mode: BidderFilterMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SpecificBidderFilter {
            bidders: bidders.into_iter().map(Into::into).collect(),
            mode,
        }
    }
}

impl BidderFilter for SpecificBidderFilter {
    fn allowed(&self, bidder: &str) -> bool {
        let listed = self.bidders.contains(bidder);
        match self.mode {
            BidderFilterMode::Include => listed,
            BidderFilterMode::Exclude => !listed,
        }
    }
}

/// Per sync type filters for one request.
#[derive(Clone)]
pub struct SyncTypeFilter {
    pub iframe: Arc<dyn BidderFilter>,
    pub redirect: Arc<dyn BidderFilter>,
}

impl Default for SyncTypeFilter {
    fn default() -> Self {
        let include_all: Arc<dyn BidderFilter> = Arc::new(UniformBidderFilter {
            mode: BidderFilterMode::Include,
        });
        SyncTypeFilter {
            iframe: include_all.clone(),
            redirect: include_all,
        }
    }
}

impl SyncTypeFilter {
    pub fn for_bidder(&self, bidder: &str) -> Vec<SyncType> {
        let mut sync_types = Vec::with_capacity(2);
        if self.iframe.allowed(bidder) {
            sync_types.push(SyncType::IFrame);
        }
        if self.redirect.allowed(bidder) {
            sync_types.push(SyncType::Redirect);
        }
        sync_types
    }
}
