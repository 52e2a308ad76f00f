//! User sync engine: decides which bidders a browser should sync ids with,
//! renders their sync urls and maintains the uid cookie.

pub mod bidder_chooser;
pub mod bidder_filter;
pub mod chooser;
pub mod codec;
pub mod config;
pub mod cookie;
pub mod ejector;
pub mod http_cookie;
pub mod metrics_defs;
pub mod normalizer;
pub mod privacy;
pub mod shuffler;
pub mod syncer;
pub mod syncers_builder;
pub mod template;

pub use bidder_chooser::{BidderChooser, Cooperative, StandardBidderChooser};
pub use bidder_filter::{
    BidderFilter, BidderFilterMode, SpecificBidderFilter, SyncTypeFilter, UniformBidderFilter,
};
pub use chooser::{
    BidderEvaluation, ChooseResult, Chooser, Request, StandardChooser, Status, SyncerChoice,
};
pub use codec::{Base64Decoder, Base64Encoder, Decoder, Encoder};
pub use cookie::{Cookie, CookieError, SentinelUids, UidEntry};
pub use ejector::{Ejector, EjectorError, OldestEjector, PriorityBidderEjector};
pub use privacy::{Privacy, PrivacyMacros};
pub use syncer::{StandardSyncer, SyncInfo, SyncType, Syncer, SyncerError};
pub use syncers_builder::{BidderSyncers, SyncerBuildError, build_syncers};
