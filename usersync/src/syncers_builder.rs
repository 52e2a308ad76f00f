use crate::config::{BidderInfo, BidderInfos, SyncerConfig, UserSyncConfig};
use crate::syncer::{NewSyncerError, StandardSyncer, Syncer};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Syncers keyed by bidder name. Bidders sharing a syncer key get distinct
/// syncers with the same key.
pub type BidderSyncers = HashMap<String, Arc<dyn Syncer>>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncerBuildError {
    #[error("cannot create syncer for bidder {bidder} with key {key}: {source}")]
    Syncer {
        bidder: String,
        key: String,
        source: NewSyncerError,
    },
    #[error("found no syncer config for bidder {0}")]
    MissingConfig(String),
    #[error("syncer key of alias bidder {alias} is same as the syncer key for its parent bidder {parent}")]
    AliasSharesParentKey { alias: String, parent: String },
    #[error(
        "bidders {0} share the same syncer key, but none define endpoints (iframe and/or redirect)"
    )]
    NoEndpoints(String),
    #[error(
        "bidders {0} define endpoints (iframe and/or redirect) for the same syncer key, but only one bidder is permitted to define endpoints"
    )]
    ManyEndpoints(String),
    #[error(
        "alias bidders {0} of different parents defines endpoints (iframe and/or redirect) for the same syncer key, but only one bidder is permitted to define endpoints"
    )]
    AliasesOfDifferentParents(String),
    #[error(
        "alias bidders {aliases} and non-alias bidder {bidder} defines endpoints (iframe and/or redirect) for the same syncer key, but only one bidder is permitted to define endpoints"
    )]
    AliasesAndBidder { aliases: String, bidder: String },
}

#[derive(Clone, Debug, PartialEq)]
struct NamedSyncerConfig<'a> {
    name: &'a str,
    alias_of: Option<&'a str>,
    config: &'a SyncerConfig,
}

/// A config that only lists `supports` is informational and gets no syncer.
fn defines_syncer(config: &SyncerConfig) -> bool {
    !config.key.is_empty()
        || config.has_endpoints()
        || !config.external_url.is_empty()
        || config.support_cors.is_some()
        || config.format_override.as_deref().is_some_and(|f| !f.is_empty())
        || config.skip_when.is_some()
}

/// Own syncer config, or the parent's for an alias that declares none.
fn effective_config<'a>(
    bidder_infos: &'a BidderInfos,
    info: &'a BidderInfo,
) -> Option<(&'a SyncerConfig, bool)> {
    if let Some(config) = info.syncer.as_ref() {
        return Some((config, false));
    }
    let parent = info.alias_of.as_deref()?;
    bidder_infos
        .get(parent)?
        .syncer
        .as_ref()
        .map(|config| (config, true))
}

fn syncer_key(
    bidder_infos: &BidderInfos,
    bidder: &str,
    info: &BidderInfo,
) -> Result<String, SyncerBuildError> {
    let Some((config, inherited)) = effective_config(bidder_infos, info) else {
        return Err(SyncerBuildError::MissingConfig(bidder.to_string()));
    };

    if !config.key.is_empty() {
        if !inherited
            && let Some(parent) = info.alias_of.as_deref()
            && let Some(parent_config) = bidder_infos.get(parent).and_then(|p| p.syncer.as_ref())
            && parent_config.key == config.key
        {
            return Err(SyncerBuildError::AliasSharesParentKey {
                alias: bidder.to_string(),
                parent: parent.to_string(),
            });
        }
        return Ok(config.key.clone());
    }

    match (inherited, info.alias_of.as_deref()) {
        (true, Some(parent)) => Ok(parent.to_string()),
        _ => Ok(bidder.to_string()),
    }
}

/// Picks the one config allowed to define endpoints for a shared key.
fn choose_syncer_config<'a>(
    configs: &[NamedSyncerConfig<'a>],
) -> Result<NamedSyncerConfig<'a>, SyncerBuildError> {
    if let [only] = configs {
        return Ok(only.clone());
    }

    let (aliases, bidders): (Vec<_>, Vec<_>) = configs
        .iter()
        .filter(|c| c.config.has_endpoints())
        .partition(|c| c.alias_of.is_some());

    let names = |configs: &[&NamedSyncerConfig<'_>]| {
        configs.iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
    };

    if aliases.is_empty() && bidders.is_empty() {
        let all = configs.iter().collect::<Vec<_>>();
        return Err(SyncerBuildError::NoEndpoints(names(&all)));
    }
    if bidders.len() > 1 {
        return Err(SyncerBuildError::ManyEndpoints(names(&bidders)));
    }

    let parents: BTreeSet<_> = aliases.iter().filter_map(|c| c.alias_of).collect();
    if parents.len() > 1 {
        return Err(SyncerBuildError::AliasesOfDifferentParents(names(&aliases)));
    }

    match (bidders.as_slice(), aliases.as_slice()) {
        ([bidder], []) => Ok((*bidder).clone()),
        ([], [alias]) => Ok((*alias).clone()),
        ([bidder], [alias]) if alias.alias_of == Some(bidder.name) => Ok((*alias).clone()),
        ([bidder], _) => Err(SyncerBuildError::AliasesAndBidder {
            aliases: names(&aliases),
            bidder: bidder.name.to_string(),
        }),
        _ => Err(SyncerBuildError::ManyEndpoints(names(&aliases))),
    }
}

/// Builds a syncer for every enabled bidder with syncer config, reporting every problem found.
pub fn build_syncers(
    user_sync: &UserSyncConfig,
    host_external_url: &str,
    bidder_infos: &BidderInfos,
) -> Result<BidderSyncers, Vec<SyncerBuildError>> {
    let mut names: Vec<&String> = bidder_infos.keys().collect();
    names.sort();

    let mut errors = Vec::new();
    let mut by_key: IndexMap<String, Vec<NamedSyncerConfig<'_>>> = IndexMap::new();

    for name in names {
        let info = &bidder_infos[name];
        let Some((config, _)) = effective_config(bidder_infos, info) else {
            continue;
        };
        if info.disabled || !defines_syncer(config) {
            continue;
        }
        match syncer_key(bidder_infos, name, info) {
            Ok(key) => by_key.entry(key).or_default().push(NamedSyncerConfig {
                name,
                alias_of: info.alias_of.as_deref(),
                config,
            }),
            Err(e) => errors.push(e),
        }
    }

    let mut syncers = BidderSyncers::new();
    for (key, configs) in &by_key {
        let primary = match choose_syncer_config(configs) {
            Ok(primary) => primary,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        for bidder in configs {
            match StandardSyncer::new(
                user_sync,
                host_external_url,
                key,
                bidder.name,
                primary.config,
            ) {
                Ok(syncer) => {
                    syncers.insert(bidder.name.to_string(), Arc::new(syncer));
                }
                Err(source) => errors.push(SyncerBuildError::Syncer {
                    bidder: primary.name.to_string(),
                    key: key.clone(),
                    source,
                }),
            }
        }
    }

    if errors.is_empty() {
        tracing::info!(count = syncers.len(), "built user syncers");
        Ok(syncers)
    } else {
        Err(errors)
    }
}
