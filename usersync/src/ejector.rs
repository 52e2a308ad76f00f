use crate::cookie::UidEntry;
use crate::syncer::Syncer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EjectorError {
    #[error("no uids to eject")]
    NoUids,
    #[error("syncer key is not a priority, and there are only priority elements left")]
    SyncerNotPriority,
}

/// Picks the syncer key whose uid is removed when the cookie is too large.
pub trait Ejector {
    fn choose(&mut self, uids: &HashMap<String, UidEntry>) -> Result<String, EjectorError>;
}

/// Ejects the uid closest to expiry.
#[derive(Clone, Copy, Debug, Default)]
pub struct OldestEjector;

impl Ejector for OldestEjector {
    fn choose(&mut self, uids: &HashMap<String, UidEntry>) -> Result<String, EjectorError> {
        uids.iter()
            .min_by(|(ka, a), (kb, b)| a.expires.cmp(&b.expires).then_with(|| ka.cmp(kb)))
            .map(|(key, _)| key.clone())
            .ok_or(EjectorError::NoUids)
    }
}

/// Ejects non-priority uids first, then works upward from the lowest priority group.
///
/// `priority_groups` is ordered highest priority first and holds bidder names; groups
/// are consumed as their members get ejected, so one ejector serves one cookie write.
pub struct PriorityBidderEjector {
    pub priority_groups: Vec<Vec<String>>,
    pub syncers_by_bidder: HashMap<String, Arc<dyn Syncer>>,
    /// Whether the syncer being written belongs to a priority group.
    pub is_syncer_priority: bool,
    pub tie_ejector: Box<dyn Ejector + Send>,
}

impl PriorityBidderEjector {
    /// Bidder names in priority groups match configured bidders case-insensitively.
    fn syncer_key<'a>(&'a self, bidder: &'a str) -> &'a str {
        self.syncers_by_bidder
            .get(bidder)
            .or_else(|| {
                self.syncers_by_bidder
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(bidder))
                    .map(|(_, syncer)| syncer)
            })
            .map(|syncer| syncer.key())
            .unwrap_or(bidder)
    }

    fn choose_from_priority_groups(
        &mut self,
        uids: &HashMap<String, UidEntry>,
    ) -> Result<String, EjectorError> {
        while let Some(lowest) = self.priority_groups.last() {
            let present: HashMap<String, UidEntry> = lowest
                .iter()
                .filter_map(|bidder| {
                    let key = self.syncer_key(bidder);
                    uids.get(key).map(|entry| (key.to_string(), entry.clone()))
                })
                .collect();

            if present.is_empty() {
                self.priority_groups.pop();
                continue;
            }

            let victim = if present.len() == 1 {
                present.into_keys().next().ok_or(EjectorError::NoUids)?
            } else {
                self.tie_ejector.choose(&present)?
            };
            self.remove_from_lowest_group(&victim);
            return Ok(victim);
        }
        Err(EjectorError::NoUids)
    }

    fn remove_from_lowest_group(&mut self, key: &str) {
        let Some(mut lowest) = self.priority_groups.pop() else {
            return;
        };
        lowest.retain(|bidder| self.syncer_key(bidder) != key);
        if !lowest.is_empty() {
            self.priority_groups.push(lowest);
        }
    }
}

impl Ejector for PriorityBidderEjector {
    fn choose(&mut self, uids: &HashMap<String, UidEntry>) -> Result<String, EjectorError> {
        let priority_keys: HashSet<String> = self
            .priority_groups
            .iter()
            .flatten()
            .map(|bidder| self.syncer_key(bidder).to_string())
            .collect();

        let non_priority: HashMap<String, UidEntry> = uids
            .iter()
            .filter(|(key, _)| !priority_keys.contains(key.as_str()))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        // the only non-priority uid is the one being written
        if non_priority.len() == 1 && !self.is_syncer_priority && !self.priority_groups.is_empty()
        {
            return Err(EjectorError::SyncerNotPriority);
        }

        if !non_priority.is_empty() {
            return self.tie_ejector.choose(&non_priority);
        }

        self.choose_from_priority_groups(uids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privacy::PrivacyMacros;
    use crate::syncer::{SyncInfo, SyncType, SyncerError};
    use chrono::{DateTime, Duration, Utc};

    #[derive(Debug)]
    struct FakeSyncer {
        key: String,
    }

    impl Syncer for FakeSyncer {
        fn key(&self) -> &str {
            &self.key
        }

        fn default_response_format(&self) -> SyncType {
            SyncType::Redirect
        }

        fn supports_type(&self, _: &[SyncType]) -> bool {
            true
        }

        fn get_sync(&self, _: &[SyncType], _: &PrivacyMacros) -> Result<SyncInfo, SyncerError> {
            Err(SyncerError::NoSyncTypesSupported)
        }
    }

    fn uids(entries: &[(&str, i64)]) -> HashMap<String, UidEntry> {
        let base: DateTime<Utc> = Utc::now();
        entries
            .iter()
            .map(|(key, days)| {
                (
                    key.to_string(),
                    UidEntry {
                        uid: format!("{key}-uid"),
                        expires: base + Duration::days(*days),
                    },
                )
            })
            .collect()
    }

    fn groups(groups: &[&[&str]]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|g| g.iter().map(|b| b.to_string()).collect())
            .collect()
    }

    fn ejector(priority_groups: &[&[&str]], is_syncer_priority: bool) -> PriorityBidderEjector {
        PriorityBidderEjector {
            priority_groups: groups(priority_groups),
            syncers_by_bidder: HashMap::new(),
            is_syncer_priority,
            tie_ejector: Box::new(OldestEjector),
        }
    }

    #[test]
    fn test_oldest_ejector() {
        let mut ejector = OldestEjector;
        assert_eq!(
            ejector.choose(&uids(&[("a", 3), ("b", 1), ("c", 2)])),
            Ok("b".to_string())
        );
        assert_eq!(ejector.choose(&HashMap::new()), Err(EjectorError::NoUids));
    }

    #[test]
    fn test_priority_ejects_non_priority_first() {
        let mut ejector = ejector(&[&["a", "b"], &["c"]], true);
        let uids = uids(&[("a", 1), ("c", 1), ("x", 5), ("y", 3)]);
        assert_eq!(ejector.choose(&uids), Ok("y".to_string()));
    }

    #[test]
    fn test_priority_refuses_last_non_priority() {
        let mut ejector = ejector(&[&["a", "b"], &["c"]], false);
        let cookie_uids = uids(&[("a", 1), ("c", 1), ("x", 5)]);
        assert_eq!(
            ejector.choose(&cookie_uids),
            Err(EjectorError::SyncerNotPriority)
        );

        // without priority groups everything is non-priority
        let mut ejector = PriorityBidderEjector {
            priority_groups: Vec::new(),
            ..ejector
        };
        assert_eq!(ejector.choose(&uids(&[("x", 5)])), Ok("x".to_string()));
    }

    #[test]
    fn test_priority_ejects_lowest_group() {
        let mut ejector = ejector(&[&["a", "b"], &["c", "d"], &["e"]], true);
        let mut uids = uids(&[("a", 1), ("b", 2), ("c", 5), ("d", 3)]);

        // "e" has no uid, its group is dropped and the older of c and d goes
        assert_eq!(ejector.choose(&uids), Ok("d".to_string()));
        uids.remove("d");
        assert_eq!(ejector.priority_groups, groups(&[&["a", "b"], &["c"]]));

        // single member left in the lowest group
        assert_eq!(ejector.choose(&uids), Ok("c".to_string()));
        uids.remove("c");
        assert_eq!(ejector.priority_groups, groups(&[&["a", "b"]]));

        assert_eq!(ejector.choose(&uids), Ok("a".to_string()));
    }

    #[test]
    fn test_priority_resolves_bidders_to_syncer_keys() {
        let mut ejector = ejector(&[&["appnexus"], &["rubicon"]], true);
        ejector.syncers_by_bidder.insert(
            "appnexus".into(),
            Arc::new(FakeSyncer {
                key: "adnxs".into(),
            }),
        );
        let mut uids = uids(&[("adnxs", 1), ("rubicon", 2)]);
        assert_eq!(ejector.choose(&uids), Ok("rubicon".to_string()));
        uids.remove("rubicon");
        assert_eq!(ejector.choose(&uids), Ok("adnxs".to_string()));
    }

    #[test]
    fn test_priority_group_names_ignore_case() {
        let mut ejector = ejector(&[&["AppNexus"], &["other"]], true);
        ejector.syncers_by_bidder.insert(
            "appnexus".into(),
            Arc::new(FakeSyncer {
                key: "adnxs".into(),
            }),
        );
        let mut uids = uids(&[("adnxs", 1), ("other", 2)]);
        assert_eq!(ejector.choose(&uids), Ok("other".to_string()));
        uids.remove("other");
        assert_eq!(ejector.choose(&uids), Ok("adnxs".to_string()));
    }
}
