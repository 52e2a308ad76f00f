use crate::shuffler::Shuffler;
use std::sync::Arc;

/// Cooperative syncing settings for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cooperative {
    pub enabled: bool,
    /// Highest priority first.
    pub priority_groups: Vec<Vec<String>>,
}

/// Orders the bidders a request's syncs are chosen from.
pub trait BidderChooser: Send + Sync {
    /// `requested` of `None` means every available bidder. The result may hold
    /// duplicates; callers keep the first occurrence.
    fn choose(
        &self,
        requested: Option<&[String]>,
        available: &[String],
        cooperative: &Cooperative,
    ) -> Vec<String>;
}

pub struct StandardBidderChooser {
    shuffler: Arc<dyn Shuffler>,
}

impl StandardBidderChooser {
    pub fn new(shuffler: Arc<dyn Shuffler>) -> Self {
        StandardBidderChooser { shuffler }
    }

    fn shuffled_append(&self, bidders: &mut Vec<String>, segment: &[String]) {
        let start = bidders.len();
        bidders.extend_from_slice(segment);
        self.shuffler.shuffle(&mut bidders[start..]);
    }
}

impl BidderChooser for StandardBidderChooser {
    fn choose(
        &self,
        requested: Option<&[String]>,
        available: &[String],
        cooperative: &Cooperative,
    ) -> Vec<String> {
        let Some(requested) = requested else {
            let mut bidders = Vec::with_capacity(available.len());
            self.shuffled_append(&mut bidders, available);
            return bidders;
        };

        let mut bidders = Vec::with_capacity(if cooperative.enabled {
            available.len() * 3 / 2
        } else {
            requested.len()
        });
        self.shuffled_append(&mut bidders, requested);
        if !cooperative.enabled {
            return bidders;
        }

        for group in &cooperative.priority_groups {
            self.shuffled_append(&mut bidders, group);
        }
        self.shuffled_append(&mut bidders, available);
        bidders
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Deterministic stand-in for random shuffling.
    pub(crate) struct ReverseShuffler;

    impl Shuffler for ReverseShuffler {
        fn shuffle(&self, items: &mut [String]) {
            items.reverse();
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn chooser() -> StandardBidderChooser {
        StandardBidderChooser::new(Arc::new(ReverseShuffler))
    }

    #[test]
    fn test_choose_all_available() {
        let available = strings(&["a1", "a2"]);
        let cooperative = Cooperative {
            enabled: true,
            priority_groups: vec![strings(&["pr1"])],
        };
        assert_eq!(
            chooser().choose(None, &available, &cooperative),
            strings(&["a2", "a1"])
        );
    }

    #[test]
    fn test_choose_requested_without_cooperative() {
        let requested = strings(&["r1", "r2", "r3"]);
        let available = strings(&["a1", "a2"]);
        assert_eq!(
            chooser().choose(Some(requested.as_slice()), &available, &Cooperative::default()),
            strings(&["r3", "r2", "r1"])
        );
        assert!(
            chooser()
                .choose(Some(&[] as &[String]), &available, &Cooperative::default())
                .is_empty()
        );
    }

    #[test]
    fn test_choose_cooperative() {
        let requested = strings(&["r1", "r2"]);
        let available = strings(&["a1", "a2", "r1"]);
        let cooperative = Cooperative {
            enabled: true,
            priority_groups: vec![strings(&["pr1", "pr2"]), strings(&["pr3"])],
        };
        assert_eq!(
            chooser().choose(Some(requested.as_slice()), &available, &cooperative),
            strings(&["r2", "r1", "pr2", "pr1", "pr3", "r1", "a2", "a1"])
        );
    }
}
