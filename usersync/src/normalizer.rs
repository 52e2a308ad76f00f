use std::collections::HashMap;

/// Maps a requested bidder name onto its canonical configured name.
pub trait BidderNormalizer: Send + Sync {
    fn normalize(&self, bidder: &str) -> Option<String>;
}

/// Case-insensitive lookup over a fixed set of bidder names.
#[derive(Clone, Debug, Default)]
pub struct CaseInsensitiveNormalizer {
    by_lowercase: HashMap<String, String>,
}

impl CaseInsensitiveNormalizer {
    pub fn new<'a>(bidders: impl IntoIterator<Item = &'a str>) -> Self {
        CaseInsensitiveNormalizer {
            by_lowercase: bidders
                .into_iter()
                .map(|b| (b.to_lowercase(), b.to_string()))
                .collect(),
        }
    }
}

impl BidderNormalizer for CaseInsensitiveNormalizer {
    fn normalize(&self, bidder: &str) -> Option<String> {
        self.by_lowercase.get(&bidder.to_lowercase()).cloned()
    }
}
