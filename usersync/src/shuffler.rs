use rand::seq::SliceRandom;

pub trait Shuffler: Send + Sync {
    fn shuffle(&self, items: &mut [String]);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomShuffler;

impl Shuffler for RandomShuffler {
    fn shuffle(&self, items: &mut [String]) {
        items.shuffle(&mut rand::rng());
    }
}
