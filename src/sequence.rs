use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A captured generation value. Only the value most recently handed out by
/// an [`Authority`] is live; everything older is stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(u64);

/// Monotonic generation counter used for cooperative cancellation.
///
/// A running sequence captures a token up front and re-checks it against
/// the authority at every resumption point before touching the view. There
/// is no explicit cancel signal: superseding the counter is the
/// cancellation.
#[derive(Debug, Default)]
pub struct Authority {
    current: u64,
}

impl Authority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede whatever sequence currently holds the live token and
    /// return the new one.
    pub fn invalidate(&mut self) -> Token {
        self.current = self.current.wrapping_add(1);
        Token(self.current)
    }

    pub fn current(&self) -> Token {
        Token(self.current)
    }

    pub fn is_valid(&self, token: Token) -> bool {
        token.0 == self.current
    }
}

/// Non-repeating randomized picks from a fixed pool.
///
/// Items are drawn from a shuffled bag; the bag is reshuffled once empty,
/// and a fresh bag never leads with the item returned immediately before
/// the reshuffle (unless the pool has a single item).
pub struct ShuffledCycle<T: Clone + PartialEq> {
    pool: Vec<T>,
    bag: Vec<T>,
    last: Option<T>,
}

impl<T: Clone + PartialEq> ShuffledCycle<T> {
    pub fn new(pool: Vec<T>) -> Self {
        Self {
            pool,
            bag: Vec::new(),
            last: None,
        }
    }

    pub fn next(&mut self) -> Option<T> {
        if self.pool.is_empty() {
            return None;
        }
        if self.bag.is_empty() {
            self.bag = self.pool.clone();
            self.bag.shuffle(&mut rand::thread_rng());
            if self.bag.len() > 1 && self.last.as_ref() == self.bag.first() {
                let front = self.bag.remove(0);
                self.bag.push(front);
            }
        }
        let val = self.bag.remove(0);
        self.last = Some(val.clone());
        Some(val)
    }
}

/// Inclusive delay bounds for the randomized beats between playback steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl DelayRange {
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self::from_millis(ms, ms)
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = (self.max - self.min).as_millis() as u64;
        self.min + Duration::from_millis(rng.gen_range(0..=span))
    }
}
