use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

/// Running rating statistics of one laptop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rating {
    /// Number of scores received.
    pub count: u32,
    /// Mean of all scores received.
    pub average: f64,
}

impl Rating {
    /// Folds one score into the running mean without keeping a sum.
    fn add(&mut self, score: f64) {
        self.count += 1;
        self.average += (score - self.average) / f64::from(self.count);
    }
}

/// Per-laptop rating accumulators.
///
/// The map lock is only held to look up or create an entry; the update
/// itself runs under the entry's own lock, so scores for one laptop are
/// applied one at a time while different laptops update independently.
#[derive(Debug, Default)]
pub struct RatingStore {
    ratings: RwLock<HashMap<String, Arc<Mutex<Rating>>>>,
}

impl RatingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `score` to the rating of `laptop_id` and returns the updated
    /// statistics.
    pub async fn add(&self, laptop_id: &str, score: f64) -> Rating {
        let entry = self.entry(laptop_id).await;
        let mut rating = entry.lock().await;
        rating.add(score);
        *rating
    }

    /// Returns the current rating of `laptop_id`.
    pub async fn get(&self, laptop_id: &str) -> Option<Rating> {
        let entry = self.ratings.read().await.get(laptop_id).cloned()?;
        let rating = *entry.lock().await;
        Some(rating)
    }

    async fn entry(&self, laptop_id: &str) -> Arc<Mutex<Rating>> {
        if let Some(entry) = self.ratings.read().await.get(laptop_id) {
            return Arc::clone(entry);
        }

        let mut ratings = self.ratings.write().await;
        Arc::clone(ratings.entry(laptop_id.to_string()).or_default())
    }
}
