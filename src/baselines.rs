//! Average-based rating baselines.
//!
//! These are the sanity-check models every factorization run is compared
//! against: the global rating average, and per-user / per-item averages
//! with a global fallback for unseen entities.

use crate::error::{Error, Result};
use crate::ratings::RatingStore;
use crate::recommender::{IterativeModel, RatingPredictor};

fn ensure_not_empty(ratings: &RatingStore) -> Result<()> {
    if ratings.is_empty() {
        return Err(Error::Config("training data is empty".into()));
    }
    Ok(())
}

/// Predicts the global rating average for every pair.
pub struct GlobalAverage {
    ratings: RatingStore,
    global_average: f64,
}

impl GlobalAverage {
    pub fn new(ratings: RatingStore) -> Self {
        Self {
            ratings,
            global_average: 0.0,
        }
    }
}

impl IterativeModel for GlobalAverage {
    fn train(&mut self) -> Result<()> {
        ensure_not_empty(&self.ratings)?;
        self.global_average = self.ratings.average();
        Ok(())
    }

    // nothing to refine once the average is known
    fn iterate(&mut self) -> Result<()> {
        Ok(())
    }

    fn compute_fit(&self) -> f64 {
        rmse_on_training(self, &self.ratings)
    }
}

impl RatingPredictor for GlobalAverage {
    fn predict(&self, _user_id: u32, _item_id: u32) -> f64 {
        self.global_average
    }
}

/// Which side of the interaction an [`EntityAverage`] aggregates over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    User,
    Item,
}

/// Per-entity rating average with a global-average fallback.
pub struct EntityAverage {
    ratings: RatingStore,
    side: Side,
    averages: Vec<f64>,
    counts: Vec<usize>,
    global_average: f64,
}

impl EntityAverage {
    fn new(ratings: RatingStore, side: Side) -> Self {
        Self {
            ratings,
            side,
            averages: Vec::new(),
            counts: Vec::new(),
            global_average: 0.0,
        }
    }

    fn entity(&self, position: usize) -> usize {
        match self.side {
            Side::User => self.ratings.user(position) as usize,
            Side::Item => self.ratings.item(position) as usize,
        }
    }

    fn predict_entity(&self, id: usize) -> f64 {
        if id < self.averages.len() && self.counts[id] > 0 {
            self.averages[id]
        } else {
            self.global_average
        }
    }
}

impl IterativeModel for EntityAverage {
    fn train(&mut self) -> Result<()> {
        ensure_not_empty(&self.ratings)?;
        let num_entities = match self.side {
            Side::User => self.ratings.max_user_id() as usize + 1,
            Side::Item => self.ratings.max_item_id() as usize + 1,
        };
        self.global_average = self.ratings.average();
        let mut sums = vec![0.0; num_entities];
        let mut counts = vec![0usize; num_entities];
        for position in 0..self.ratings.len() {
            let id = self.entity(position);
            sums[id] += self.ratings.value(position);
            counts[id] += 1;
        }
        self.averages = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
            .collect();
        self.counts = counts;
        Ok(())
    }

    fn iterate(&mut self) -> Result<()> {
        Ok(())
    }

    fn compute_fit(&self) -> f64 {
        rmse_on_training(self, &self.ratings)
    }
}

impl RatingPredictor for EntityAverage {
    fn predict(&self, user_id: u32, item_id: u32) -> f64 {
        match self.side {
            Side::User => self.predict_entity(user_id as usize),
            Side::Item => self.predict_entity(item_id as usize),
        }
    }
}

/// Per-user average rating, global average for unknown users.
pub struct UserAverage(pub EntityAverage);

/// Per-item average rating, global average for unknown items.
pub struct ItemAverage(pub EntityAverage);

impl UserAverage {
    pub fn new(ratings: RatingStore) -> Self {
        Self(EntityAverage::new(ratings, Side::User))
    }
}

impl ItemAverage {
    pub fn new(ratings: RatingStore) -> Self {
        Self(EntityAverage::new(ratings, Side::Item))
    }
}

impl IterativeModel for UserAverage {
    fn train(&mut self) -> Result<()> {
        self.0.train()
    }

    fn iterate(&mut self) -> Result<()> {
        self.0.iterate()
    }

    fn compute_fit(&self) -> f64 {
        self.0.compute_fit()
    }
}

impl RatingPredictor for UserAverage {
    fn predict(&self, user_id: u32, item_id: u32) -> f64 {
        self.0.predict(user_id, item_id)
    }
}

impl IterativeModel for ItemAverage {
    fn train(&mut self) -> Result<()> {
        self.0.train()
    }

    fn iterate(&mut self) -> Result<()> {
        self.0.iterate()
    }

    fn compute_fit(&self) -> f64 {
        self.0.compute_fit()
    }
}

impl RatingPredictor for ItemAverage {
    fn predict(&self, user_id: u32, item_id: u32) -> f64 {
        self.0.predict(user_id, item_id)
    }
}

pub(crate) fn rmse_on_training(predictor: &impl RatingPredictor, ratings: &RatingStore) -> f64 {
    let mut sum_squared = 0.0;
    for position in 0..ratings.len() {
        let error = predictor.predict(ratings.user(position), ratings.item(position))
            - ratings.value(position);
        sum_squared += error * error;
    }
    (sum_squared / ratings.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn unseen_pairs_fall_back_to_global_average() {
        // two ratings, global average 3.0; any unseen pair must predict it
        let triples = [(0, 0, 1.0), (1, 1, 5.0)];
        let mut user_avg = UserAverage::new(RatingStore::from_triples(triples, false, false));
        user_avg.train().unwrap();
        assert_abs_diff_eq!(user_avg.predict(7, 7), 3.0);
        assert_abs_diff_eq!(user_avg.predict(0, 3), 1.0);

        let mut item_avg = ItemAverage::new(RatingStore::from_triples(triples, false, false));
        item_avg.train().unwrap();
        assert_abs_diff_eq!(item_avg.predict(9, 2), 3.0);
        assert_abs_diff_eq!(item_avg.predict(9, 1), 5.0);

        let mut global = GlobalAverage::new(RatingStore::from_triples(triples, false, false));
        global.train().unwrap();
        assert_abs_diff_eq!(global.predict(4, 4), 3.0);
    }

    #[test]
    fn entities_without_ratings_use_global_average() {
        // user 1 never rated anything, but its id is below max_user_id
        let triples = [(0, 0, 2.0), (2, 0, 4.0)];
        let mut user_avg = UserAverage::new(RatingStore::from_triples(triples, false, false));
        user_avg.train().unwrap();
        assert_abs_diff_eq!(user_avg.predict(1, 0), 3.0);
    }

    #[test]
    fn empty_training_data_fails_fast() {
        let mut model = GlobalAverage::new(RatingStore::new(false, false));
        assert!(matches!(model.train(), Err(Error::Config(_))));
    }
}
