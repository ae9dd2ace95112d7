//! Biased matrix factorization with a logistic prediction link.

use log::debug;

use crate::baselines::rmse_on_training;
use crate::dense::{row_scalar_product, DenseMatrix};
use crate::error::{Error, Result};
use crate::mf::{ensure_initialized, validate_common};
use crate::ratings::RatingStore;
use crate::recommender::{IterativeModel, RatingPredictor};
use crate::rng::XorShift64;

#[inline(always)]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Matrix factorization with global, per-user and per-item bias terms.
///
/// The raw score is squashed through a sigmoid and rescaled into
/// `[min_rating, max_rating]`, so predictions can never leave the rating
/// range no matter how large the factors grow. The squared-error gradient
/// through the sigmoid contributes the shared factor
/// `error * sig * (1 - sig) * range` to every update.
pub struct BiasedMatrixFactorization {
    ratings: RatingStore,

    /// Number of latent factors. Default 10.
    pub num_factors: usize,
    /// Regularization constant for the bias terms. Default 0.0001.
    pub bias_reg: f64,
    /// Regularization constant for the user factors. Default 0.015.
    pub reg_u: f64,
    /// Regularization constant for the item factors. Default 0.015.
    pub reg_i: f64,
    /// Learn rate. Default 0.01.
    pub learn_rate: f64,
    /// Number of epochs run by `train()`. Default 30.
    pub num_iter: usize,
    /// Mean of the factor-initialization distribution. Default 0.
    pub init_mean: f64,
    /// Standard deviation of the factor-initialization distribution.
    /// Default 0.1.
    pub init_stdev: f64,
    /// Smallest valid rating value. Default 1.
    pub min_rating: f64,
    /// Largest valid rating value. Default 5.
    pub max_rating: f64,
    /// Seed for the run's random source. Default 1.
    pub seed: u64,

    global_bias: f64,
    user_bias: Vec<f64>,
    item_bias: Vec<f64>,
    user_factors: DenseMatrix,
    item_factors: DenseMatrix,
    index_buf: Vec<u32>,
    rng: XorShift64,
    initialized: bool,
}

impl BiasedMatrixFactorization {
    pub fn new(ratings: RatingStore) -> Self {
        Self {
            ratings,
            num_factors: 10,
            bias_reg: 0.0001,
            reg_u: 0.015,
            reg_i: 0.015,
            learn_rate: 0.01,
            num_iter: 30,
            init_mean: 0.0,
            init_stdev: 0.1,
            min_rating: 1.0,
            max_rating: 5.0,
            seed: 1,
            global_bias: 0.0,
            user_bias: Vec::new(),
            item_bias: Vec::new(),
            user_factors: DenseMatrix::new(0, 0),
            item_factors: DenseMatrix::new(0, 0),
            index_buf: Vec::new(),
            rng: XorShift64::new(1),
            initialized: false,
        }
    }

    /// Set the user and item factor regularization in one call.
    pub fn set_regularization(&mut self, value: f64) {
        self.reg_u = value;
        self.reg_i = value;
    }

    pub fn init_model(&mut self) -> Result<()> {
        validate_common(
            self.num_factors,
            self.learn_rate,
            self.init_stdev,
            self.min_rating,
            self.max_rating,
            &self.ratings,
        )?;
        let average = self.ratings.average();
        // the logit of the normalized average must exist
        if average <= self.min_rating || average >= self.max_rating {
            return Err(Error::Config(format!(
                "rating average {average} must lie strictly between min_rating and max_rating \
                 for the logistic link"
            )));
        }
        self.rng = XorShift64::new(self.seed);
        self.global_bias =
            ((average - self.min_rating) / (self.max_rating - average)).ln();
        let num_users = self.ratings.max_user_id() as usize + 1;
        let num_items = self.ratings.max_item_id() as usize + 1;
        self.user_bias = vec![0.0; num_users];
        self.item_bias = vec![0.0; num_items];
        self.user_factors = DenseMatrix::new(num_users, self.num_factors);
        self.item_factors = DenseMatrix::new(num_items, self.num_factors);
        self.user_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.item_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.index_buf = (0..self.ratings.len() as u32).collect();
        self.initialized = true;
        Ok(())
    }

    pub fn user_factors(&self) -> &DenseMatrix {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &DenseMatrix {
        &self.item_factors
    }

    pub fn user_bias(&self) -> &[f64] {
        &self.user_bias
    }

    pub fn item_bias(&self) -> &[f64] {
        &self.item_bias
    }

    pub fn global_bias(&self) -> f64 {
        self.global_bias
    }

    fn rescale(&self, score: f64) -> f64 {
        self.min_rating + sigmoid(score) * (self.max_rating - self.min_rating)
    }
}

impl IterativeModel for BiasedMatrixFactorization {
    fn train(&mut self) -> Result<()> {
        self.init_model()?;
        for epoch in 0..self.num_iter {
            self.iterate()?;
            debug!("biased matrix factorization epoch {} done", epoch + 1);
        }
        Ok(())
    }

    fn iterate(&mut self) -> Result<()> {
        ensure_initialized(self.initialized)?;
        self.rng.shuffle(&mut self.index_buf);
        let range = self.max_rating - self.min_rating;
        let learn_rate = self.learn_rate;
        for slot in 0..self.index_buf.len() {
            let position = self.index_buf[slot] as usize;
            let u = self.ratings.user(position) as usize;
            let i = self.ratings.item(position) as usize;

            let score = self.global_bias
                + self.user_bias[u]
                + self.item_bias[i]
                + row_scalar_product(&self.user_factors, u, &self.item_factors, i);
            let sig = sigmoid(score);
            let prediction = self.min_rating + sig * range;
            let error = self.ratings.value(position) - prediction;
            let gradient_common = error * sig * (1.0 - sig) * range;

            self.user_bias[u] +=
                learn_rate * (gradient_common - self.bias_reg * self.user_bias[u]);
            self.item_bias[i] +=
                learn_rate * (gradient_common - self.bias_reg * self.item_bias[i]);

            for f in 0..self.num_factors {
                let u_f = self.user_factors.get(u, f);
                let i_f = self.item_factors.get(i, f);
                let delta_u = gradient_common * i_f - self.reg_u * u_f;
                let delta_i = gradient_common * u_f - self.reg_i * i_f;
                self.user_factors.inc(u, f, learn_rate * delta_u);
                self.item_factors.inc(i, f, learn_rate * delta_i);
            }
        }
        Ok(())
    }

    /// RMSE on the training data.
    fn compute_fit(&self) -> f64 {
        rmse_on_training(self, &self.ratings)
    }
}

impl RatingPredictor for BiasedMatrixFactorization {
    /// Squashed-and-rescaled prediction; ids beyond the trained dimensions
    /// fall back to the bias-only prediction.
    fn predict(&self, user_id: u32, item_id: u32) -> f64 {
        if user_id as usize >= self.user_factors.rows()
            || item_id as usize >= self.item_factors.rows()
        {
            return self.rescale(self.global_bias);
        }
        let score = self.global_bias
            + self.user_bias[user_id as usize]
            + self.item_bias[item_id as usize]
            + row_scalar_product(
                &self.user_factors,
                user_id as usize,
                &self.item_factors,
                item_id as usize,
            );
        self.rescale(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn small_ratings() -> RatingStore {
        RatingStore::from_triples(
            [
                (0, 0, 5.0),
                (0, 1, 4.0),
                (1, 0, 4.0),
                (1, 2, 1.0),
                (2, 1, 2.0),
                (2, 2, 1.0),
            ],
            false,
            false,
        )
    }

    #[test]
    fn global_bias_is_logit_of_normalized_average() {
        let mut model = BiasedMatrixFactorization::new(small_ratings());
        model.init_model().unwrap();
        let average: f64 = 17.0 / 6.0;
        let expected = ((average - 1.0) / (5.0 - average)).ln();
        assert_abs_diff_eq!(model.global_bias(), expected, epsilon = 1e-12);
    }

    #[test]
    fn predictions_never_leave_rating_range() {
        let mut model = BiasedMatrixFactorization::new(small_ratings());
        // deliberately absurd initialization to stress the sigmoid clamp
        model.init_stdev = 50.0;
        model.num_iter = 2;
        model.train().unwrap();
        for u in 0..5 {
            for i in 0..5 {
                let p = model.predict(u, i);
                assert!((1.0..=5.0).contains(&p), "prediction {p} out of range");
            }
        }
    }

    #[test]
    fn unknown_ids_use_bias_only_prediction() {
        let mut model = BiasedMatrixFactorization::new(small_ratings());
        model.train().unwrap();
        let expected = 1.0 + sigmoid(model.global_bias()) * 4.0;
        assert_abs_diff_eq!(model.predict(50, 0), expected);
        assert_abs_diff_eq!(model.predict(0, 50), expected);
    }

    #[test]
    fn training_reduces_fit() {
        let mut model = BiasedMatrixFactorization::new(small_ratings());
        model.learn_rate = 0.05;
        model.num_iter = 1;
        model.train().unwrap();
        let early = model.compute_fit();
        for _ in 0..60 {
            model.iterate().unwrap();
        }
        assert!(model.compute_fit() < early);
    }

    #[test]
    fn degenerate_average_fails_fast() {
        // all ratings at the maximum: the logit does not exist
        let mut model = BiasedMatrixFactorization::new(RatingStore::from_triples(
            [(0, 0, 5.0), (1, 1, 5.0)],
            false,
            false,
        ));
        assert!(matches!(model.train(), Err(Error::Config(_))));
    }
}
