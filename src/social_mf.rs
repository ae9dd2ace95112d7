//! Social-regularized matrix factorization (trust propagation over a
//! user-user graph, after Jamali & Ester's SocialMF).

use log::debug;

use crate::baselines::rmse_on_training;
use crate::biased_mf::sigmoid;
use crate::dense::{row_scalar_product, DenseMatrix};
use crate::error::{Error, Result};
use crate::mf::{ensure_initialized, validate_common};
use crate::ratings::RatingStore;
use crate::recommender::{IterativeModel, RatingPredictor};
use crate::rng::XorShift64;
use crate::sparse::SparseBooleanMatrix;

/// Biased factorization over a binary, symmetric user neighbor graph.
///
/// Factor columns 0 and 1 are pinned to 1.0 and act as bias columns: with
/// the item side's column 1 fixed, the user's column-1 weight is a user
/// bias, and symmetrically for items. The pinned columns are excluded from
/// regularization and from the social term, which is why `num_factors`
/// must be at least 2.
///
/// The social term pulls each user's factor vector toward the mean of its
/// neighbors, with a second-order correction for each neighbor's own
/// deviation from *its* neighbors' mean. Both a full-batch regime (all
/// gradients accumulated, one synchronized sweep) and a stochastic regime
/// (the social term folded into every per-rating step) are supported.
pub struct SocialMf {
    ratings: RatingStore,
    user_relation: SparseBooleanMatrix,

    /// Number of latent factors, including the two bias columns.
    /// Default 10.
    pub num_factors: usize,
    /// L2 regularization constant. Default 0.015.
    pub regularization: f64,
    /// Weight of the social regularization term. Default 1.
    pub social_regularization: f64,
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
    /// Fold the social term into per-rating SGD steps instead of running
    /// full-batch sweeps. Default false.
    pub stochastic: bool,

    global_bias: f64,
    user_factors: DenseMatrix,
    item_factors: DenseMatrix,
    index_buf: Vec<u32>,
    rng: XorShift64,
    initialized: bool,
}

impl SocialMf {
    pub fn new(ratings: RatingStore, user_relation: SparseBooleanMatrix) -> Self {
        Self {
            ratings,
            user_relation,
            num_factors: 10,
            regularization: 0.015,
            social_regularization: 1.0,
            learn_rate: 0.01,
            num_iter: 30,
            init_mean: 0.0,
            init_stdev: 0.1,
            min_rating: 1.0,
            max_rating: 5.0,
            seed: 1,
            stochastic: false,
            global_bias: 0.0,
            user_factors: DenseMatrix::new(0, 0),
            item_factors: DenseMatrix::new(0, 0),
            index_buf: Vec::new(),
            rng: XorShift64::new(1),
            initialized: false,
        }
    }

    pub fn init_model(&mut self) -> Result<()> {
        if self.num_factors < 2 {
            return Err(Error::Config(
                "num_factors must be at least 2: columns 0 and 1 are reserved bias columns"
                    .into(),
            ));
        }
        validate_common(
            self.num_factors,
            self.learn_rate,
            self.init_stdev,
            self.min_rating,
            self.max_rating,
            &self.ratings,
        )?;
        let average = self.ratings.average();
        if average <= self.min_rating || average >= self.max_rating {
            return Err(Error::Config(format!(
                "rating average {average} must lie strictly between min_rating and max_rating \
                 for the logistic link"
            )));
        }
        // the relation graph may mention users beyond the rating data
        let num_users = (self.ratings.max_user_id() as usize + 1)
            .max(self.user_relation.num_rows())
            .max(self.user_relation.num_columns());
        let num_items = self.ratings.max_item_id() as usize + 1;

        self.rng = XorShift64::new(self.seed);
        self.global_bias =
            ((average - self.min_rating) / (self.max_rating - average)).ln();
        self.user_factors = DenseMatrix::new(num_users, self.num_factors);
        self.item_factors = DenseMatrix::new(num_items, self.num_factors);
        self.user_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.item_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.user_factors.set_column_to(0, 1.0);
        self.item_factors.set_column_to(1, 1.0);
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

    pub fn global_bias(&self) -> f64 {
        self.global_bias
    }

    pub fn user_relation(&self) -> &SparseBooleanMatrix {
        &self.user_relation
    }

    fn rescale(&self, score: f64) -> f64 {
        self.min_rating + sigmoid(score) * (self.max_rating - self.min_rating)
    }

    /// Social-regularization gradient for user `u` and factor `f`:
    /// deviation from the neighbors' mean, corrected by each neighbor's
    /// deviation from its own neighborhood mean.
    fn social_gradient(&self, u: usize, f: usize) -> f64 {
        let num_neighbors = self.user_relation.row_len(u);
        if num_neighbors == 0 {
            return 0.0;
        }
        let mut neighbor_sum = 0.0;
        for v in self.user_relation.iter_row(u) {
            neighbor_sum += self.user_factors.get(v as usize, f);
        }
        let mut gradient =
            self.user_factors.get(u, f) - neighbor_sum / num_neighbors as f64;
        for v in self.user_relation.iter_row(u) {
            let v = v as usize;
            let v_neighbors = self.user_relation.row_len(v);
            if v_neighbors == 0 {
                continue;
            }
            let mut v_sum = 0.0;
            for w in self.user_relation.iter_row(v) {
                v_sum += self.user_factors.get(w as usize, f);
            }
            let v_deviation = self.user_factors.get(v, f) - v_sum / v_neighbors as f64;
            gradient -= v_deviation / (v_neighbors as f64 * num_neighbors as f64);
        }
        self.social_regularization * gradient
    }

    fn iterate_batch(&mut self) {
        let k = self.num_factors;
        let range = self.max_rating - self.min_rating;
        let mut user_grad = DenseMatrix::new(self.user_factors.rows(), k);
        let mut item_grad = DenseMatrix::new(self.item_factors.rows(), k);

        // prediction-error part, accumulated as loss gradients
        for position in 0..self.ratings.len() {
            let u = self.ratings.user(position) as usize;
            let i = self.ratings.item(position) as usize;
            let score = self.global_bias
                + row_scalar_product(&self.user_factors, u, &self.item_factors, i);
            let sig = sigmoid(score);
            let prediction = self.min_rating + sig * range;
            let error = self.ratings.value(position) - prediction;
            let gradient_common = error * sig * (1.0 - sig) * range;
            for f in 0..k {
                let u_f = self.user_factors.get(u, f);
                let i_f = self.item_factors.get(i, f);
                if f != 0 {
                    user_grad.inc(u, f, -gradient_common * i_f);
                }
                if f != 1 {
                    item_grad.inc(i, f, -gradient_common * u_f);
                }
            }
        }

        // L2 and social parts, bias columns excluded
        for u in 0..user_grad.rows() {
            for f in 2..k {
                user_grad.inc(
                    u,
                    f,
                    self.regularization * self.user_factors.get(u, f) + self.social_gradient(u, f),
                );
            }
        }
        for i in 0..item_grad.rows() {
            for f in 2..k {
                item_grad.inc(i, f, self.regularization * self.item_factors.get(i, f));
            }
        }

        // one synchronized descent sweep; the pinned columns stay untouched
        for u in 0..user_grad.rows() {
            for f in 0..k {
                if f != 0 {
                    self.user_factors
                        .inc(u, f, -self.learn_rate * user_grad.get(u, f));
                }
            }
        }
        for i in 0..item_grad.rows() {
            for f in 0..k {
                if f != 1 {
                    self.item_factors
                        .inc(i, f, -self.learn_rate * item_grad.get(i, f));
                }
            }
        }
    }

    fn iterate_stochastic(&mut self) {
        let k = self.num_factors;
        let range = self.max_rating - self.min_rating;
        self.rng.shuffle(&mut self.index_buf);
        for slot in 0..self.index_buf.len() {
            let position = self.index_buf[slot] as usize;
            let u = self.ratings.user(position) as usize;
            let i = self.ratings.item(position) as usize;
            let score = self.global_bias
                + row_scalar_product(&self.user_factors, u, &self.item_factors, i);
            let sig = sigmoid(score);
            let prediction = self.min_rating + sig * range;
            let error = self.ratings.value(position) - prediction;
            let gradient_common = error * sig * (1.0 - sig) * range;

            for f in 0..k {
                let u_f = self.user_factors.get(u, f);
                let i_f = self.item_factors.get(i, f);
                if f != 0 {
                    let mut delta_u = gradient_common * i_f;
                    if f != 1 {
                        delta_u -= self.regularization * u_f + self.social_gradient(u, f);
                    }
                    self.user_factors.inc(u, f, self.learn_rate * delta_u);
                }
                if f != 1 {
                    let mut delta_i = gradient_common * u_f;
                    if f != 0 {
                        delta_i -= self.regularization * i_f;
                    }
                    self.item_factors.inc(i, f, self.learn_rate * delta_i);
                }
            }
        }
    }
}

impl IterativeModel for SocialMf {
    fn train(&mut self) -> Result<()> {
        self.init_model()?;
        for epoch in 0..self.num_iter {
            self.iterate()?;
            debug!("social matrix factorization epoch {} done", epoch + 1);
        }
        Ok(())
    }

    fn iterate(&mut self) -> Result<()> {
        ensure_initialized(self.initialized)?;
        if self.stochastic {
            self.iterate_stochastic();
        } else {
            self.iterate_batch();
        }
        Ok(())
    }

    /// RMSE on the training data.
    fn compute_fit(&self) -> f64 {
        rmse_on_training(self, &self.ratings)
    }
}

impl RatingPredictor for SocialMf {
    fn predict(&self, user_id: u32, item_id: u32) -> f64 {
        if user_id as usize >= self.user_factors.rows()
            || item_id as usize >= self.item_factors.rows()
        {
            return self.rescale(self.global_bias);
        }
        let score = self.global_bias
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

    fn ratings() -> RatingStore {
        RatingStore::from_triples(
            [
                (0, 0, 5.0),
                (0, 1, 4.0),
                (1, 2, 2.0),
                (2, 0, 4.0),
                (2, 2, 1.0),
                (3, 1, 3.0),
            ],
            false,
            false,
        )
    }

    fn relation() -> SparseBooleanMatrix {
        // symmetric graph: 0-1, 0-2; user 3 has no neighbors
        SparseBooleanMatrix::from_pairs([(0, 1), (1, 0), (0, 2), (2, 0)])
    }

    #[test]
    fn too_few_factors_fails_fast() {
        let mut model = SocialMf::new(ratings(), relation());
        model.num_factors = 1;
        let err = model.train().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("num_factors"));
    }

    #[test]
    fn bias_columns_stay_pinned() {
        for stochastic in [false, true] {
            let mut model = SocialMf::new(ratings(), relation());
            model.stochastic = stochastic;
            model.num_iter = 5;
            model.train().unwrap();
            for u in 0..model.user_factors().rows() {
                assert_eq!(model.user_factors().get(u, 0), 1.0);
            }
            for i in 0..model.item_factors().rows() {
                assert_eq!(model.item_factors().get(i, 1), 1.0);
            }
        }
    }

    #[test]
    fn both_regimes_train_without_nan_and_reduce_fit() {
        for stochastic in [false, true] {
            let mut model = SocialMf::new(ratings(), relation());
            model.stochastic = stochastic;
            model.num_iter = 1;
            model.train().unwrap();
            let early = model.compute_fit();
            assert!(early.is_finite());
            for _ in 0..40 {
                model.iterate().unwrap();
            }
            let late = model.compute_fit();
            assert!(late.is_finite());
            assert!(late < early, "stochastic={stochastic}: {late} >= {early}");
        }
    }

    #[test]
    fn user_without_neighbors_gets_zero_social_gradient() {
        let mut model = SocialMf::new(ratings(), relation());
        model.init_model().unwrap();
        for f in 2..model.num_factors {
            assert_eq!(model.social_gradient(3, f), 0.0);
        }
    }

    #[test]
    fn social_term_pulls_users_toward_neighbor_mean() {
        let mut model = SocialMf::new(ratings(), relation());
        model.social_regularization = 5.0;
        model.init_model().unwrap();

        let distance = |m: &SocialMf| {
            let mut d = 0.0;
            for f in 2..m.num_factors {
                let mean = (m.user_factors().get(1, f) + m.user_factors().get(2, f)) / 2.0;
                let diff = m.user_factors().get(0, f) - mean;
                d += diff * diff;
            }
            d.sqrt()
        };

        let before = distance(&model);
        for _ in 0..20 {
            model.iterate().unwrap();
        }
        assert!(distance(&model) < before);
    }
}
