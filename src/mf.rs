//! Plain matrix factorization trained by stochastic gradient descent.

use log::debug;

use crate::baselines::rmse_on_training;
use crate::dense::{row_scalar_product, DenseMatrix};
use crate::error::{Error, Result};
use crate::ratings::RatingStore;
use crate::recommender::{IterativeModel, RatingPredictor};
use crate::rng::XorShift64;

/// Factorizes observed ratings into a user and an item factor matrix,
/// without bias terms.
///
/// One epoch is one pass over all ratings in shuffled order; shuffling
/// avoids order bias when the source data is sorted by user or item.
pub struct MatrixFactorization {
    ratings: RatingStore,

    /// Number of latent factors. Default 10.
    pub num_factors: usize,
    /// Regularization constant. Default 0.015.
    pub regularization: f64,
    /// Learn rate for the gradient steps. Default 0.01.
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
    user_factors: DenseMatrix,
    item_factors: DenseMatrix,
    index_buf: Vec<u32>,
    rng: XorShift64,
    initialized: bool,
}

impl MatrixFactorization {
    pub fn new(ratings: RatingStore) -> Self {
        Self {
            ratings,
            num_factors: 10,
            regularization: 0.015,
            learn_rate: 0.01,
            num_iter: 30,
            init_mean: 0.0,
            init_stdev: 0.1,
            min_rating: 1.0,
            max_rating: 5.0,
            seed: 1,
            global_bias: 0.0,
            user_factors: DenseMatrix::new(0, 0),
            item_factors: DenseMatrix::new(0, 0),
            index_buf: Vec::new(),
            rng: XorShift64::new(1),
            initialized: false,
        }
    }

    /// Validate the configuration and allocate the model state. Called by
    /// `train()`; exposed for callers that drive `iterate()` themselves.
    pub fn init_model(&mut self) -> Result<()> {
        validate_common(
            self.num_factors,
            self.learn_rate,
            self.init_stdev,
            self.min_rating,
            self.max_rating,
            &self.ratings,
        )?;
        self.rng = XorShift64::new(self.seed);
        self.global_bias = self.ratings.average();
        self.user_factors = DenseMatrix::new(
            self.ratings.max_user_id() as usize + 1,
            self.num_factors,
        );
        self.item_factors = DenseMatrix::new(
            self.ratings.max_item_id() as usize + 1,
            self.num_factors,
        );
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

    /// Global rating average, the fallback for ids the model has never
    /// seen.
    pub fn global_bias(&self) -> f64 {
        self.global_bias
    }
}

impl IterativeModel for MatrixFactorization {
    fn train(&mut self) -> Result<()> {
        self.init_model()?;
        for epoch in 0..self.num_iter {
            self.iterate()?;
            debug!("matrix factorization epoch {} done", epoch + 1);
        }
        Ok(())
    }

    fn iterate(&mut self) -> Result<()> {
        ensure_initialized(self.initialized)?;
        self.rng.shuffle(&mut self.index_buf);
        let learn_rate = self.learn_rate;
        let regularization = self.regularization;
        for slot in 0..self.index_buf.len() {
            let position = self.index_buf[slot] as usize;
            let u = self.ratings.user(position) as usize;
            let i = self.ratings.item(position) as usize;

            let prediction = row_scalar_product(&self.user_factors, u, &self.item_factors, i);
            let error = self.ratings.value(position) - prediction;

            for f in 0..self.num_factors {
                let u_f = self.user_factors.get(u, f);
                let i_f = self.item_factors.get(i, f);
                let delta_u = error * i_f - regularization * u_f;
                let delta_i = error * u_f - regularization * i_f;
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

impl RatingPredictor for MatrixFactorization {
    /// Predicted rating, clamped to `[min_rating, max_rating]`. Ids beyond
    /// the trained dimensions fall back to the global average.
    fn predict(&self, user_id: u32, item_id: u32) -> f64 {
        if user_id as usize >= self.user_factors.rows()
            || item_id as usize >= self.item_factors.rows()
        {
            return self.global_bias;
        }
        let raw = row_scalar_product(
            &self.user_factors,
            user_id as usize,
            &self.item_factors,
            item_id as usize,
        );
        raw.clamp(self.min_rating, self.max_rating)
    }
}

pub(crate) fn ensure_initialized(initialized: bool) -> Result<()> {
    if initialized {
        Ok(())
    } else {
        Err(Error::Config(
            "model not initialized: call train() or init_model() first".into(),
        ))
    }
}

pub(crate) fn validate_common(
    num_factors: usize,
    learn_rate: f64,
    init_stdev: f64,
    min_rating: f64,
    max_rating: f64,
    ratings: &RatingStore,
) -> Result<()> {
    if num_factors == 0 {
        return Err(Error::Config("num_factors must be at least 1".into()));
    }
    if learn_rate <= 0.0 {
        return Err(Error::Config("learn_rate must be positive".into()));
    }
    if init_stdev < 0.0 {
        return Err(Error::Config("init_stdev must not be negative".into()));
    }
    if min_rating >= max_rating {
        return Err(Error::Config(
            "min_rating must be smaller than max_rating".into(),
        ));
    }
    if ratings.is_empty() {
        return Err(Error::Config("training data is empty".into()));
    }
    Ok(())
}
