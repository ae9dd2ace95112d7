//! Weighted regularized matrix factorization (WRMF) for implicit feedback,
//! trained by alternating least squares (Hu/Koren/Volinsky; Pan et al.).

use faer::linalg::solvers::Solve;
use faer::Side;
use log::debug;
use rayon::prelude::*;

use crate::dense::{dot, DenseMatrix};
use crate::error::{Error, Result};
use crate::mf::ensure_initialized;
use crate::recommender::{IterativeModel, ItemScorer};
use crate::rng::XorShift64;
use crate::sparse::SparseBooleanMatrix;

/// One-class collaborative filtering with a global confidence weight
/// `c_pos` on observed entries relative to an implicit weight of 1 on
/// unobserved ones.
///
/// Each epoch alternates two half-steps: all user rows are re-solved in
/// closed form with the item factors fixed, then the item rows with the
/// user factors fixed. A half-step builds the gramian of the fixed side
/// once (O(f² x rows)), then per entity accumulates the
/// confidence-weighted correction restricted to that entity's observed
/// coordinates and solves the resulting f x f system directly; this is a
/// least-squares solve, not a gradient step, so re-running a half-step
/// with unchanged inputs reproduces the same factors exactly. Rows are
/// independent within a half-step and are solved in parallel.
pub struct Wrmf {
    feedback: SparseBooleanMatrix,
    item_feedback: SparseBooleanMatrix,

    /// Number of latent factors. Default 10.
    pub num_factors: usize,
    /// Regularization constant. Default 0.015.
    pub regularization: f64,
    /// Confidence weight put on observed interactions. Default 1.
    pub c_pos: f64,
    /// Number of epochs run by `train()`. Default 15.
    pub num_iter: usize,
    /// Mean of the factor-initialization distribution. Default 0.
    pub init_mean: f64,
    /// Standard deviation of the factor-initialization distribution.
    /// Default 0.1.
    pub init_stdev: f64,
    /// Seed for the run's random source. Default 1.
    pub seed: u64,

    user_factors: DenseMatrix,
    item_factors: DenseMatrix,
    rng: XorShift64,
    initialized: bool,
}

impl Wrmf {
    /// `feedback` holds one row of observed item ids per user.
    pub fn new(feedback: SparseBooleanMatrix) -> Self {
        Self {
            feedback,
            item_feedback: SparseBooleanMatrix::new(),
            num_factors: 10,
            regularization: 0.015,
            c_pos: 1.0,
            num_iter: 15,
            init_mean: 0.0,
            init_stdev: 0.1,
            seed: 1,
            user_factors: DenseMatrix::new(0, 0),
            item_factors: DenseMatrix::new(0, 0),
            rng: XorShift64::new(1),
            initialized: false,
        }
    }

    pub fn init_model(&mut self) -> Result<()> {
        if self.num_factors == 0 {
            return Err(Error::Config("num_factors must be at least 1".into()));
        }
        if self.init_stdev < 0.0 {
            return Err(Error::Config("init_stdev must not be negative".into()));
        }
        if self.feedback.num_entries() == 0 {
            return Err(Error::Config("training data is empty".into()));
        }
        self.rng = XorShift64::new(self.seed);
        self.item_feedback = self.feedback.transpose();
        let num_users = self.feedback.num_rows();
        let num_items = self.item_feedback.num_rows();
        self.user_factors = DenseMatrix::new(num_users, self.num_factors);
        self.item_factors = DenseMatrix::new(num_items, self.num_factors);
        self.user_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.item_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.initialized = true;
        Ok(())
    }

    pub fn user_factors(&self) -> &DenseMatrix {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &DenseMatrix {
        &self.item_factors
    }
}

impl IterativeModel for Wrmf {
    fn train(&mut self) -> Result<()> {
        self.init_model()?;
        for epoch in 0..self.num_iter {
            self.iterate()?;
            debug!("wrmf epoch {} done", epoch + 1);
        }
        Ok(())
    }

    fn iterate(&mut self) -> Result<()> {
        ensure_initialized(self.initialized)?;
        optimize(
            &self.feedback,
            &mut self.user_factors,
            &self.item_factors,
            self.regularization,
            self.c_pos,
        );
        optimize(
            &self.item_feedback,
            &mut self.item_factors,
            &self.user_factors,
            self.regularization,
            self.c_pos,
        );
        Ok(())
    }
}

impl ItemScorer for Wrmf {
    fn score(&self, user_id: u32, item_id: u32) -> f64 {
        if user_id as usize >= self.user_factors.rows()
            || item_id as usize >= self.item_factors.rows()
        {
            return f64::MIN;
        }
        dot(
            self.user_factors.row(user_id as usize),
            self.item_factors.row(item_id as usize),
        )
    }
}

/// Re-solve every row of `target` in closed form with `fixed` held
/// constant. `data` holds the observed coordinates per `target` row.
fn optimize(
    data: &SparseBooleanMatrix,
    target: &mut DenseMatrix,
    fixed: &DenseMatrix,
    regularization: f64,
    c_pos: f64,
) {
    let k = target.cols();
    // regularization keeps the system positive definite
    let regularization = regularization.max(1e-6);

    // gramian of the fixed side, shared by every row solve
    let mut hh = vec![0.0; k * k];
    for r in 0..fixed.rows() {
        let row = fixed.row(r);
        for f1 in 0..k {
            let v = row[f1];
            for f2 in f1..k {
                hh[f1 * k + f2] += v * row[f2];
            }
        }
    }
    for f1 in 0..k {
        for f2 in 0..f1 {
            hh[f1 * k + f2] = hh[f2 * k + f1];
        }
    }

    target
        .as_mut_slice()
        .par_chunks_mut(k)
        .enumerate()
        .for_each(|(entity, w_row)| {
            let mut a_buf = hh.clone();
            let mut b_buf = vec![0.0; k];
            for f in 0..k {
                a_buf[f * k + f] += regularization;
            }
            // confidence-weighted correction over the observed coordinates
            for observed in data.iter_row(entity) {
                let h = fixed.row(observed as usize);
                for f1 in 0..k {
                    b_buf[f1] += (1.0 + c_pos) * h[f1];
                    let w = c_pos * h[f1];
                    for f2 in 0..k {
                        a_buf[f1 * k + f2] += w * h[f2];
                    }
                }
            }
            if b_buf.iter().all(|&v| v == 0.0) {
                w_row.fill(0.0);
                return;
            }
            cholesky_solve_inplace(&mut a_buf, &mut b_buf, k);
            w_row.copy_from_slice(&b_buf);
        });
}

fn cholesky_solve_inplace(a: &mut [f64], b: &mut [f64], k: usize) {
    let a_mat = faer::MatMut::from_row_major_slice_mut(a, k, k);
    let mut b_mat = faer::MatMut::from_column_major_slice_mut(b, k, 1);

    if let Ok(llt) = a_mat.as_ref().llt(Side::Lower) {
        let x = llt.solve(b_mat.as_ref());
        b_mat.copy_from(x.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback() -> SparseBooleanMatrix {
        SparseBooleanMatrix::from_pairs([
            (0, 0),
            (0, 1),
            (1, 0),
            (1, 2),
            (2, 1),
            (2, 3),
            (3, 2),
            (3, 3),
        ])
    }

    #[test]
    fn half_step_is_idempotent_given_fixed_inputs() {
        let mut model = Wrmf::new(feedback());
        model.num_iter = 1;
        model.train().unwrap();

        let mut first = model.user_factors.clone();
        optimize(
            &model.feedback,
            &mut first,
            &model.item_factors,
            model.regularization,
            model.c_pos,
        );
        let mut second = first.clone();
        optimize(
            &model.feedback,
            &mut second,
            &model.item_factors,
            model.regularization,
            model.c_pos,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn observed_items_score_above_unobserved() {
        let mut model = Wrmf::new(feedback());
        model.c_pos = 10.0;
        model.num_iter = 10;
        model.train().unwrap();
        // user 0 saw items 0 and 1, never 2 or 3
        assert!(model.score(0, 0) > model.score(0, 3));
        assert!(model.score(0, 1) > model.score(0, 3));
    }

    #[test]
    fn unknown_entities_get_sentinel_score() {
        let mut model = Wrmf::new(feedback());
        model.num_iter = 1;
        model.train().unwrap();
        assert_eq!(model.score(99, 0), f64::MIN);
        assert_eq!(model.score(0, 99), f64::MIN);
    }

    #[test]
    fn compute_fit_is_the_unsupported_sentinel() {
        let mut model = Wrmf::new(feedback());
        model.num_iter = 1;
        model.train().unwrap();
        assert_eq!(model.compute_fit(), -1.0);
    }

    #[test]
    fn entities_without_observations_solve_to_zero() {
        let mut sparse = feedback();
        sparse.row_mut(6); // user 6 exists but has no interactions
        let mut model = Wrmf::new(sparse);
        model.num_iter = 2;
        model.train().unwrap();
        assert!(model.user_factors().row(6).iter().all(|&v| v == 0.0));
    }
}
