//! Bayesian Personalized Ranking matrix factorization (Rendle et al.,
//! UAI 2009): pairwise ranking optimization over positive-only feedback.

use log::{debug, info};

use crate::dense::{dot, DenseMatrix};
use crate::error::{Error, Result};
use crate::mf::ensure_initialized;
use crate::recommender::{IterativeModel, ItemScorer};
use crate::rng::XorShift64;
use crate::sparse::SparseBooleanMatrix;

/// Pairwise ranking factorization trained by stochastic gradient ascent
/// over sampled `(user, positive item, negative item)` triples.
///
/// Negative items are drawn uniformly from the items the user has not
/// seen. Items nobody has ever interacted with are excluded from negative
/// sampling by default, so the model never learns to push globally-unknown
/// items around; [`exclude_unseen_negatives`](Self::exclude_unseen_negatives)
/// is the explicit opt-out.
///
/// When the per-user positive/negative item tables fit within
/// [`fast_sampling_memory_limit`](Self::fast_sampling_memory_limit) they
/// are precomputed once ("fast sampling"); otherwise sampling falls back
/// to rejection draws against the feedback matrix.
pub struct BprMf {
    feedback: SparseBooleanMatrix,

    /// Number of latent factors. Default 10.
    pub num_factors: usize,
    /// Learn rate. Default 0.05.
    pub learn_rate: f64,
    /// Regularization for user factors. Default 0.0025.
    pub reg_u: f64,
    /// Regularization for positive-item factors. Default 0.0025.
    pub reg_i: f64,
    /// Regularization for negative-item factors. Default 0.00025.
    pub reg_j: f64,
    /// Number of epochs run by `train()`. Default 30.
    pub num_iter: usize,
    /// One epoch performs `iteration_length x positive interactions`
    /// sampling steps. Default 5.
    pub iteration_length: usize,
    /// Memory budget for the fast-sampling tables, in MiB. Default 1024.
    pub fast_sampling_memory_limit: usize,
    /// Keep items nobody has ever seen out of negative sampling.
    /// Default true.
    pub exclude_unseen_negatives: bool,
    /// Mean of the factor-initialization distribution. Default 0.
    pub init_mean: f64,
    /// Standard deviation of the factor-initialization distribution.
    /// Default 0.1.
    pub init_stdev: f64,
    /// Seed for the run's random source. Default 1.
    pub seed: u64,

    num_users: usize,
    num_items: usize,
    /// Number of users that interacted with each item.
    item_popularity: Vec<usize>,
    /// Number of items a user may draw samples from; users whose positive
    /// count reaches this limit have no negative candidate left.
    candidate_items: usize,
    fast_sampling: bool,
    user_pos_items: Vec<Vec<u32>>,
    user_neg_items: Vec<Vec<u32>>,
    user_factors: DenseMatrix,
    item_factors: DenseMatrix,
    rng: XorShift64,
    initialized: bool,
}

impl BprMf {
    /// `feedback` holds one row of observed item ids per user.
    pub fn new(feedback: SparseBooleanMatrix) -> Self {
        Self {
            feedback,
            num_factors: 10,
            learn_rate: 0.05,
            reg_u: 0.0025,
            reg_i: 0.0025,
            reg_j: 0.00025,
            num_iter: 30,
            iteration_length: 5,
            fast_sampling_memory_limit: 1024,
            exclude_unseen_negatives: true,
            init_mean: 0.0,
            init_stdev: 0.1,
            seed: 1,
            num_users: 0,
            num_items: 0,
            item_popularity: Vec::new(),
            candidate_items: 0,
            fast_sampling: false,
            user_pos_items: Vec::new(),
            user_neg_items: Vec::new(),
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
        if self.learn_rate <= 0.0 {
            return Err(Error::Config("learn_rate must be positive".into()));
        }
        if self.iteration_length == 0 {
            return Err(Error::Config("iteration_length must be at least 1".into()));
        }
        if self.feedback.num_entries() == 0 {
            return Err(Error::Config("training data is empty".into()));
        }
        self.num_users = self.feedback.num_rows();
        self.num_items = self.feedback.num_columns();

        self.item_popularity = vec![0; self.num_items];
        for user in 0..self.num_users {
            for item in self.feedback.iter_row(user) {
                self.item_popularity[item as usize] += 1;
            }
        }
        self.candidate_items = if self.exclude_unseen_negatives {
            self.item_popularity.iter().filter(|&&p| p > 0).count()
        } else {
            self.num_items
        };
        // every positive item counts toward candidate_items, so a user is
        // sampleable exactly when it has a positive and a negative left
        if !(0..self.num_users).any(|u| {
            let count = self.feedback.row_len(u);
            count > 0 && count < self.candidate_items
        }) {
            return Err(Error::Config(
                "no user has both observed and unobserved items to rank".into(),
            ));
        }

        self.rng = XorShift64::new(self.seed);
        self.check_sampling();
        self.user_factors = DenseMatrix::new(self.num_users, self.num_factors);
        self.item_factors = DenseMatrix::new(self.num_items, self.num_factors);
        self.user_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.item_factors
            .init_normal(self.init_mean, self.init_stdev, &mut self.rng);
        self.initialized = true;
        Ok(())
    }

    /// Whether the precomputed sampling tables are in use for this run.
    pub fn uses_fast_sampling(&self) -> bool {
        self.fast_sampling
    }

    pub fn user_factors(&self) -> &DenseMatrix {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &DenseMatrix {
        &self.item_factors
    }

    fn check_sampling(&mut self) {
        let table_bytes = self.num_users as u64 * self.num_items as u64 * 4;
        self.fast_sampling = table_bytes <= (self.fast_sampling_memory_limit as u64) << 20;
        if !self.fast_sampling {
            info!(
                "fast sampling tables would need {table_bytes} bytes, over the {} MiB limit; \
                 falling back to rejection sampling",
                self.fast_sampling_memory_limit
            );
            self.user_pos_items = Vec::new();
            self.user_neg_items = Vec::new();
            return;
        }
        self.user_pos_items = Vec::with_capacity(self.num_users);
        self.user_neg_items = Vec::with_capacity(self.num_users);
        for user in 0..self.num_users {
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for item in 0..self.num_items as u32 {
                if self.feedback.get(user, item) {
                    pos.push(item);
                } else if self.item_popularity[item as usize] > 0
                    || !self.exclude_unseen_negatives
                {
                    neg.push(item);
                }
            }
            self.user_pos_items.push(pos);
            self.user_neg_items.push(neg);
        }
    }

    /// Sample a user with at least one observed item and at least one
    /// negative candidate left.
    fn sample_user(&mut self) -> usize {
        loop {
            let user = self.rng.below(self.num_users);
            let count = self.feedback.row_len(user);
            if count == 0 || count >= self.candidate_items {
                continue;
            }
            return user;
        }
    }

    fn sample_item_pair(&mut self, user: usize) -> (usize, usize) {
        if self.fast_sampling {
            let pos = &self.user_pos_items[user];
            let neg = &self.user_neg_items[user];
            let i = pos[self.rng.below(pos.len())];
            let j = neg[self.rng.below(neg.len())];
            (i as usize, j as usize)
        } else {
            let row = &self.feedback;
            let nth = self.rng.below(row.row_len(user));
            let i = row
                .iter_row(user)
                .nth(nth)
                .expect("sampled user has a positive item");
            let j = loop {
                let j = self.rng.below(self.num_items) as u32;
                if row.get(user, j) {
                    continue;
                }
                if self.exclude_unseen_negatives && self.item_popularity[j as usize] == 0 {
                    continue;
                }
                break j;
            };
            (i as usize, j as usize)
        }
    }

    fn update_factors(&mut self, u: usize, i: usize, j: usize) {
        let x_uij = dot(self.user_factors.row(u), self.item_factors.row(i))
            - dot(self.user_factors.row(u), self.item_factors.row(j));
        let deriv = 1.0 / (1.0 + x_uij.exp());
        for f in 0..self.num_factors {
            // snapshot all three cells before writing any of them
            let w_uf = self.user_factors.get(u, f);
            let h_if = self.item_factors.get(i, f);
            let h_jf = self.item_factors.get(j, f);
            self.user_factors.inc(
                u,
                f,
                self.learn_rate * ((h_if - h_jf) * deriv - self.reg_u * w_uf),
            );
            self.item_factors
                .inc(i, f, self.learn_rate * (w_uf * deriv - self.reg_i * h_if));
            self.item_factors
                .inc(j, f, self.learn_rate * (-w_uf * deriv - self.reg_j * h_jf));
        }
    }
}

impl IterativeModel for BprMf {
    fn train(&mut self) -> Result<()> {
        self.init_model()?;
        for epoch in 0..self.num_iter {
            self.iterate()?;
            debug!("bpr epoch {} done", epoch + 1);
        }
        Ok(())
    }

    fn iterate(&mut self) -> Result<()> {
        ensure_initialized(self.initialized)?;
        let steps = self.feedback.num_entries() * self.iteration_length;
        for _ in 0..steps {
            let user = self.sample_user();
            let (i, j) = self.sample_item_pair(user);
            self.update_factors(user, i, j);
        }
        Ok(())
    }
}

impl ItemScorer for BprMf {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_feedback() -> SparseBooleanMatrix {
        SparseBooleanMatrix::from_pairs([
            (0, 0),
            (0, 1),
            (1, 0),
            (1, 1),
            (2, 2),
            (2, 3),
            (3, 2),
            (3, 3),
        ])
    }

    #[test]
    fn negative_sampling_skips_seen_and_unseen_by_anyone() {
        // item 1 exists (column id below the max) but nobody interacted
        // with it, so it must never be drawn as a negative
        let feedback = SparseBooleanMatrix::from_pairs([(0, 0), (1, 2)]);
        for limit in [0usize, 1024] {
            let mut model = BprMf::new(feedback.clone());
            model.fast_sampling_memory_limit = limit;
            model.init_model().unwrap();
            assert_eq!(model.uses_fast_sampling(), limit > 0);
            for _ in 0..100 {
                let (i, j) = model.sample_item_pair(0);
                assert_eq!(i, 0, "only positive of user 0");
                assert_eq!(j, 2, "only valid negative for user 0");
            }
        }
    }

    #[test]
    fn opt_out_allows_globally_unseen_negatives() {
        let feedback = SparseBooleanMatrix::from_pairs([(0, 0), (1, 2)]);
        let mut model = BprMf::new(feedback);
        model.exclude_unseen_negatives = false;
        model.init_model().unwrap();
        let mut saw_unpopular = false;
        for _ in 0..200 {
            let (_, j) = model.sample_item_pair(0);
            assert_ne!(j, 0);
            if j == 1 {
                saw_unpopular = true;
            }
        }
        assert!(saw_unpopular);
    }

    #[test]
    fn training_learns_the_cluster_structure() {
        let mut model = BprMf::new(clustered_feedback());
        model.num_iter = 40;
        model.train().unwrap();
        // user 0 interacted with items 0 and 1 only
        assert!(model.score(0, 0) > model.score(0, 3));
        assert!(model.score(0, 1) > model.score(0, 2));
        // and the mirror cluster
        assert!(model.score(2, 2) > model.score(2, 1));
    }

    #[test]
    fn same_seed_reproduces_the_run() {
        let mut a = BprMf::new(clustered_feedback());
        let mut b = BprMf::new(clustered_feedback());
        for m in [&mut a, &mut b] {
            m.num_iter = 3;
            m.seed = 9;
            m.train().unwrap();
        }
        assert_eq!(a.user_factors(), b.user_factors());
        assert_eq!(a.item_factors(), b.item_factors());
    }

    #[test]
    fn unknown_entities_get_sentinel_score() {
        let mut model = BprMf::new(clustered_feedback());
        model.num_iter = 1;
        model.train().unwrap();
        assert_eq!(model.score(50, 0), f64::MIN);
        assert_eq!(model.score(0, 50), f64::MIN);
    }

    #[test]
    fn degenerate_feedback_fails_fast() {
        // the single user has seen every item: no ranking pair exists
        let feedback = SparseBooleanMatrix::from_pairs([(0, 0), (0, 1)]);
        let mut model = BprMf::new(feedback);
        assert!(matches!(model.train(), Err(Error::Config(_))));
    }
}
