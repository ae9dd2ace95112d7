//! Latent-factor recommendation models over sparse interaction data.
//!
//! The crate has three layers:
//!
//! * a sparse data substrate ([`SparseBooleanMatrix`], [`SparseMatrix`],
//!   [`RatingStore`]) plus the dense [`DenseMatrix`] factor storage;
//! * a family of factorization trainers sharing the
//!   [`IterativeModel`] epoch contract: plain SGD
//!   ([`MatrixFactorization`]), logistic-link biased SGD
//!   ([`BiasedMatrixFactorization`]), social-regularized ([`SocialMf`]),
//!   alternating least squares over implicit feedback ([`Wrmf`]) and
//!   pairwise ranking ([`BprMf`]), next to the average-based baselines;
//! * an evaluation engine turning a trained model plus held-out data into
//!   rating-error ([`evaluate_ratings`]) and ranking-quality
//!   ([`evaluate_ranking`]) statistics.
//!
//! Parsing of on-disk formats, id mapping and model serialization are the
//! caller's responsibility; trainers consume already-parsed triples and
//! expose their factor matrices and biases through accessors.

mod baselines;
mod biased_mf;
mod bpr;
mod dense;
mod error;
mod eval;
mod metrics;
mod mf;
mod ratings;
mod recommender;
mod rng;
mod social_mf;
mod sparse;
mod wrmf;

pub use baselines::{EntityAverage, GlobalAverage, ItemAverage, UserAverage};
pub use biased_mf::BiasedMatrixFactorization;
pub use bpr::BprMf;
pub use dense::{row_scalar_product, DenseMatrix};
pub use error::{Error, Result};
pub use eval::{evaluate_ranking, evaluate_ratings, RankingEvalResults, RatingEvalResults};
pub use metrics::{auc, map, ndcg, precision_at, recall_at, reciprocal_rank};
pub use mf::MatrixFactorization;
pub use ratings::RatingStore;
pub use recommender::{predict_items, IterativeModel, ItemScorer, RatingPredictor};
pub use rng::XorShift64;
pub use social_mf::SocialMf;
pub use sparse::{RowMap, RowSet, SparseBooleanMatrix, SparseMatrix};
pub use wrmf::Wrmf;
