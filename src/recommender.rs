//! Shared trainer and predictor contracts.

use crate::error::Result;

/// Predicts a rating value for a `(user, item)` pair.
///
/// Unknown entities never fail: every implementation degrades to a
/// documented fallback (typically a global-bias-only prediction).
pub trait RatingPredictor {
    fn predict(&self, user_id: u32, item_id: u32) -> f64;
}

/// Scores a `(user, item)` pair for ranking. Only the ordering of scores
/// is meaningful; implementations return `f64::MIN` for entities they
/// cannot score.
pub trait ItemScorer {
    fn score(&self, user_id: u32, item_id: u32) -> f64;
}

/// The epoch-loop contract every trainer shares.
///
/// `train` validates the configuration, initializes the model state and
/// runs the configured number of epochs. `iterate` performs exactly one
/// epoch and may be called repeatedly by an external convergence-search
/// loop; the epoch boundary is the only point at which the model may be
/// read for evaluation or persistence.
pub trait IterativeModel {
    fn train(&mut self) -> Result<()>;

    fn iterate(&mut self) -> Result<()>;

    /// Fit of the model on its own training data, lower is better for
    /// rating models. Returns `-1.0` for models without a defined training
    /// fit; that sentinel is a deliberate "unsupported" signal, not an
    /// error, so orchestration code can call this uniformly.
    fn compute_fit(&self) -> f64 {
        -1.0
    }
}

/// Ranks `candidates` for one user, best-scored first. Ties keep the input
/// order of `candidates`; callers must not depend on tie order.
pub fn predict_items<S: ItemScorer + ?Sized>(
    scorer: &S,
    user_id: u32,
    candidates: &[u32],
) -> Vec<u32> {
    let mut scored: Vec<(f64, u32)> = candidates
        .iter()
        .map(|&item_id| (scorer.score(user_id, item_id), item_id))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(_, item_id)| item_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScores;

    impl ItemScorer for FixedScores {
        fn score(&self, _user_id: u32, item_id: u32) -> f64 {
            match item_id {
                0 => 0.1,
                1 => 0.9,
                2 => 0.5,
                _ => f64::MIN,
            }
        }
    }

    #[test]
    fn candidates_are_sorted_descending() {
        let ranked = predict_items(&FixedScores, 0, &[0, 1, 2, 3]);
        assert_eq!(ranked, vec![1, 2, 0, 3]);
    }

    #[test]
    fn ties_keep_candidate_order() {
        struct Flat;
        impl ItemScorer for Flat {
            fn score(&self, _: u32, _: u32) -> f64 {
                1.0
            }
        }
        assert_eq!(predict_items(&Flat, 0, &[4, 2, 7]), vec![4, 2, 7]);
    }
}
