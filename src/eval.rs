//! Evaluation engine: rating-error metrics for rating predictors and
//! ranking-quality metrics for item recommenders.

use log::{debug, warn};
use rayon::prelude::*;

use crate::metrics;
use crate::ratings::RatingStore;
use crate::recommender::{predict_items, ItemScorer, RatingPredictor};
use crate::sparse::{new_row_set, RowSet, SparseBooleanMatrix};

/// Rating-error statistics over a held-out test set.
#[derive(Clone, Debug)]
pub struct RatingEvalResults {
    pub rmse: f64,
    pub mae: f64,
    /// Number of test ratings evaluated.
    pub count: usize,
    /// True when the statistics are NaN (empty test set or non-finite
    /// predictions); flagged instead of silently propagated.
    pub degenerate: bool,
}

/// RMSE and MAE of a rating predictor on held-out triples.
pub fn evaluate_ratings<P: RatingPredictor>(predictor: &P, test: &RatingStore) -> RatingEvalResults {
    let mut squared = 0.0;
    let mut absolute = 0.0;
    for position in 0..test.len() {
        let error =
            predictor.predict(test.user(position), test.item(position)) - test.value(position);
        squared += error * error;
        absolute += error.abs();
    }
    let count = test.len();
    let rmse = (squared / count as f64).sqrt();
    let mae = absolute / count as f64;
    let degenerate = !rmse.is_finite() || !mae.is_finite();
    if degenerate {
        warn!("degenerate rating evaluation over {count} test ratings: rmse={rmse} mae={mae}");
    }
    RatingEvalResults {
        rmse,
        mae,
        count,
        degenerate,
    }
}

/// Ranking-quality statistics, averaged over evaluable users.
#[derive(Clone, Debug)]
pub struct RankingEvalResults {
    pub auc: f64,
    pub map: f64,
    pub mrr: f64,
    pub ndcg: f64,
    pub prec_5: f64,
    pub prec_10: f64,
    pub prec_15: f64,
    pub recall_5: f64,
    pub recall_10: f64,
    pub recall_15: f64,
    /// Average of precision@{5,10,15}.
    pub combined_precision: f64,
    /// Average of recall@{5,10,15}.
    pub combined_recall: f64,
    /// Users that actually contributed to the averages.
    pub num_users: usize,
    /// Size of the candidate item set.
    pub num_items: usize,
    /// Ranked lists computed (one per contributing user).
    pub num_lists: usize,
    /// `(user, item)` pairs positive in both train and test. Surfaced as a
    /// warning before evaluation, never auto-resolved.
    pub overlap: usize,
    /// True when no user was evaluable, so the averages are NaN.
    pub degenerate: bool,
}

#[derive(Clone, Copy, Default)]
struct UserMeasures {
    auc: f64,
    map: f64,
    mrr: f64,
    ndcg: f64,
    prec: [f64; 3],
    recall: [f64; 3],
}

const PRECISION_CUTOFFS: [usize; 3] = [5, 10, 15];

/// Evaluate a ranking recommender against held-out positive-only feedback.
///
/// For each user in `users` that has at least one test item among
/// `candidate_items`, all candidates are ranked by predicted score; items
/// already in the user's training row are skipped during rank traversal
/// but still offset the positions used for the @N cutoffs. A user only
/// contributes when at least one relevant/irrelevant pair exists among its
/// never-seen candidates; skipped users are reported at debug level.
pub fn evaluate_ranking<S: ItemScorer + Sync>(
    scorer: &S,
    test: &SparseBooleanMatrix,
    train: &SparseBooleanMatrix,
    users: &[u32],
    candidate_items: &[u32],
) -> RankingEvalResults {
    let overlap = train.overlap(test);
    if overlap > 0 {
        warn!("train and test data overlap in {overlap} (user, item) pairs");
    }

    let candidate_set: RowSet = {
        let mut set = new_row_set();
        set.extend(candidate_items.iter().copied());
        set
    };
    let empty_row = new_row_set();

    let per_user: Vec<UserMeasures> = users
        .par_iter()
        .filter_map(|&user_id| {
            let u = user_id as usize;
            let mut correct = new_row_set();
            for item in test.iter_row(u) {
                if candidate_set.contains(&item) {
                    correct.insert(item);
                }
            }
            if correct.is_empty() {
                debug!("user {user_id} skipped: no test items among the candidates");
                return None;
            }
            let ignore = train.row(u).unwrap_or(&empty_row);
            let in_train = candidate_items
                .iter()
                .filter(|item| ignore.contains(item))
                .count();
            let num_eval_items = candidate_items.len() - in_train;
            if num_eval_items == correct.len() {
                debug!("user {user_id} skipped: no relevant/irrelevant pair to rank");
                return None;
            }

            let ranked = predict_items(scorer, user_id, candidate_items);
            let mut measures = UserMeasures {
                auc: metrics::auc(&ranked, &correct, ignore),
                map: metrics::map(&ranked, &correct, ignore),
                mrr: metrics::reciprocal_rank(&ranked, &correct, ignore),
                ndcg: metrics::ndcg(&ranked, &correct, ignore),
                ..UserMeasures::default()
            };
            for (slot, &n) in PRECISION_CUTOFFS.iter().enumerate() {
                measures.prec[slot] = metrics::precision_at(&ranked, &correct, ignore, n);
                measures.recall[slot] = metrics::recall_at(&ranked, &correct, ignore, n);
            }
            Some(measures)
        })
        .collect();

    let num_users = per_user.len();
    let mut total = UserMeasures::default();
    for m in &per_user {
        total.auc += m.auc;
        total.map += m.map;
        total.mrr += m.mrr;
        total.ndcg += m.ndcg;
        for slot in 0..3 {
            total.prec[slot] += m.prec[slot];
            total.recall[slot] += m.recall[slot];
        }
    }

    let degenerate = num_users == 0;
    if degenerate {
        warn!("no evaluable user in the ranking test set");
    }
    let n = num_users as f64;
    let prec: Vec<f64> = total.prec.iter().map(|s| s / n).collect();
    let recall: Vec<f64> = total.recall.iter().map(|s| s / n).collect();
    RankingEvalResults {
        auc: total.auc / n,
        map: total.map / n,
        mrr: total.mrr / n,
        ndcg: total.ndcg / n,
        prec_5: prec[0],
        prec_10: prec[1],
        prec_15: prec[2],
        recall_5: recall[0],
        recall_10: recall[1],
        recall_15: recall[2],
        combined_precision: prec.iter().sum::<f64>() / 3.0,
        combined_recall: recall.iter().sum::<f64>() / 3.0,
        num_users,
        num_items: candidate_items.len(),
        num_lists: num_users,
        overlap,
        degenerate,
    }
}
