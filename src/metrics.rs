//! Per-list ranking measures.
//!
//! Every function takes a ranked item list (best first), the set of
//! relevant items, and a set of items to ignore (typically the user's
//! training items). Ignored items are skipped during traversal but still
//! advance a `left_out` counter, so that "position N" always means "the
//! N-th item the user has never seen", not "the N-th item overall".

use crate::sparse::RowSet;

/// Area under the ROC curve over a ranked list: the fraction of
/// relevant/irrelevant pairs in which the relevant item ranks higher.
/// Relevant items missing from `ranked` count as ranked below everything
/// evaluated. Returns 0.5 when no relevant/irrelevant pair exists.
pub fn auc(ranked: &[u32], correct: &RowSet, ignore: &RowSet) -> f64 {
    let mut num_eval_items = 0usize;
    let mut num_correct_pairs = 0usize;
    let mut hit_count = 0usize;
    for item_id in ranked {
        if ignore.contains(item_id) {
            continue;
        }
        num_eval_items += 1;
        if correct.contains(item_id) {
            hit_count += 1;
        } else {
            num_correct_pairs += hit_count;
        }
    }
    // relevant items that were never ranked contribute their pairs as
    // incorrectly ordered: the pair total uses the full relevant count
    let num_irrelevant = num_eval_items - hit_count;
    let num_eval_pairs = num_irrelevant * correct.len();
    if num_eval_pairs == 0 {
        return 0.5;
    }
    num_correct_pairs as f64 / num_eval_pairs as f64
}

/// Mean average precision of one ranked list; 0 when nothing relevant was
/// ranked.
pub fn map(ranked: &[u32], correct: &RowSet, ignore: &RowSet) -> f64 {
    let mut hit_count = 0usize;
    let mut avg_prec_sum = 0.0;
    let mut left_out = 0usize;

    for (i, item_id) in ranked.iter().enumerate() {
        if ignore.contains(item_id) {
            left_out += 1;
            continue;
        }
        if !correct.contains(item_id) {
            continue;
        }
        hit_count += 1;
        avg_prec_sum += hit_count as f64 / (i + 1 - left_out) as f64;
    }

    if hit_count > 0 {
        avg_prec_sum / hit_count as f64
    } else {
        0.0
    }
}

/// Normalized discounted cumulative gain: `DCG / IDCG`, where the ideal
/// DCG assumes all relevant items occupy the top ranks.
pub fn ndcg(ranked: &[u32], correct: &RowSet, ignore: &RowSet) -> f64 {
    let idcg = ideal_dcg(correct.len());
    let mut dcg = 0.0;
    let mut left_out = 0usize;

    for (i, item_id) in ranked.iter().enumerate() {
        if ignore.contains(item_id) {
            left_out += 1;
            continue;
        }
        if !correct.contains(item_id) {
            continue;
        }
        let rank = i + 1 - left_out;
        dcg += 1.0 / ((rank + 1) as f64).log2();
    }
    dcg / idcg
}

/// Reciprocal rank of the first relevant item, at its left-out-adjusted
/// position; 0 when nothing relevant was ranked.
pub fn reciprocal_rank(ranked: &[u32], correct: &RowSet, ignore: &RowSet) -> f64 {
    let mut left_out = 0usize;
    for (i, item_id) in ranked.iter().enumerate() {
        if ignore.contains(item_id) {
            left_out += 1;
            continue;
        }
        if correct.contains(item_id) {
            return 1.0 / (i + 1 - left_out) as f64;
        }
    }
    0.0
}

/// Fraction of the first `n` never-seen items that are relevant.
pub fn precision_at(ranked: &[u32], correct: &RowSet, ignore: &RowSet, n: usize) -> f64 {
    hits_at(ranked, correct, ignore, n) as f64 / n as f64
}

/// Fraction of the relevant items found within the first `n` never-seen
/// items.
pub fn recall_at(ranked: &[u32], correct: &RowSet, ignore: &RowSet, n: usize) -> f64 {
    if correct.is_empty() {
        return 0.0;
    }
    hits_at(ranked, correct, ignore, n) as f64 / correct.len() as f64
}

fn hits_at(ranked: &[u32], correct: &RowSet, ignore: &RowSet, n: usize) -> usize {
    let mut hit_count = 0usize;
    let mut left_out = 0usize;
    for (i, item_id) in ranked.iter().enumerate() {
        if ignore.contains(item_id) {
            left_out += 1;
            continue;
        }
        if !correct.contains(item_id) {
            continue;
        }
        if i < n + left_out {
            hit_count += 1;
        } else {
            break;
        }
    }
    hit_count
}

fn ideal_dcg(num_relevant: usize) -> f64 {
    (0..num_relevant)
        .map(|i| 1.0 / ((i + 2) as f64).log2())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::new_row_set;
    use approx::assert_abs_diff_eq;

    fn set(items: &[u32]) -> RowSet {
        let mut s = new_row_set();
        s.extend(items.iter().copied());
        s
    }

    #[test]
    fn auc_perfect_and_inverted_rankings() {
        let correct = set(&[0, 1]);
        let none = set(&[]);
        assert_abs_diff_eq!(auc(&[0, 1, 2, 3], &correct, &none), 1.0);
        assert_abs_diff_eq!(auc(&[2, 3, 0, 1], &correct, &none), 0.0);
        assert_abs_diff_eq!(auc(&[0, 2, 1, 3], &correct, &none), 0.75);
    }

    #[test]
    fn auc_with_no_valid_pair_defaults_to_half() {
        // the single evaluable item is relevant: no pair to order
        let correct = set(&[2]);
        let ignore = set(&[0, 1]);
        assert_abs_diff_eq!(auc(&[2, 1, 0], &correct, &ignore), 0.5);
    }

    #[test]
    fn auc_counts_dropped_relevant_items_as_bottom_ranked() {
        // item 5 is relevant but never ranked: both pairs it forms with
        // the irrelevant items count as incorrectly ordered
        let correct = set(&[0, 5]);
        let none = set(&[]);
        // eval items = 4, pairs = (4 - 2) * 2 = 4, correct pairs = 2
        assert_abs_diff_eq!(auc(&[0, 1, 2, 3], &correct, &none), 0.5);
    }

    #[test]
    fn precision_positions_shift_past_ignored_items() {
        // the two training items occupy the top ranks; the first two
        // never-seen items are 3 (relevant) and 4 (not)
        let correct = set(&[3]);
        let ignore = set(&[0, 1]);
        let ranked = [0, 1, 3, 4, 5];
        assert_abs_diff_eq!(precision_at(&ranked, &correct, &ignore, 1), 1.0);
        assert_abs_diff_eq!(precision_at(&ranked, &correct, &ignore, 2), 0.5);
        assert_abs_diff_eq!(recall_at(&ranked, &correct, &ignore, 1), 1.0);
    }

    #[test]
    fn precision_cutoff_excludes_late_hits() {
        let correct = set(&[4]);
        let ignore = set(&[]);
        let ranked = [0, 1, 2, 3, 4];
        assert_abs_diff_eq!(precision_at(&ranked, &correct, &ignore, 3), 0.0);
        assert_abs_diff_eq!(precision_at(&ranked, &correct, &ignore, 5), 0.2);
    }

    #[test]
    fn ndcg_is_one_for_ideal_ranking() {
        let correct = set(&[0, 1]);
        let none = set(&[]);
        assert_abs_diff_eq!(ndcg(&[0, 1, 2, 3], &correct, &none), 1.0, epsilon = 1e-12);
        assert!(ndcg(&[2, 0, 3, 1], &correct, &none) < 1.0);
    }

    #[test]
    fn ndcg_ranks_adjust_for_ignored_items() {
        let correct = set(&[2]);
        let ignore = set(&[0, 1]);
        // item 2 is the first never-seen item: ideal ranking
        assert_abs_diff_eq!(ndcg(&[0, 1, 2], &correct, &ignore), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn map_and_reciprocal_rank() {
        let correct = set(&[1, 3]);
        let none = set(&[]);
        let ranked = [0, 1, 2, 3];
        // hits at adjusted ranks 2 and 4: (1/2 + 2/4) / 2
        assert_abs_diff_eq!(map(&ranked, &correct, &none), 0.5);
        assert_abs_diff_eq!(reciprocal_rank(&ranked, &correct, &none), 0.5);

        let ignore = set(&[0]);
        assert_abs_diff_eq!(reciprocal_rank(&ranked, &correct, &ignore), 1.0);
        assert_abs_diff_eq!(map(&[], &correct, &none), 0.0);
    }
}
