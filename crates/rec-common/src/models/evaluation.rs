//! Classification metrics and stratified resampling.

use rand::seq::SliceRandom;
use rand::Rng;

pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Support-weighted precision, recall and F1 over the labels present in
/// either vector. Undefined ratios count as 0.0.
pub fn weighted_precision_recall_f1(y_true: &[u8], y_pred: &[u8]) -> (f64, f64, f64) {
    let mut labels: Vec<u8> = y_true.iter().chain(y_pred).copied().collect();
    labels.sort_unstable();
    labels.dedup();

    let mut totals = (0.0, 0.0, 0.0);
    let mut support_sum = 0.0;
    for label in labels {
        let tp = y_true.iter().zip(y_pred).filter(|(t, p)| **t == label && **p == label).count() as f64;
        let fp = y_true.iter().zip(y_pred).filter(|(t, p)| **t != label && **p == label).count() as f64;
        let fn_ = y_true.iter().zip(y_pred).filter(|(t, p)| **t == label && **p != label).count() as f64;
        let support = tp + fn_;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if support > 0.0 { tp / support } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        totals.0 += precision * support;
        totals.1 += recall * support;
        totals.2 += f1 * support;
        support_sum += support;
    }

    if support_sum == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    (totals.0 / support_sum, totals.1 / support_sum, totals.2 / support_sum)
}

pub fn weighted_f1(y_true: &[u8], y_pred: &[u8]) -> f64 {
    weighted_precision_recall_f1(y_true, y_pred).2
}

/// Area under the ROC curve via the rank statistic; `None` unless both
/// classes are present.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y == 1)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

pub fn class_counts(labels: &[u8]) -> [usize; 2] {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    [labels.len() - positives, positives]
}

fn shuffled_by_class<R: Rng + ?Sized>(labels: &[u8], rng: &mut R) -> [Vec<usize>; 2] {
    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        by_class[usize::from(label.min(1))].push(i);
    }
    for members in &mut by_class {
        members.shuffle(rng);
    }
    by_class
}

/// Train/test split preserving class proportions. Every class with at least
/// two members lands on both sides.
pub fn stratified_split<R: Rng + ?Sized>(labels: &[u8], test_size: f64, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let mut train = Vec::new();
    let mut test = Vec::new();
    for members in shuffled_by_class(labels, rng) {
        let n = members.len();
        let n_test = if n >= 2 {
            ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
        } else {
            0
        };
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Stratified k-fold: `(train, validation)` index pairs. Folds that would be
/// empty are skipped.
pub fn stratified_kfold<R: Rng + ?Sized>(labels: &[u8], k: usize, rng: &mut R) -> Vec<(Vec<usize>, Vec<usize>)> {
    if k < 2 {
        return Vec::new();
    }
    let mut fold_of = vec![0usize; labels.len()];
    for members in shuffled_by_class(labels, rng) {
        for (position, idx) in members.into_iter().enumerate() {
            fold_of[idx] = position % k;
        }
    }
    (0..k)
        .filter_map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            (!validation.is_empty() && !train.is_empty()).then_some((train, validation))
        })
        .collect()
}
