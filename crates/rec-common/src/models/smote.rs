use rand::Rng;

use super::evaluation::class_counts;

/// Synthetic minority oversampling.
///
/// Each synthetic row interpolates between a random minority row and one of
/// its `k` nearest minority neighbours (Euclidean), until both classes have
/// the same count. Returns the original rows followed by the synthetic ones.
pub fn smote<R: Rng + ?Sized>(rows: &[Vec<f64>], labels: &[u8], k: usize, rng: &mut R) -> (Vec<Vec<f64>>, Vec<u8>) {
    let counts = class_counts(labels);
    let minority_class: u8 = if counts[1] < counts[0] { 1 } else { 0 };
    let minority: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l == minority_class)
        .map(|(i, _)| i)
        .collect();
    let deficit = counts[usize::from(1 - minority_class)].saturating_sub(minority.len());

    let mut out_rows = rows.to_vec();
    let mut out_labels = labels.to_vec();
    let k = k.min(minority.len().saturating_sub(1));
    if deficit == 0 || k == 0 {
        return (out_rows, out_labels);
    }

    let neighbours: Vec<Vec<usize>> = minority
        .iter()
        .map(|&i| {
            let mut others: Vec<(f64, usize)> = minority
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (squared_distance(&rows[i], &rows[j]), j))
                .collect();
            others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            others.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect();

    for _ in 0..deficit {
        let pick = rng.random_range(0..minority.len());
        let base = &rows[minority[pick]];
        let neighbour = &rows[neighbours[pick][rng.random_range(0..k)]];
        let gap: f64 = rng.random();
        out_rows.push(base.iter().zip(neighbour).map(|(a, b)| a + gap * (b - a)).collect());
        out_labels.push(minority_class);
    }
    (out_rows, out_labels)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn balances_classes_with_interpolated_rows() {
        let mut rows: Vec<Vec<f64>> = (0..20).map(|i| vec![f64::from(i), 0.0]).collect();
        rows.extend((0..6).map(|i| vec![100.0 + f64::from(i), 1.0]));
        let mut labels = vec![0u8; 20];
        labels.extend(vec![1u8; 6]);

        let mut rng = StdRng::seed_from_u64(42);
        let (out_rows, out_labels) = smote(&rows, &labels, 5, &mut rng);
        assert_eq!(class_counts(&out_labels), [20, 20]);
        assert_eq!(out_rows.len(), 40);
        for row in &out_rows[26..] {
            assert!(row[0] >= 100.0 && row[0] <= 105.0);
            assert_eq!(row[1], 1.0);
        }
    }

    #[test]
    fn single_minority_row_is_left_alone() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0]];
        let labels = vec![0, 0, 1];
        let mut rng = StdRng::seed_from_u64(1);
        let (out_rows, out_labels) = smote(&rows, &labels, 5, &mut rng);
        assert_eq!(out_rows.len(), 3);
        assert_eq!(out_labels, labels);
    }
}
