//! Seeded k-means used to initialize emission means.
//!
//! k-means++ seeding followed by Lloyd iterations. The RNG is only consulted
//! during seeding, so a fixed seed gives identical centers.

use rand::rngs::StdRng;
use rand::Rng;

const MAX_LLOYD_ITERATIONS: usize = 300;

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the nearest center; ties go to the lowest index.
fn nearest(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (j, c) in centers.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (j, d);
        }
    }
    best
}

/// k-means++ seeding: first center uniform, later centers with probability
/// proportional to squared distance from the closest chosen center.
fn seed_centers(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centers = Vec::with_capacity(k);
    centers.push(data[rng.gen_range(0..n)].clone());

    let mut dist: Vec<f64> = data
        .iter()
        .map(|x| squared_distance(x, &centers[0]))
        .collect();

    while centers.len() < k {
        let total: f64 = dist.iter().sum();
        let idx = if total <= 0.0 {
            rng.gen_range(0..n)
        } else {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = n - 1;
            for (i, d) in dist.iter().enumerate() {
                acc += d;
                if acc > target {
                    chosen = i;
                    break;
                }
            }
            chosen
        };
        let center = data[idx].clone();
        for (d, x) in dist.iter_mut().zip(data) {
            *d = d.min(squared_distance(x, &center));
        }
        centers.push(center);
    }
    centers
}

/// Cluster `data` into `k` groups and return the centers.
///
/// Requires `1 <= k <= data.len()`. A cluster that loses all members keeps its
/// previous center.
pub fn kmeans(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = seed_centers(data, k, rng);
    let d = centers[0].len();
    let mut assignments = vec![usize::MAX; data.len()];

    for _ in 0..MAX_LLOYD_ITERATIONS {
        let mut changed = false;
        for (a, x) in assignments.iter_mut().zip(data) {
            let (j, _) = nearest(x, &centers);
            if *a != j {
                *a = j;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0; d]; k];
        let mut counts = vec![0usize; k];
        for (&a, x) in assignments.iter().zip(data) {
            counts[a] += 1;
            for (s, v) in sums[a].iter_mut().zip(x) {
                *s += v;
            }
        }
        for ((center, sum), count) in centers.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                *center = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }
    }
    centers
}
