//! Isolation Forest for Batch Outlier Scoring
//!
//! An ensemble of random isolation trees. Points that are separated from
//! the rest of the batch after few random cuts are anomalous.
//!
//! Key properties:
//! - Each tree is grown on a subsample drawn without replacement
//! - Trees stop at height `ceil(log2(sample_size))`
//! - Cuts only use features that still vary inside the node
//! - Per-tree seeds are drawn from one master seed, so the forest is
//!   reproducible regardless of how many threads build it
//!
//! Reference: "Isolation Forest" (Liu, Ting, Zhou, ICDM 2008)

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Node of an isolation tree
#[derive(Clone, Debug)]
enum IsolationNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    /// Unsplit remainder of the subsample
    Leaf { size: usize },
}

#[derive(Clone, Debug)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: grow_node(data, sample, 0, height_limit, rng),
        }
    }

    /// Depth reached by `point`, adjusted for the unsplit leaf population
    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                IsolationNode::Leaf { size } => return depth + average_path_length(*size),
                IsolationNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

fn grow_node(
    data: &[Vec<f64>],
    rows: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> IsolationNode {
    if depth >= height_limit || rows.len() <= 1 {
        return IsolationNode::Leaf { size: rows.len() };
    }

    // Features that still vary within this node, with their ranges
    let width = data[rows[0]].len();
    let candidates: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|f| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(data[r][f]), hi.max(data[r][f]))
            });
            (hi > lo).then_some((f, lo, hi))
        })
        .collect();

    if candidates.is_empty() {
        return IsolationNode::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let threshold = rng.random_range(lo..hi);

    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| data[r][feature] <= threshold);

    IsolationNode::Split {
        feature,
        threshold,
        left: Box::new(grow_node(data, left, depth + 1, height_limit, rng)),
        right: Box::new(grow_node(data, right, depth + 1, height_limit, rng)),
    }
}

/// Average path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Seeded isolation forest
#[derive(Clone, Debug)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    seed: u64,
    /// Subsample size actually used by the last fit
    sample_size: usize,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    /// # Arguments
    /// * `n_estimators` - Number of trees (at least 1)
    /// * `max_samples` - Subsample size per tree, clamped to the batch size on fit
    /// * `seed` - Master seed for subsampling and cuts
    pub fn new(n_estimators: usize, max_samples: usize, seed: u64) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            max_samples: max_samples.max(1),
            seed,
            sample_size: 0,
            trees: Vec::new(),
        }
    }

    /// Grow a fresh forest on `data`, discarding any previous fit
    pub fn fit(&mut self, data: &[Vec<f64>]) {
        self.trees.clear();
        self.sample_size = self.max_samples.min(data.len());
        if data.is_empty() {
            return;
        }

        let height_limit = (self.sample_size as f64).log2().ceil().max(1.0) as usize;
        let mut master = StdRng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.random()).collect();
        let n = data.len();
        let sample_size = self.sample_size;

        self.trees = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let sample = index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(data, sample, height_limit, &mut rng)
            })
            .collect();
    }

    /// Per-row score, opposite of the anomaly score of the original paper:
    /// values near -1 are anomalous, values near -0.5 or above are normal.
    pub fn score_samples(&self, data: &[Vec<f64>]) -> Vec<f64> {
        if self.trees.is_empty() {
            return vec![0.0; data.len()];
        }
        let norm = average_path_length(self.sample_size).max(f64::EPSILON);
        let trees = self.trees.len() as f64;

        data.par_iter()
            .map(|point| {
                let mean_depth = self
                    .trees
                    .iter()
                    .map(|t| t.path_length(point))
                    .sum::<f64>()
                    / trees;
                -(2.0_f64.powf(-mean_depth / norm))
            })
            .collect()
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut data: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![(i % 10) as f64 * 0.1, (i % 7) as f64 * 0.1])
            .collect();
        data.push(vec![25.0, -25.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn test_outlier_scores_lowest() {
        let data = cluster_with_outlier();
        let mut forest = IsolationForest::new(100, 256, 42);
        forest.fit(&data);
        let scores = forest.score_samples(&data);

        let outlier = scores[data.len() - 1];
        let min_normal = scores[..data.len() - 1]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        assert!(outlier < min_normal, "outlier {outlier} vs {min_normal}");
        assert!(scores.iter().all(|s| (-1.0..0.0).contains(s)));
    }

    #[test]
    fn test_reproducible_with_same_seed() {
        let data = cluster_with_outlier();
        let mut a = IsolationForest::new(50, 32, 7);
        let mut b = IsolationForest::new(50, 32, 7);
        a.fit(&data);
        b.fit(&data);
        assert_eq!(a.score_samples(&data), b.score_samples(&data));
    }

    #[test]
    fn test_sample_size_clamped_to_batch() {
        let data = vec![vec![1.0], vec![2.0]];
        let mut forest = IsolationForest::new(10, 256, 1);
        forest.fit(&data);
        assert_eq!(forest.sample_size(), 2);
        assert_eq!(forest.score_samples(&data).len(), 2);
    }

    #[test]
    fn test_constant_data_is_single_leaf() {
        let data = vec![vec![3.0, 3.0]; 8];
        let mut forest = IsolationForest::new(5, 8, 1);
        forest.fit(&data);
        let scores = forest.score_samples(&data);
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }
}
