//! Read-only views derived from a run: rankings and relative change.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopKConfig {
    pub k: usize,
}

impl Default for TopKConfig {
    fn default() -> Self {
        Self { k: 3 }
    }
}

/// The `k` items with the largest key, largest first.
///
/// Equal keys keep their input order, so "first encountered" wins ties.
pub fn top_k_by<T, K, F>(items: impl IntoIterator<Item = T>, cfg: TopKConfig, mut key: F) -> Vec<T>
where
    K: Ord,
    F: FnMut(&T) -> K,
{
    let mut ranked: Vec<T> = items.into_iter().collect();
    ranked.sort_by(|a, b| key(b).cmp(&key(a)));
    ranked.truncate(cfg.k);
    ranked
}

/// Percent change from `baseline` to `value`; 0 when the baseline is 0.
pub fn percent_change(baseline: f64, value: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (value - baseline) / baseline * 100.0
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
