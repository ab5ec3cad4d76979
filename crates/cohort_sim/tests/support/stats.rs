#![allow(dead_code)]

use cohort_sim::stats::percentile_ranks;

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    cov / (va * vb).sqrt()
}

/// Spearman rank correlation; inputs are assumed to be free of ties.
pub fn spearman(a: &[f64], b: &[f64]) -> f64 {
    pearson(&percentile_ranks(a), &percentile_ranks(b))
}

/// Share of `values` equal to `level`.
pub fn proportion(values: &[String], level: &str) -> f64 {
    values.iter().filter(|v| *v == level).count() as f64 / values.len() as f64
}
