//! # Likelihood-Weighted Parent Assignment
//!
//! When a table is sampled without its parent (single-table mode), foreign
//! keys are reconstructed by scoring every sampled child row against every
//! candidate parent's reconstructed model and drawing a parent per row with
//! probability proportional to likelihood.
//!
//! Likelihood evaluation can fail per parent (singular reconstructed
//! distribution); failures are undefined, not zero, and feed a fallback
//! ladder whose branch order is load-bearing:
//!
//! 1. every entry defined and exactly zero → weight by expected child-row
//!    counts instead;
//! 2. the mean over defined entries is undefined or zero → fill undefined
//!    entries with the expected counts, zeros stay zero;
//! 3. otherwise → fill undefined entries with the mean of the defined ones
//!    (failures are "typical", not "impossible");
//! 4. if the chosen weights still sum to zero → uniform over all candidates.

use rand::rngs::StdRng;
use rand::Rng;

/// Per-candidate likelihoods of one child row; `None` is an evaluation
/// failure, not a zero.
pub type RowLikelihoods = Vec<Option<f64>>;

/// Pick the index of a parent candidate for one child row.
///
/// `expected_rows` holds, per candidate, the expected number of child rows
/// carried by that parent's `num_rows` extension value.
pub fn choose_parent(
    likelihoods: &RowLikelihoods,
    expected_rows: &[f64],
    rng: &mut StdRng,
) -> usize {
    debug_assert_eq!(likelihoods.len(), expected_rows.len());

    let defined: Vec<f64> = likelihoods.iter().filter_map(|l| *l).collect();
    let mean = if defined.is_empty() {
        None
    } else {
        Some(defined.iter().sum::<f64>() / defined.len() as f64)
    };
    let none_undefined = likelihoods.iter().all(|l| l.is_some());

    let weights: Vec<f64> = if none_undefined && defined.iter().all(|l| *l == 0.0) {
        // Every parent scored exactly zero; fall back to expected counts.
        expected_rows.to_vec()
    } else {
        match mean {
            // At least one real signal: failures count as typical.
            Some(mean) if mean != 0.0 => {
                likelihoods.iter().map(|l| l.unwrap_or(mean)).collect()
            }
            // Failures mixed with zeros: expected counts stand in for the
            // failures, real zeros stay zero.
            _ => likelihoods
                .iter()
                .zip(expected_rows)
                .map(|(l, expected)| l.unwrap_or(*expected))
                .collect(),
        }
    };

    weighted_index(&weights, rng)
}

/// Cumulative-weight random index; uniform when every weight is zero.
fn weighted_index(weights: &[f64], rng: &mut StdRng) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return rng.random_range(0..weights.len());
    }

    let roll: f64 = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if roll < cumulative {
            return i;
        }
    }
    weights.len() - 1
}
