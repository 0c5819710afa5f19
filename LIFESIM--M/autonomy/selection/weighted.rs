use rand::Rng;

/// Clamps a score into a usable weight: negative and non-finite scores
/// weigh nothing.
#[must_use]
pub fn weight_of(score: f64) -> f64 {
    if score.is_finite() && score > 0.0 {
        score
    } else {
        0.0
    }
}

/// Picks an index with probability proportional to its weight using a
/// cumulative-sum table and binary search. Equal weights own disjoint,
/// equally sized intervals in input order, so ties carry no bias. Returns
/// `None` when no weight is positive.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for weight in weights {
        total += weight_of(*weight);
        cumulative.push(total);
    }
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let draw = rng.gen_range(0.0..total);
    let index = cumulative.partition_point(|edge| *edge <= draw);
    Some(index.min(weights.len() - 1))
}

/// Picks an index uniformly.
pub fn uniform_index<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Option<usize> {
    (len > 0).then(|| rng.gen_range(0..len))
}

/// Selection probability of every weight.
#[must_use]
pub fn probabilities(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().copied().map(weight_of).sum();
    weights
        .iter()
        .map(|weight| {
            if total > 0.0 {
                weight_of(*weight) / total
            } else {
                0.0
            }
        })
        .collect()
}
