//! Built-in appearance distance functions.

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// A zero vector has no direction and is maximally dissimilar (distance 1)
/// to everything.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Euclidean (L2) distance.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Smallest distance between `query` and any sample in `history`.
///
/// Samples whose length differs from `query` are ignored. Returns `None`
/// when no comparable sample exists.
pub fn nearest_distance<'a, I>(history: I, query: &[f64], metric: fn(&[f64], &[f64]) -> f64) -> Option<f64>
where
    I: IntoIterator<Item = &'a Vec<f64>>,
{
    history
        .into_iter()
        .filter(|sample| sample.len() == query.len())
        .map(|sample| metric(sample, query))
        .fold(None, |best, d| match best {
            Some(b) if b <= d => Some(b),
            _ => Some(d),
        })
}
