//! Vector similarity for embedder output.

/// Cosine similarity between two f32 vectors.
/// Returns 0.0 on dimension mismatch or when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

/// Mean cosine similarity between each adjacent pair of vectors.
/// `None` when fewer than two vectors are given.
pub fn mean_adjacent_similarity(vectors: &[Vec<f32>]) -> Option<f64> {
    if vectors.len() < 2 {
        return None;
    }
    let sum: f64 = vectors
        .windows(2)
        .map(|w| cosine_similarity(&w[0], &w[1]) as f64)
        .sum();
    Some(sum / (vectors.len() - 1) as f64)
}
