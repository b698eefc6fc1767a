//! Maximal Marginal Relevance selection.
//!
//! MMR = λ × relevance(candidate) − (1 − λ) × max similarity(candidate, selected)
//!
//! λ = 1.0 is pure relevance, λ = 0.0 pure diversity. Vectors are expected to be
//! L2-normalized so the dot product is the cosine similarity.

use ndarray::Array1;

/// One entry of the candidate pool, in pool order (relevance descending).
#[derive(Debug, Clone, Copy)]
pub struct MmrCandidate<'a> {
    pub relevance: f32,
    pub vector: &'a Array1<f32>,
}

/// Select up to `k` pool indices in MMR order.
///
/// Ties on the MMR score go to the lowest pool index, so the result is fully
/// determined by the pool order, `k` and `lambda`.
pub fn mmr_select(pool: &[MmrCandidate<'_>], k: usize, lambda: f32) -> Vec<usize> {
    let k = k.min(pool.len());
    let mut selected = Vec::with_capacity(k);
    let mut taken = vec![false; pool.len()];
    // Highest similarity of each candidate to anything selected so far.
    let mut max_sim = vec![f32::NEG_INFINITY; pool.len()];

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (idx, candidate) in pool.iter().enumerate() {
            if taken[idx] {
                continue;
            }
            let redundancy = if selected.is_empty() { 0.0 } else { max_sim[idx] };
            let score = lambda * candidate.relevance - (1.0 - lambda) * redundancy;
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }

        let Some((chosen, _)) = best else { break };
        taken[chosen] = true;
        selected.push(chosen);

        let chosen_vec = pool[chosen].vector;
        for (idx, candidate) in pool.iter().enumerate() {
            if !taken[idx] {
                let sim = candidate.vector.dot(chosen_vec);
                if sim > max_sim[idx] {
                    max_sim[idx] = sim;
                }
            }
        }
    }

    selected
}
