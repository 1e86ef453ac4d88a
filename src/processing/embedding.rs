use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::processing::MatchError;

/// Only the closest candidates are ever examined downstream; the ranking is
/// truncated to this many entries before `top_k` is applied.
pub const NEAREST_CANDIDATE_CAP: usize = 5;

/// Converts a batch of short strings into unit-length vectors, one per input,
/// in input order.
pub trait Embedder {
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, MatchError>;
}

/// Multilingual sentence embedder backed by `fastembed`.
pub struct FastembedProvider {
    model: TextEmbedding,
}

impl FastembedProvider {
    /// Loads the multilingual E5 model. Failure here is fatal to every match
    /// operation that depends on the provider.
    pub fn new() -> Result<Self, MatchError> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::MultilingualE5Small))
            .map_err(|error| MatchError::EmbeddingUnavailable(format!("{error:?}")))?;
        Ok(Self { model })
    }
}

impl Embedder for FastembedProvider {
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, MatchError> {
        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|error| MatchError::EmbeddingUnavailable(format!("{error:?}")))?;
        Ok(embeddings
            .iter()
            .map(|value| normalize_embedding(value))
            .collect())
    }
}

/// Normalize a vector to unit length.
///
/// Returns the original vector when the norm is zero.
pub(crate) fn normalize_embedding(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vec.to_vec()
    } else {
        vec.iter().map(|x| x / norm).collect()
    }
}

/// Cosine distance (1 − cosine similarity); zero-norm inputs are treated as
/// maximally distant from everything.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Embed a list of labels, pairing each with its vector in input order.
pub fn embed_labels<E>(
    embedder: &mut E,
    labels: &[String],
) -> Result<Vec<(String, Vec<f32>)>, MatchError>
where
    E: Embedder + ?Sized,
{
    let vectors = embedder.embed(labels)?;
    Ok(labels.iter().cloned().zip(vectors).collect())
}

/// Ranks `candidates` by cosine distance to `query`, closest first.
///
/// Ties keep candidate insertion order (stable sort). The result is capped
/// at [`NEAREST_CANDIDATE_CAP`] entries before `top_k` is applied, so the
/// returned length is min(top_k, 5, number of candidates).
pub fn nearest<E>(
    embedder: &mut E,
    query: &str,
    candidates: &[(String, Vec<f32>)],
    top_k: usize,
) -> Result<Vec<(String, f32)>, MatchError>
where
    E: Embedder + ?Sized,
{
    if candidates.is_empty() {
        return Err(MatchError::NoCandidates);
    }

    let query_vector = embedder
        .embed(std::slice::from_ref(&query.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| MatchError::EmbeddingUnavailable("empty embedding batch".to_string()))?;

    let mut ranked: Vec<(String, f32)> = candidates
        .iter()
        .map(|(label, vector)| (label.clone(), cosine_distance(&query_vector, vector)))
        .collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    ranked.truncate(NEAREST_CANDIDATE_CAP);
    ranked.truncate(top_k);

    Ok(ranked)
}
