//! Reference retriever over the in-memory node list.
//!
//! Production deployments plug a vector index in behind [`Retriever`];
//! [`BruteForceRetriever`] scores every chunk, which is plenty for a
//! knowledge base of a few hundred documents and keeps the CLI usable
//! without any external service.

use anyhow::Result;

use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::models::{Chunk, CitationCandidate};
use crate::select::answer_words;

/// Query terms shorter than this are ignored by lexical scoring.
const MIN_TERM_CHARS: usize = 3;

pub trait Retriever {
    /// Up to `top_k` candidates, best first.
    fn retrieve(&self, question: &str, nodes: &[Chunk], top_k: usize) -> Result<Vec<CitationCandidate>>;
}

/// Cosine similarity when the nodes carry vectors, otherwise the fraction
/// of distinct question terms found in each chunk.
pub struct BruteForceRetriever<'e> {
    embedder: &'e dyn Embedder,
}

impl<'e> BruteForceRetriever<'e> {
    pub fn new(embedder: &'e dyn Embedder) -> Self {
        Self { embedder }
    }
}

impl Retriever for BruteForceRetriever<'_> {
    fn retrieve(&self, question: &str, nodes: &[Chunk], top_k: usize) -> Result<Vec<CitationCandidate>> {
        let mut candidates: Vec<CitationCandidate> = if nodes.iter().any(Chunk::is_embedded) {
            let query = embed_query(self.embedder, question)?;
            nodes
                .iter()
                .filter_map(|chunk| {
                    let vector = chunk.embedding.as_ref()?;
                    Some(CitationCandidate {
                        chunk: chunk.clone(),
                        score: cosine_similarity(&query, vector) as f64,
                    })
                })
                .collect()
        } else {
            lexical_scores(question, nodes)
        };

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(top_k);
        Ok(candidates)
    }
}

fn lexical_scores(question: &str, nodes: &[Chunk]) -> Vec<CitationCandidate> {
    let terms = answer_words(question, MIN_TERM_CHARS);
    nodes
        .iter()
        .map(|chunk| {
            let score = if terms.is_empty() {
                0.0
            } else {
                let text = chunk.text.to_lowercase();
                let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
                hits as f64 / terms.len() as f64
            };
            CitationCandidate {
                chunk: chunk.clone(),
                score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;

    fn chunk(file: &str, text: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: format!("{}-{}", file, text.len()),
            file_name: file.to_string(),
            file_path: format!("/d/{}", file),
            page_label: None,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
            embedding,
        }
    }

    struct AxisEmbedder;

    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("money") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    #[test]
    fn lexical_ranking_without_vectors() {
        let nodes = vec![
            chunk("a.txt", "The weather was rainy", None),
            chunk("b.txt", "Quarterly revenue grew strongly", None),
            chunk("c.txt", "Revenue dipped in the weather", None),
        ];
        let hits = BruteForceRetriever::new(&DisabledProvider)
            .retrieve("How did revenue grow this quarter?", &nodes, 2)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.file_name, "b.txt");
        assert_eq!(hits[1].chunk.file_name, "c.txt");
    }

    #[test]
    fn cosine_ranking_with_vectors() {
        let nodes = vec![
            chunk("a.txt", "rain", Some(vec![0.0, 1.0])),
            chunk("b.txt", "cash", Some(vec![0.9, 0.1])),
            chunk("c.txt", "unembedded", None),
        ];
        let hits = BruteForceRetriever::new(&AxisEmbedder)
            .retrieve("where is the money", &nodes, 5)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.file_name, "b.txt");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn vectors_with_disabled_embedder_is_an_error() {
        let nodes = vec![chunk("a.txt", "x", Some(vec![1.0]))];
        assert!(BruteForceRetriever::new(&DisabledProvider)
            .retrieve("q", &nodes, 1)
            .is_err());
    }
}
