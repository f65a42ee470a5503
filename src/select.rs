//! Citation selection.
//!
//! The retriever ranks chunks against the *question*; the chunk worth
//! citing is the one that best supports the generated *answer*. The top
//! `top_n` candidates by retrieval score are re-ranked by
//!
//! ```text
//! alignment = answer content-words (len >= min_word_len) found in the chunk text
//! combined  = alignment * alignment_weight + retrieval_score
//! ```
//!
//! The highest `combined` wins, earliest candidate on ties. When no
//! candidate in the window scores above zero, the candidate with the
//! highest raw retrieval score over the whole list is cited instead.

use std::collections::BTreeSet;

use crate::config::CitationConfig;
use crate::models::{Citation, CitationCandidate};

/// Lowercased distinct words (runs of alphanumerics and `_`) of `answer`
/// with at least `min_len` chars.
pub fn answer_words(answer: &str, min_len: usize) -> BTreeSet<String> {
    answer
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty() && w.chars().count() >= min_len)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Shorten `text` (trimmed) to at most `max_chars` characters. Cuts after
/// the last `.` in the window when it lies past `cut_ratio * max_chars`,
/// otherwise truncates and appends `...`.
pub fn excerpt(text: &str, max_chars: usize, cut_ratio: f64) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let window: Vec<char> = text.chars().take(max_chars).collect();
    let last_period = window.iter().rposition(|&c| c == '.');
    match last_period {
        Some(pos) if pos as f64 > max_chars as f64 * cut_ratio => window[..=pos].iter().collect(),
        _ => {
            let mut out: String = window.into_iter().collect();
            out.push_str("...");
            out
        }
    }
}

#[derive(Clone, Copy)]
struct Scored<'a> {
    candidate: &'a CitationCandidate,
    alignment: usize,
    combined: f64,
}

#[derive(Debug, Clone)]
pub struct SourceSelector {
    top_n: usize,
    min_word_len: usize,
    alignment_weight: f64,
    excerpt_chars: usize,
    sentence_cut_ratio: f64,
}

impl Default for SourceSelector {
    fn default() -> Self {
        Self::from_config(&CitationConfig::default())
    }
}

impl SourceSelector {
    pub fn from_config(config: &CitationConfig) -> Self {
        Self {
            top_n: config.top_n.max(1),
            min_word_len: config.min_word_len,
            alignment_weight: config.alignment_weight,
            excerpt_chars: config.excerpt_chars,
            sentence_cut_ratio: config.sentence_cut_ratio,
        }
    }

    /// Pick up to `max_sources` citations for `answer`. Empty input gives
    /// an empty list. The first citation is always present otherwise;
    /// further ones must have non-zero alignment and come from a document
    /// not already cited.
    pub fn select_sources(
        &self,
        answer: &str,
        candidates: &[CitationCandidate],
        max_sources: usize,
    ) -> Vec<Citation> {
        if candidates.is_empty() || max_sources == 0 {
            return Vec::new();
        }

        let words = answer_words(answer, self.min_word_len);

        let mut window: Vec<&CitationCandidate> = candidates.iter().collect();
        window.sort_by(|a, b| b.score.total_cmp(&a.score));
        window.truncate(self.top_n);

        let mut scored: Vec<Scored> = window
            .into_iter()
            .map(|candidate| self.score(candidate, &words))
            .collect();
        // stable: equal scores keep retrieval order
        scored.sort_by(|a, b| b.combined.total_cmp(&a.combined));

        let primary = match scored.first() {
            Some(best) if best.combined > 0.0 => *best,
            _ => self.score(highest_score(candidates), &words),
        };
        let mut cited = vec![doc_key(&primary)];
        let mut citations = vec![self.citation(&primary)];

        for s in &scored {
            if citations.len() >= max_sources {
                break;
            }
            let key = doc_key(s);
            if s.alignment == 0 || cited.contains(&key) {
                continue;
            }
            cited.push(key);
            citations.push(self.citation(s));
        }

        citations
    }

    fn score<'a>(&self, candidate: &'a CitationCandidate, words: &BTreeSet<String>) -> Scored<'a> {
        let text = candidate.chunk.text.to_lowercase();
        let alignment = words.iter().filter(|w| text.contains(w.as_str())).count();
        Scored {
            candidate,
            alignment,
            combined: alignment as f64 * self.alignment_weight + candidate.score,
        }
    }

    fn citation(&self, s: &Scored<'_>) -> Citation {
        let chunk = &s.candidate.chunk;
        Citation {
            text: excerpt(&chunk.text, self.excerpt_chars, self.sentence_cut_ratio),
            filename: chunk.file_name.clone(),
            page: chunk.page_label.clone(),
            score: s.candidate.score,
            alignment: s.alignment,
            combined_score: s.combined,
        }
    }
}

fn doc_key<'a>(s: &Scored<'a>) -> (&'a str, &'a str) {
    (&s.candidate.chunk.file_name, &s.candidate.chunk.file_path)
}

/// First candidate with the maximum raw score.
fn highest_score(candidates: &[CitationCandidate]) -> &CitationCandidate {
    let mut best = &candidates[0];
    for c in &candidates[1..] {
        if c.score > best.score {
            best = c;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn cand(file: &str, page: Option<&str>, text: &str, score: f64) -> CitationCandidate {
        CitationCandidate {
            chunk: Chunk {
                id: format!("{}:{}", file, text.len()),
                file_name: file.to_string(),
                file_path: format!("/data/{}", file),
                page_label: page.map(str::to_string),
                chunk_index: 0,
                text: text.to_string(),
                hash: String::new(),
                embedding: None,
            },
            score,
        }
    }

    #[test]
    fn alignment_beats_raw_score() {
        let selector = SourceSelector::default();
        let answer = "Revenue grew significantly this quarter";
        for (rain, revenue) in [(0.9, 0.95), (0.95, 0.9)] {
            let candidates = vec![
                cand("weather.pdf", Some("2"), "rainfall increased", rain),
                cand("finance.pdf", Some("7"), "company revenue grew", revenue),
            ];
            let picked = selector.select_sources(answer, &candidates, 1);
            assert_eq!(picked.len(), 1);
            assert_eq!(picked[0].filename, "finance.pdf");
            assert_eq!(picked[0].page.as_deref(), Some("7"));
            assert_eq!(picked[0].alignment, 2);
            assert!((picked[0].combined_score - (20.0 + revenue)).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_candidates_give_no_citations() {
        assert!(SourceSelector::default()
            .select_sources("anything at all", &[], 3)
            .is_empty());
    }

    #[test]
    fn no_alignment_falls_back_to_highest_score() {
        let selector = SourceSelector::default();
        let candidates = vec![
            cand("a.txt", None, "alpha", 0.4),
            cand("b.txt", None, "bravo", 0.8),
            cand("c.txt", None, "charlie", 0.6),
        ];
        let picked = selector.select_sources("Nothing relevant whatsoever", &candidates, 1);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].filename, "b.txt");
        assert_eq!(picked[0].alignment, 0);
    }

    #[test]
    fn non_positive_combined_falls_back_to_raw_score() {
        let selector = SourceSelector::default();
        // a: 1 * 10 - 15 = -5, b: 0 * 10 - 8 = -8
        let candidates = vec![
            cand("a.txt", None, "revenue", -15.0),
            cand("b.txt", None, "bravo", -8.0),
        ];
        let picked = selector.select_sources("revenue", &candidates, 1);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].filename, "b.txt");
        assert_eq!(picked[0].alignment, 0);
    }

    #[test]
    fn window_limits_reranking_to_top_three() {
        let selector = SourceSelector::default();
        let candidates = vec![
            cand("a.txt", None, "nothing", 0.9),
            cand("b.txt", None, "nothing", 0.8),
            cand("c.txt", None, "nothing", 0.7),
            cand("d.txt", None, "mentions revenue exactly", 0.1),
        ];
        let picked = selector.select_sources("revenue", &candidates, 1);
        assert_eq!(picked[0].filename, "a.txt");
    }

    #[test]
    fn ties_keep_retrieval_order() {
        let selector = SourceSelector::default();
        let candidates = vec![
            cand("first.txt", None, "budget approved", 0.5),
            cand("second.txt", None, "budget approved", 0.5),
        ];
        let picked = selector.select_sources("The budget was approved", &candidates, 1);
        assert_eq!(picked[0].filename, "first.txt");
    }

    #[test]
    fn deterministic_across_calls() {
        let selector = SourceSelector::default();
        let candidates = vec![
            cand("a.pdf", Some("1"), "profit margins widened", 0.7),
            cand("b.pdf", Some("3"), "margins narrowed slightly", 0.72),
            cand("c.pdf", Some("9"), "headcount stayed flat", 0.65),
        ];
        let answer = "Margins widened as profit rose";
        let first = selector.select_sources(answer, &candidates, 3);
        for _ in 0..5 {
            assert_eq!(selector.select_sources(answer, &candidates, 3), first);
        }
    }

    #[test]
    fn multiple_sources_dedupe_and_require_alignment() {
        let selector = SourceSelector::default();
        let candidates = vec![
            cand("a.pdf", Some("1"), "profit margins widened", 0.7),
            cand("a.pdf", Some("2"), "margins were discussed", 0.69),
            cand("b.pdf", Some("3"), "profit guidance", 0.6),
            cand("c.pdf", Some("4"), "office relocation", 0.99),
        ];
        // window = c (0.99), a p1 (0.7), a p2 (0.69)
        let picked = selector.select_sources("Profit margins widened", &candidates, 3);
        let files: Vec<_> = picked.iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(files, vec!["a.pdf"]);
        assert_eq!(picked[0].page.as_deref(), Some("1"));

        let wide = SourceSelector::from_config(&CitationConfig {
            top_n: 4,
            ..CitationConfig::default()
        });
        let picked = wide.select_sources("Profit margins widened", &candidates, 3);
        let files: Vec<_> = picked.iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(files, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn short_words_are_ignored() {
        let words = answer_words("The cat sat on a very long mat, Revenue!", 4);
        assert!(words.contains("very"));
        assert!(words.contains("revenue"));
        assert!(!words.contains("cat"));
        assert!(!words.contains("the"));
    }

    #[test]
    fn excerpt_prefers_sentence_boundary() {
        let sentence = format!("{}.", "a".repeat(349));
        let text = format!("{} {}", sentence, "b".repeat(200));
        let cut = excerpt(&text, 400, 0.7);
        assert_eq!(cut, sentence);
    }

    #[test]
    fn excerpt_hard_truncates_when_boundary_is_early() {
        let text = format!("Short. {}", "c".repeat(500));
        let cut = excerpt(&text, 400, 0.7);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 403);
    }

    #[test]
    fn excerpt_keeps_short_text_and_counts_chars() {
        assert_eq!(excerpt("  tiny text.  ", 400, 0.7), "tiny text.");
        let text = "đ".repeat(450);
        let cut = excerpt(&text, 400, 0.7);
        assert_eq!(cut.chars().count(), 403);
    }
}
