//! Splitting documents into size-bounded, overlapping spans.
//!
//! `semchunk-rs` finds semantic boundaries under a token budget. Each piece is then located in
//! the source text so every [`TextSpan`] knows the byte offset it starts at. Overlap is taken
//! from the source itself: a span is widened backwards over whole words of its predecessor,
//! up to `overlap` tokens, without exceeding the chunk budget.

use crate::config::{Config, EmbeddingProvider};
use semchunk_rs::Chunker;
use std::ops::Range;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    p50k_edit, r50k_base,
};

use super::types::ChunkingError;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;
const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// Known Ollama embedding models and their context windows, matched by substring.
const OLLAMA_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("nomic-embed-text", 8192),
    ("mxbai-embed-large", 512),
    ("all-minilm", 512),
    ("e5-large", 4096),
];

/// A piece of a document ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Byte offset of the span's first character in the source text.
    pub offset: usize,
    /// Span text.
    pub text: String,
}

/// Splitting parameters resolved once per pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingPolicy {
    /// Hard upper bound on tokens per chunk.
    pub chunk_size: usize,
    /// Tokens shared between adjacent chunks.
    pub overlap: usize,
    /// Provider whose tokenizer counts tokens.
    pub provider: EmbeddingProvider,
    /// Embedding model name.
    pub model: String,
}

impl ChunkingPolicy {
    /// Resolve the policy for the configured embedding model.
    ///
    /// `TEXT_SPLITTER_CHUNK_SIZE` wins when set. Otherwise the budget is a quarter of the
    /// model's context window (an eighth with `TEXT_SPLITTER_USE_SAFE_DEFAULTS`), clamped into
    /// `[256, 1024]`.
    pub fn from_config(config: &Config) -> Self {
        let chunk_size = config.text_splitter_chunk_size.map_or_else(
            || {
                automatic_chunk_size(
                    config.embedding_provider,
                    &config.embedding_model,
                    config.text_splitter_use_safe_defaults,
                )
            },
            |explicit| explicit.max(1),
        );
        Self {
            chunk_size,
            overlap: config.text_splitter_chunk_overlap,
            provider: config.embedding_provider,
            model: config.embedding_model.clone(),
        }
    }

    /// Split `text` into spans. Whitespace-only input yields no spans.
    pub fn split(&self, text: &str) -> Result<Vec<TextSpan>, ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let counter = TokenCounter::for_model(self.provider, &self.model)?;
        Ok(split_spans(text, self.chunk_size, self.overlap, &counter))
    }
}

fn automatic_chunk_size(provider: EmbeddingProvider, model: &str, use_safe_defaults: bool) -> usize {
    let divisor = if use_safe_defaults { 8 } else { 4 };
    (context_window(provider, model) / divisor)
        .clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

fn context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::OpenAI
            if model.starts_with("text-embedding-3") || model.starts_with("text-embedding-ada") =>
        {
            8192
        }
        EmbeddingProvider::OpenAI => get_context_size(model),
        EmbeddingProvider::Ollama => {
            let normalized = model.to_lowercase();
            OLLAMA_CONTEXT_WINDOWS
                .iter()
                .find(|(name, _)| normalized.contains(name))
                .map_or(DEFAULT_CONTEXT_WINDOW, |(_, window)| *window)
        }
        EmbeddingProvider::Hashing => DEFAULT_CONTEXT_WINDOW,
    }
}

/// Counts tokens the way the embedding model will see them.
#[derive(Clone)]
enum TokenCounter {
    /// Whitespace-separated words; used by the hashing embedder and unknown Ollama models.
    Whitespace,
    Bpe(Arc<CoreBPE>),
}

impl TokenCounter {
    fn for_model(provider: EmbeddingProvider, model: &str) -> Result<Self, ChunkingError> {
        match provider {
            EmbeddingProvider::Hashing => Ok(Self::Whitespace),
            EmbeddingProvider::OpenAI => Self::bpe(model),
            EmbeddingProvider::Ollama => Self::bpe(model).or_else(|error| {
                tracing::warn!(
                    model,
                    error = %error,
                    "No tokenizer for Ollama model; counting whitespace-separated words"
                );
                Ok(Self::Whitespace)
            }),
        }
    }

    fn bpe(model: &str) -> Result<Self, ChunkingError> {
        let name = match model.trim() {
            "" => "cl100k_base",
            trimmed => trimmed,
        };
        let encoding = get_bpe_from_model(name)
            .or_else(|_| encoding_by_name(name))
            .map_err(|source| ChunkingError::Tokenizer {
                model: name.to_string(),
                source,
            })?;
        Ok(Self::Bpe(Arc::new(encoding)))
    }

    fn count(&self, segment: &str) -> usize {
        match self {
            Self::Whitespace => match segment.split_whitespace().count() {
                0 if !segment.is_empty() => 1,
                words => words,
            },
            Self::Bpe(encoding) => encoding.encode_ordinary(segment).len(),
        }
    }
}

fn encoding_by_name(name: &str) -> anyhow::Result<CoreBPE> {
    match name {
        "o200k_base" => o200k_base(),
        "p50k_base" => p50k_base(),
        "p50k_edit" => p50k_edit(),
        "r50k_base" | "gpt2" => r50k_base(),
        "cl100k_base" => cl100k_base(),
        other => {
            tracing::warn!(model = other, "Unknown tokenizer; counting with cl100k_base");
            cl100k_base()
        }
    }
}

/// Where a splitter piece sits in the source text.
enum Piece {
    Located(Range<usize>),
    /// The splitter rejoined words with a different separator; the text is kept as produced
    /// and takes no part in overlap.
    Rewritten { offset: usize, text: String },
}

fn split_spans(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: &TokenCounter,
) -> Vec<TextSpan> {
    let chunker_counter = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| chunker_counter.count(segment)),
    );
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let mut spans = Vec::new();
    let mut previous: Option<Range<usize>> = None;
    for piece in locate_pieces(text, chunker.chunk(text)) {
        match piece {
            Piece::Located(range) => {
                let start = match &previous {
                    Some(prev) if overlap > 0 => {
                        overlap_start(text, prev, &range, overlap, chunk_size, counter)
                    }
                    _ => range.start,
                };
                spans.push(TextSpan {
                    offset: start,
                    text: text[start..range.end].to_string(),
                });
                previous = Some(range);
            }
            Piece::Rewritten { offset, text: rewritten } => {
                spans.push(TextSpan {
                    offset,
                    text: rewritten,
                });
                previous = None;
            }
        }
    }
    spans
}

fn locate_pieces(text: &str, pieces: Vec<String>) -> Vec<Piece> {
    let mut cursor = 0;
    pieces
        .iter()
        .map(|piece| piece.trim())
        .filter(|piece| !piece.is_empty())
        .map(|piece| match text[cursor..].find(piece) {
            Some(found) => {
                let start = cursor + found;
                cursor = start + piece.len();
                Piece::Located(start..cursor)
            }
            None => {
                tracing::trace!(offset = cursor, "Splitter piece not found verbatim in source");
                Piece::Rewritten {
                    offset: cursor,
                    text: piece.to_string(),
                }
            }
        })
        .collect()
}

/// Earliest word start in `previous` whose tail fits the overlap and keeps the widened span
/// within `chunk_size`. Returns `current.start` when no word fits.
fn overlap_start(
    text: &str,
    previous: &Range<usize>,
    current: &Range<usize>,
    overlap: usize,
    chunk_size: usize,
    counter: &TokenCounter,
) -> usize {
    let mut start = current.start;
    for relative in word_starts(&text[previous.clone()]).into_iter().rev() {
        let candidate = previous.start + relative;
        if counter.count(&text[candidate..previous.end]) > overlap
            || counter.count(&text[candidate..current.end]) > chunk_size
        {
            break;
        }
        start = candidate;
    }
    start
}

fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut after_space = true;
    for (index, ch) in text.char_indices() {
        if ch.is_whitespace() {
            after_space = true;
        } else if after_space {
            starts.push(index);
            after_space = false;
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitespace_policy(chunk_size: usize, overlap: usize) -> ChunkingPolicy {
        ChunkingPolicy {
            chunk_size,
            overlap,
            provider: EmbeddingProvider::Hashing,
            model: "feature-hash".into(),
        }
    }

    fn texts(spans: &[TextSpan]) -> Vec<&str> {
        spans.iter().map(|span| span.text.as_str()).collect()
    }

    #[test]
    fn spans_carry_offsets_into_the_source() {
        let text = "one two three four five";
        let spans = whitespace_policy(2, 0).split(text).unwrap();
        assert_eq!(texts(&spans), vec!["one two", "three four", "five"]);
        assert_eq!(
            spans.iter().map(|span| span.offset).collect::<Vec<_>>(),
            vec![0, 8, 19]
        );
    }

    #[test]
    fn overlap_is_cut_from_the_previous_span() {
        let text = "one two three four five";
        let spans = whitespace_policy(3, 1).split(text).unwrap();
        assert_eq!(texts(&spans), vec!["one two three", "three four five"]);
        assert_eq!(spans[1].offset, 8);
    }

    #[test]
    fn every_span_is_a_slice_of_the_source() {
        let text = "alpha beta gamma delta\n\nepsilon zeta eta theta iota\nkappa lambda mu";
        let spans = whitespace_policy(4, 2).split(text).unwrap();
        assert!(spans.len() > 1);
        for span in &spans {
            assert_eq!(&text[span.offset..span.offset + span.text.len()], span.text);
            assert!(TokenCounter::Whitespace.count(&span.text) <= 4);
        }
        let offsets: Vec<usize> = spans.iter().map(|span| span.offset).collect();
        assert!(offsets.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn bpe_budget_is_respected() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let policy = ChunkingPolicy {
            chunk_size: 5,
            overlap: 0,
            provider: EmbeddingProvider::OpenAI,
            model: "text-embedding-3-small".into(),
        };
        let spans = policy.split(text).expect("chunking succeeded");
        let counter = TokenCounter::bpe("text-embedding-3-small").unwrap();
        for span in &spans {
            assert!(counter.count(&span.text) <= 5);
        }
        let rejoined: Vec<&str> = spans
            .iter()
            .flat_map(|span| span.text.split_whitespace())
            .collect();
        assert_eq!(rejoined, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = whitespace_policy(0, 0).split("hello").unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn whitespace_input_yields_no_spans() {
        assert!(whitespace_policy(8, 0).split(" \n\t").unwrap().is_empty());
    }

    #[test]
    fn splitting_is_deterministic() {
        let policy = whitespace_policy(4, 1);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        assert_eq!(policy.split(text).unwrap(), policy.split(text).unwrap());
    }

    #[test]
    fn automatic_size_follows_the_context_window() {
        assert_eq!(
            automatic_chunk_size(EmbeddingProvider::OpenAI, "text-embedding-3-small", false),
            1024
        );
        assert_eq!(
            automatic_chunk_size(EmbeddingProvider::Ollama, "mxbai-embed-large", false),
            256
        );
        assert_eq!(
            automatic_chunk_size(EmbeddingProvider::Ollama, "custom-model", true),
            512
        );
    }
}
