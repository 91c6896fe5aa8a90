// src/chunker.rs
// Semantic chunking: one LLM call per window, strict-JSON parsing with a
// tolerant fallback, and skip-on-failure at window granularity.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{LlmError, LlmProvider};

const SYSTEM_INSTRUCTION: &str = "You are a document analysis engine. \
Respond with strict JSON only: no comments, no markdown fences, no prose \
before or after the JSON.";

/// One object from a window's LLM response, after schema validation.
/// Field presence and types are enforced by deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkCandidate {
    pub section_title: String,
    pub content: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub section_level: i64,
    pub start_char: i64,
    pub end_char: i64,
}

/// A chunk after re-indexing, ready for embedding and persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticChunk {
    pub chunk_index: usize,
    pub section_title: String,
    pub content: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub section_level: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub tokens: i64,
    pub page_number: Option<i64>,
}

/// ceil(byte length / 4), the persisted `tokens` value.
pub fn token_estimate(content: &str) -> i64 {
    (content.len() as i64 + 3) / 4
}

fn array_re() -> &'static Regex {
    static ARRAY_RE: OnceLock<Regex> = OnceLock::new();
    // Greedy: first '[' through last ']'.
    ARRAY_RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"))
}

fn build_prompt(window: &str) -> String {
    format!(
        "Partition the following document text into semantically coherent chunks.\n\
         Return ONLY a JSON array of objects, each with exactly these fields:\n\
         - \"section_title\": string\n\
         - \"content\": string (the chunk text, taken verbatim from the input)\n\
         - \"summary\": string (one or two sentences)\n\
         - \"keywords\": array of strings\n\
         - \"section_level\": number (1 = top-level section)\n\
         - \"start_char\": number (offset of the chunk within this text)\n\
         - \"end_char\": number (exclusive end offset, greater than start_char)\n\n\
         Text:\n{window}"
    )
}

fn validate(candidates: Vec<ChunkCandidate>) -> Result<Vec<ChunkCandidate>, String> {
    for (i, c) in candidates.iter().enumerate() {
        if c.content.is_empty() {
            return Err(format!("chunk {} has empty content", i));
        }
        if c.start_char >= c.end_char {
            return Err(format!(
                "chunk {} has start_char {} >= end_char {}",
                i, c.start_char, c.end_char
            ));
        }
    }
    Ok(candidates)
}

/// Parses one window's raw LLM output into validated candidates.
///
/// Tries, in order: the whole response as a JSON array (constrained-output
/// happy path), a JSON object wrapping the array in a `chunks` field
/// (json_object mode), and finally the greedy first-`[`-to-last-`]`
/// substring. Any failure is reported as a reason string so the caller can
/// log and skip the window.
pub fn parse_candidates(raw: &str) -> Result<Vec<ChunkCandidate>, String> {
    let trimmed = raw.trim();

    if let Ok(parsed) = serde_json::from_str::<Vec<ChunkCandidate>>(trimmed) {
        return validate(parsed);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(chunks) = value.get("chunks") {
            if let Ok(parsed) = serde_json::from_value::<Vec<ChunkCandidate>>(chunks.clone()) {
                return validate(parsed);
            }
        }
    }

    let m = array_re()
        .find(trimmed)
        .ok_or_else(|| "no JSON array in response".to_string())?;
    let parsed: Vec<ChunkCandidate> = serde_json::from_str(m.as_str())
        .map_err(|e| format!("JSON parse failed: {}", e))?;
    validate(parsed)
}

/// Re-indexes surviving candidates gaplessly from 0 and computes the
/// derived fields.
pub fn finalize(candidates: Vec<ChunkCandidate>) -> Vec<SemanticChunk> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(idx, c)| SemanticChunk {
            chunk_index: idx,
            tokens: token_estimate(&c.content),
            page_number: None, // extractor does not track pages
            section_title: c.section_title,
            content: c.content,
            summary: c.summary,
            keywords: c.keywords,
            section_level: c.section_level,
            start_char: c.start_char,
            end_char: c.end_char,
        })
        .collect()
}

/// Drives one LLM call per window, in order, collecting validated chunks.
pub struct SemanticChunker {
    llm: Arc<dyn LlmProvider>,
}

impl SemanticChunker {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Chunks every window sequentially. A window whose output cannot be
    /// parsed or validated contributes zero chunks and the run continues;
    /// an LLM transport failure aborts the document.
    pub async fn chunk_windows(&self, windows: &[String]) -> Result<Vec<SemanticChunk>, LlmError> {
        let mut candidates = Vec::new();

        for (idx, window) in windows.iter().enumerate() {
            let prompt = build_prompt(window);
            let raw = self.llm.complete(SYSTEM_INSTRUCTION, &prompt).await?;

            match parse_candidates(&raw) {
                Ok(mut parsed) => {
                    debug!(window = idx, chunks = parsed.len(), "Window chunked");
                    candidates.append(&mut parsed);
                }
                Err(reason) => {
                    warn!(window = idx, %reason, "Skipping window with malformed LLM output");
                }
            }
        }

        Ok(finalize(candidates))
    }
}
