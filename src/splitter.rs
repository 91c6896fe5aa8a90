// src/splitter.rs

/// Maximum window length, in chars, sent to the LLM per call.
pub const MAX_WINDOW_CHARS: usize = 12_000;

/// Partitions extracted text into ordered, gapless, non-overlapping windows
/// of at most `max_chars` chars each. Concatenating the returned windows in
/// order reproduces the input exactly. Splits only on char boundaries.
pub fn split_windows(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            windows.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        windows.push(current);
    }

    windows
}
