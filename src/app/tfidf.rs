//! Term-frequency / inverse-document-frequency scoring.
//!
//! Map emits one record per distinct word per document, bundling the
//! per-document statistics the reducer needs:
//! `word -> "document,term_count,document_length"`. Reduce sees every
//! document containing a word at once, which is exactly what the IDF
//! component needs.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::KeyValue;

/// Corpus size the IDF term is computed against.
const NUM_DOCS: f64 = 8.0;

pub fn map(filename: &Path, contents: &str) -> Vec<KeyValue> {
    let words: Vec<String> = contents
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect();
    let doc_len = words.len();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in words {
        *counts.entry(word).or_insert(0) += 1;
    }

    let doc = filename
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    counts
        .into_iter()
        .map(|(word, count)| KeyValue {
            value: format!("{doc},{count},{doc_len}"),
            key: word,
        })
        .collect()
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    // One value per document containing the term.
    let idf = (1.0 + NUM_DOCS / (1.0 + values.len() as f64)).log10();

    let mut out = String::from("[");
    for (i, value) in values.iter().enumerate() {
        let mut parts = value.split(',');
        let doc = parts.next().unwrap_or_default();
        let tc: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let dl: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);
        let tf = tc / dl;
        let score = (1e7 * tf * idf).round() as i64;
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{{{doc} {score}}}");
    }
    out.push(']');
    out
}
