//! Context composition for generation prompts.
//!
//! Assembles the prompt for a turn from three sources with a strict
//! precedence: fresh code retrieval first, then the conversation buffer,
//! then semantic recall. Fresh code hits are never truncated or dropped to
//! fit the budget; when the total exceeds it, recalled turns go first
//! (lowest similarity first), then the oldest buffer turns.
//!
//! Every code hit carries a `path:start-end` citation that survives into
//! the output, so generated claims stay checkable against the source.

use std::collections::HashSet;

use crate::memory::{ConversationBuffer, ConversationTurn, RecalledTurn};
use crate::tools::CodeHit;

/// A fully assembled prompt plus the citations behind it.
#[derive(Debug, Clone)]
pub struct ComposedContext {
    pub prompt: String,
    /// `path:start-end` for each code hit included, in rank order.
    pub citations: Vec<String>,
    /// Chunk ids behind the citations; recorded on the completed turn.
    pub cited_chunk_ids: Vec<String>,
}

const PREAMBLE: &str = "\
You are a debugging assistant. Ground every claim in the evidence below and \
cite code as path:start-end. If the evidence does not support an answer, say \
what is missing instead of guessing.";

/// Compose the prompt for one turn.
///
/// `code_hits` must be in descending score order, as the retriever returns
/// them. Overlapping hits from the same file are collapsed to the
/// higher-ranked one.
pub fn compose(
    query: &str,
    code_hits: &[CodeHit],
    buffer: &ConversationBuffer,
    recalled: &[RecalledTurn],
    budget_chars: usize,
) -> ComposedContext {
    let code_hits = dedup_code_hits(code_hits);

    let code_section: Vec<String> = code_hits
        .iter()
        .map(|hit| format!("### {}\n```\n{}\n```", hit.citation(), hit.text))
        .collect();
    let code_cost: usize = code_section.iter().map(|s| s.len() + 1).sum();

    // Everything but the code competes for what the code leaves over.
    let fixed_cost = PREAMBLE.len() + query.len() + 200;
    let mut remaining = budget_chars.saturating_sub(code_cost + fixed_cost);

    // Buffer turns are never shown twice: recall that duplicates a buffered
    // turn is dropped outright.
    let buffered_ids: HashSet<&str> = buffer.turns().map(|t| t.turn_id.as_str()).collect();

    // Buffer before recall: funded newest-first, rendered oldest-first, so
    // when space runs out the oldest turns drop and recall drops before any
    // of them.
    let mut kept_buffer: Vec<&ConversationTurn> = Vec::new();
    for turn in buffer.turns().collect::<Vec<_>>().into_iter().rev() {
        let cost = turn_line(turn).len() + 1;
        if cost <= remaining {
            remaining -= cost;
            kept_buffer.push(turn);
        } else {
            break;
        }
    }
    kept_buffer.reverse();

    // Recall fills what the buffer leaves, best-first.
    let mut kept_recall: Vec<&ConversationTurn> = Vec::new();
    let mut sorted_recall: Vec<&RecalledTurn> = recalled
        .iter()
        .filter(|r| !buffered_ids.contains(r.turn.turn_id.as_str()))
        .collect();
    sorted_recall.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for recall in sorted_recall {
        let cost = turn_line(&recall.turn).len() + 1;
        if cost <= remaining {
            remaining -= cost;
            kept_recall.push(&recall.turn);
        }
    }

    let mut prompt = String::from(PREAMBLE);

    if !code_section.is_empty() {
        prompt.push_str("\n\n## Relevant code\n\n");
        prompt.push_str(&code_section.join("\n\n"));
    }

    if !kept_recall.is_empty() {
        prompt.push_str("\n\n## Earlier in this investigation\n\n");
        for turn in &kept_recall {
            prompt.push_str(&turn_line(turn));
            prompt.push('\n');
        }
    }

    if !kept_buffer.is_empty() {
        prompt.push_str("\n\n## Recent conversation\n\n");
        for turn in &kept_buffer {
            prompt.push_str(&turn_line(turn));
            prompt.push('\n');
        }
    }

    prompt.push_str("\n\n## Question\n\n");
    prompt.push_str(query);

    ComposedContext {
        prompt,
        citations: code_hits.iter().map(|h| h.citation()).collect(),
        cited_chunk_ids: code_hits.iter().map(|h| h.chunk_id.clone()).collect(),
    }
}

fn turn_line(turn: &ConversationTurn) -> String {
    format!("{}: {}", turn.role, turn.text)
}

/// Collapse hits whose line ranges overlap within the same file, keeping
/// the higher-ranked of each overlapping pair.
fn dedup_code_hits(hits: &[CodeHit]) -> Vec<CodeHit> {
    let mut kept: Vec<CodeHit> = Vec::new();
    for hit in hits {
        let overlaps = kept.iter().any(|k| {
            k.path == hit.path && k.start_line <= hit.end_line && hit.start_line <= k.end_line
        });
        if !overlaps {
            kept.push(hit.clone());
        }
    }
    kept
}
