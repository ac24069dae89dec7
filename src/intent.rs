//! Intent routing for session turns.
//!
//! Every user turn is classified before retrieval: does answering it need
//! fresh code context, or is it about the conversation itself? Conversational
//! turns skip the vector index entirely, which is what lets questions like
//! "what files did you just cite?" be answered from memory alone.
//!
//! Classification is a constrained one-word completion. Malformed output is
//! treated as [`Intent::CodeSearch`]; a failed completion surfaces as a
//! [`SessionError::ClassificationFailure`] so the caller can decide the
//! fallback (the session orchestrator also defaults to a code search — the
//! failure mode is a wasted retrieval, never a missing one).

use crate::error::SessionError;
use crate::llm::Generator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The turn needs fresh code context from the index.
    CodeSearch,
    /// The turn is about the conversation; answer from memory only.
    Conversational,
}

const CLASSIFY_PROMPT: &str = "\
Classify the user's message. Reply with exactly one word.

Reply \"search\" if answering requires looking at the project's source code, \
logs, or configuration (error reports, questions about behavior, requests to \
find or explain code).

Reply \"chat\" if the message is about the conversation itself (what was said, \
what was cited, summaries of previous answers) or needs no project context.

Message: ";

/// Classify a user message.
///
/// Unexpected one-word output is treated as [`Intent::CodeSearch`]; a failed
/// completion is reported as a [`SessionError::ClassificationFailure`].
pub async fn classify(
    generator: &dyn Generator,
    message: &str,
) -> Result<Intent, SessionError> {
    let prompt = format!("{}{}", CLASSIFY_PROMPT, message);
    match generator.complete(&prompt).await {
        Ok(reply) => Ok(parse_intent(&reply)),
        Err(e) => Err(SessionError::ClassificationFailure(e.to_string())),
    }
}

fn parse_intent(reply: &str) -> Intent {
    let word = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
        .to_ascii_lowercase();
    match word.as_str() {
        "chat" => Intent::Conversational,
        "search" => Intent::CodeSearch,
        _ => Intent::CodeSearch,
    }
}
