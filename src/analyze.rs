//! One-shot bug analysis.
//!
//! `analyze` runs the enabled evidence tools against a bug description,
//! composes a grounded prompt, and returns the generated diagnosis together
//! with its citations and a confidence score. Tool invocations are bounded
//! by `analysis.max_steps`; the tool order is fixed, code first.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::llm::Generator;
use crate::tools::{execute, AnalysisTool, EvidenceResult, ToolContext};
use crate::vector_store::VectorStore;

/// The result of one analysis run.
#[derive(Debug)]
pub struct AnalysisReport {
    pub answer: String,
    /// Sources behind the answer, code citations first.
    pub citations: Vec<String>,
    pub evidence: Vec<EvidenceResult>,
    /// See [`confidence_score`] for the exact function.
    pub confidence: f32,
    pub steps: usize,
}

const ANALYZE_PREAMBLE: &str = "\
You are a debugging assistant. Diagnose the reported problem using only the \
evidence below. Cite code as path:start-end and logs as path:line. State the \
most likely cause first; if the evidence is inconclusive, say what additional \
evidence would settle it.";

/// Analyze a bug description against the indexed project.
pub async fn analyze(
    query: &str,
    project_root: &Path,
    config: &Config,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
) -> Result<AnalysisReport> {
    let ctx = ToolContext {
        project_root,
        config,
        store,
        embedder,
    };

    let mut evidence: Vec<EvidenceResult> = Vec::new();
    for tool in AnalysisTool::all_enabled(&config.tools) {
        if evidence.len() >= config.analysis.max_steps {
            break;
        }
        evidence.push(execute(tool, query, &ctx).await?);
    }

    let prompt = build_prompt(query, &evidence);
    let answer = generator.complete(&prompt).await?;

    let citations: Vec<String> = evidence
        .iter()
        .flat_map(|r| r.evidence.iter().map(|e| e.source.clone()))
        .collect();
    let confidence = confidence_from_evidence(&evidence);

    Ok(AnalysisReport {
        answer,
        citations,
        confidence,
        steps: evidence.len(),
        evidence,
    })
}

fn build_prompt(query: &str, evidence: &[EvidenceResult]) -> String {
    let mut prompt = String::from(ANALYZE_PREAMBLE);

    for result in evidence {
        if result.evidence.is_empty() {
            continue;
        }
        prompt.push_str(&format!("\n\n## Evidence from {}\n", result.tool.name()));
        for item in &result.evidence {
            prompt.push_str(&format!("\n### {}\n```\n{}\n```\n", item.source, item.snippet));
        }
    }

    prompt.push_str("\n\n## Reported problem\n\n");
    prompt.push_str(query);
    prompt
}

fn confidence_from_evidence(evidence: &[EvidenceResult]) -> f32 {
    let retrieval_scores: Vec<f32> = evidence
        .iter()
        .filter(|r| r.tool == AnalysisTool::CodeSearch)
        .flat_map(|r| r.evidence.iter().map(|e| e.score))
        .collect();
    let with_evidence = evidence.iter().filter(|r| !r.evidence.is_empty()).count();
    confidence_score(&retrieval_scores, with_evidence, evidence.len())
}

/// Confidence in a diagnosis, in `[0, 1]`.
///
/// Defined as `0.7 * mean(retrieval similarity) + 0.3 * corroboration`,
/// where corroboration is the share of executed tools that returned any
/// evidence. Each similarity is clamped to `[0, 1]` first; no retrieval
/// scores means that term is 0. The function is pure, so a reported
/// confidence can always be recomputed from the evidence it shipped with.
pub fn confidence_score(retrieval_scores: &[f32], tools_with_evidence: usize, tools_run: usize) -> f32 {
    let mean = if retrieval_scores.is_empty() {
        0.0
    } else {
        retrieval_scores
            .iter()
            .map(|s| s.clamp(0.0, 1.0))
            .sum::<f32>()
            / retrieval_scores.len() as f32
    };

    let corroboration = if tools_run == 0 {
        0.0
    } else {
        tools_with_evidence as f32 / tools_run as f32
    };

    (0.7 * mean + 0.3 * corroboration).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Evidence;

    #[test]
    fn no_evidence_means_zero_confidence() {
        assert_eq!(confidence_score(&[], 0, 3), 0.0);
        assert_eq!(confidence_score(&[], 0, 0), 0.0);
    }

    #[test]
    fn full_corroboration_and_perfect_scores_cap_at_one() {
        let score = confidence_score(&[1.0, 1.0], 3, 3);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn negative_similarities_clamp_to_zero() {
        let score = confidence_score(&[-0.5, -0.9], 1, 2);
        assert!((score - 0.15).abs() < 1e-6);
    }

    #[test]
    fn mixed_evidence_weights_retrieval_heavier() {
        // mean 0.8, corroboration 1/2: 0.7*0.8 + 0.3*0.5 = 0.71
        let score = confidence_score(&[0.8], 1, 2);
        assert!((score - 0.71).abs() < 1e-6);
    }

    #[test]
    fn prompt_omits_empty_tool_sections() {
        let evidence = vec![
            EvidenceResult {
                tool: AnalysisTool::CodeSearch,
                evidence: vec![Evidence {
                    source: "src/auth.rs:10-20".into(),
                    snippet: "fn verify() {}".into(),
                    score: 0.9,
                }],
            },
            EvidenceResult {
                tool: AnalysisTool::LogSearch,
                evidence: Vec::new(),
            },
        ];
        let prompt = build_prompt("login fails", &evidence);
        assert!(prompt.contains("Evidence from code_search"));
        assert!(!prompt.contains("Evidence from log_search"));
        assert!(prompt.contains("src/auth.rs:10-20"));
        assert!(prompt.ends_with("login fails"));
    }
}
