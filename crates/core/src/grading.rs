//! Model-judged regression checks for generated answers.
//!
//! The judge is itself a language model, so a verdict is best-effort rather
//! than an exact oracle. Judge failures surface as errors and must be treated
//! as failed checks by callers.

use crate::llm::LanguageModel;
use crate::query::RagPipeline;
use crate::{RagAnswer, RagError};
use tracing::info;

pub fn judge_prompt(expected: &str, actual: &str) -> String {
    format!(
        "\nExpected Response: {expected}\nActual Response: {actual}\n---\n(Answer with 'true' or 'false') Does the actual response match the expected response? \n"
    )
}

/// Passes only when the first word of the first non-blank line is `true`,
/// ignoring case and surrounding punctuation.
pub fn parse_verdict(response: &str) -> bool {
    response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| {
            line.split(|c: char| !c.is_alphanumeric())
                .find(|word| !word.is_empty())
        })
        .is_some_and(|word| word.eq_ignore_ascii_case("true"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub judge_response: String,
}

pub async fn grade(judge: &dyn LanguageModel, expected: &str, actual: &str) -> Result<Verdict, RagError> {
    let judge_response = judge.generate(&judge_prompt(expected, actual)).await?;
    let passed = parse_verdict(&judge_response);
    info!(passed, judge = judge.name(), "graded response");

    Ok(Verdict {
        passed,
        judge_response,
    })
}

#[derive(Debug, Clone)]
pub struct GradedAnswer {
    pub answer: RagAnswer,
    pub verdict: Verdict,
}

pub async fn query_and_validate(
    pipeline: &RagPipeline,
    judge: &dyn LanguageModel,
    question: &str,
    expected: &str,
) -> Result<GradedAnswer, RagError> {
    let answer = pipeline.answer(question).await?;
    let verdict = grade(judge, expected, &answer.answer).await?;
    Ok(GradedAnswer { answer, verdict })
}
