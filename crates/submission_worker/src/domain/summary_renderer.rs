use bytes::Bytes;
use common::{DomainError, DomainResult, Submission};
use std::fmt::{self, Write};

pub const SUMMARY_TITLE: &str = "Application for benefit payment";
pub const SUMMARY_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub content: Bytes,
    pub content_type: String,
}

/// Renders the human-readable summary stored next to the canonical JSON.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SummaryRenderer: Send + Sync {
    fn render(&self, submission: &Submission) -> DomainResult<RenderedDocument>;
}

/// Deterministic plain-text summary.
#[derive(Debug, Default, Clone)]
pub struct TextSummaryRenderer;

impl TextSummaryRenderer {
    pub fn new() -> Self {
        Self
    }
}

fn answer(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn write_summary<W: Write>(out: &mut W, submission: &Submission) -> fmt::Result {
    writeln!(out, "{SUMMARY_TITLE}")?;
    writeln!(out)?;
    writeln!(out, "Submission: {}", submission.submission_id)?;
    writeln!(out, "Received: {}", submission.received_at.to_rfc3339())?;
    writeln!(out, "Applicant: {}", submission.applicant.full_name())?;
    writeln!(out, "Language: {}", submission.language)?;
    writeln!(out, "Attachments: {}", submission.attachment_ids.len())?;

    match &submission.form {
        serde_json::Value::Object(fields) if !fields.is_empty() => {
            writeln!(out)?;
            writeln!(out, "Answers:")?;
            for (question, value) in fields {
                writeln!(out, "  {question}: {}", answer(value))?;
            }
        }
        serde_json::Value::Object(_) | serde_json::Value::Null => {}
        other => {
            writeln!(out)?;
            writeln!(out, "Answers: {other}")?;
        }
    }
    Ok(())
}

impl SummaryRenderer for TextSummaryRenderer {
    fn render(&self, submission: &Submission) -> DomainResult<RenderedDocument> {
        let mut text = String::new();
        write_summary(&mut text, submission)
            .map_err(|e| DomainError::RenderingError(format!("failed to write summary: {e}")))?;

        Ok(RenderedDocument {
            content: Bytes::from(text),
            content_type: SUMMARY_CONTENT_TYPE.to_string(),
        })
    }
}
