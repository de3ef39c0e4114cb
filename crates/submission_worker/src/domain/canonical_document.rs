use chrono::{DateTime, Utc};
use common::{DomainError, DomainResult, Submission};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalApplicant<'a> {
    national_id: &'a str,
}

/// The domain document filed with the archival system.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalDocument<'a> {
    submission_id: &'a str,
    received_at: DateTime<Utc>,
    language: &'a str,
    applicant: CanonicalApplicant<'a>,
    form: &'a serde_json::Value,
}

impl<'a> From<&'a Submission> for CanonicalDocument<'a> {
    fn from(submission: &'a Submission) -> Self {
        Self {
            submission_id: &submission.submission_id,
            received_at: submission.received_at,
            language: &submission.language,
            applicant: CanonicalApplicant {
                national_id: &submission.applicant.national_id,
            },
            form: &submission.form,
        }
    }
}

/// Canonical document as JSON value, as sent to the archival gateway.
pub fn canonical_document(submission: &Submission) -> DomainResult<serde_json::Value> {
    serde_json::to_value(CanonicalDocument::from(submission))
        .map_err(|e| DomainError::CanonicalDocumentError(e.to_string()))
}

/// Canonical document as stored bytes.
pub fn canonical_document_bytes(submission: &Submission) -> DomainResult<Vec<u8>> {
    serde_json::to_vec(&CanonicalDocument::from(submission))
        .map_err(|e| DomainError::CanonicalDocumentError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::Applicant;
    use serde_json::json;

    fn submission() -> Submission {
        Submission {
            submission_id: "S1".to_string(),
            received_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            language: "nb".to_string(),
            applicant: Applicant {
                national_id: "01010112345".to_string(),
                first_name: "Kari".to_string(),
                middle_name: None,
                last_name: "Nordmann".to_string(),
                actor_id: "actor-1".to_string(),
            },
            attachment_ids: vec!["att-1".to_string()],
            form: json!({"monthlyIncome": 1200}),
        }
    }

    #[test]
    fn test_canonical_document_shape() {
        let document = canonical_document(&submission()).unwrap();

        assert_eq!(
            document,
            json!({
                "submissionId": "S1",
                "receivedAt": "2024-05-01T10:00:00Z",
                "language": "nb",
                "applicant": {"nationalId": "01010112345"},
                "form": {"monthlyIncome": 1200},
            })
        );
    }

    #[test]
    fn test_stored_bytes_match_filed_document() {
        let submission = submission();

        let bytes = canonical_document_bytes(&submission).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed, canonical_document(&submission).unwrap());
    }
}
