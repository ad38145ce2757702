use crate::error::IngestError;
use crate::models::{ImportResponse, IngestSummary, Notification, NotificationLevel, ResultRow};
use crate::parser::{self, TabularSource};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const NO_INPUT_MESSAGE: &str = "Upload a CSV file or paste data";

/// Remote side of a bulk import: scores rows against the answer key.
pub trait ResultSubmitter {
    fn import_results(
        &self,
        test_id: &str,
        rows: &[ResultRow],
    ) -> impl Future<Output = anyhow::Result<ImportResponse>> + Send;
}

/// What the upload form collected from the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub test_id: String,
    pub file: Option<PathBuf>,
    pub pasted: String,
}

/// Pick the input to parse. A chosen file wins over pasted text.
pub fn resolve_source(file: Option<&Path>, pasted: &str) -> Result<TabularSource, IngestError> {
    match file {
        Some(path) => Ok(TabularSource::File(path.to_path_buf())),
        None if !pasted.trim().is_empty() => Ok(TabularSource::Text(pasted.to_string())),
        None => Err(IngestError::Validation(NO_INPUT_MESSAGE.to_string())),
    }
}

/// Send rows for scoring and check the response accounts for every row.
pub async fn submit_for_verification<S: ResultSubmitter>(
    submitter: &S,
    test_id: &str,
    rows: &[ResultRow],
) -> Result<ImportResponse, IngestError> {
    let response = submitter
        .import_results(test_id, rows)
        .await
        .map_err(|e| IngestError::Submission(format!("{:#}", e)))?;

    if response.total != rows.len() {
        return Err(IngestError::Submission(format!(
            "server counted {} rows but {} were sent",
            response.total,
            rows.len()
        )));
    }
    if response.verified + response.rejected != response.total {
        return Err(IngestError::Submission(format!(
            "server reported {} verified and {} rejected out of {}",
            response.verified, response.rejected, response.total
        )));
    }

    Ok(response)
}

/// Validate, parse and submit one upload.
pub async fn upload_results<S: ResultSubmitter>(
    submitter: &S,
    request: &UploadRequest,
) -> Result<IngestSummary, IngestError> {
    // Missing input is reported before anything else
    let source = resolve_source(request.file.as_deref(), &request.pasted)?;

    let test_id = request.test_id.trim();
    if test_id.is_empty() {
        return Err(IngestError::Validation(
            "Select a test before uploading results".to_string(),
        ));
    }

    let table = parser::parse_tabular_input(&source)?;
    let identified = table.split_identified();

    if identified.rows.is_empty() {
        return Err(IngestError::Validation(
            "No rows with a roll number or student ID were found".to_string(),
        ));
    }
    if !identified.skipped.is_empty() {
        warn!(
            test_id,
            skipped = identified.skipped.len(),
            "rows without a student identity were not sent"
        );
    }

    info!(test_id, rows = identified.rows.len(), "submitting results for verification");
    let response = submit_for_verification(submitter, test_id, &identified.rows).await?;
    info!(
        test_id,
        verified = response.verified,
        rejected = response.rejected,
        "results imported"
    );

    Ok(IngestSummary {
        test_id: test_id.to_string(),
        submitted: identified.rows.len(),
        skipped: identified.skipped,
        response,
    })
}

/// Turn an upload outcome into the single notification the user sees.
pub fn notify(outcome: &Result<IngestSummary, IngestError>) -> Notification {
    match outcome {
        Ok(summary) => {
            let response = &summary.response;
            let mut details: Vec<String> =
                response.rejections.iter().map(ToString::to_string).collect();
            details.extend(summary.skipped.iter().map(|s| format!("{} (not sent)", s)));

            let headline = if response.rejected > 0 {
                format!(
                    "{} of {} rows rejected, {} verified",
                    response.rejected, response.total, response.verified
                )
            } else {
                format!("All {} rows verified", response.total)
            };
            let message = if response.message.is_empty() {
                headline
            } else {
                format!("{}. {}", headline, response.message)
            };

            let level = if summary.has_problems() {
                NotificationLevel::Warning
            } else {
                NotificationLevel::Success
            };
            Notification::new(level, message).with_details(details)
        }
        Err(e) => Notification::new(NotificationLevel::Error, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::models::RowRejection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Accepts everything except the roll numbers listed in `reject`.
    struct FakeScorer {
        calls: AtomicUsize,
        reject: Vec<&'static str>,
        fail: bool,
        last_rows: Mutex<Vec<ResultRow>>,
    }

    impl FakeScorer {
        fn new(reject: Vec<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reject,
                fail: false,
                last_rows: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ResultSubmitter for FakeScorer {
        async fn import_results(
            &self,
            _test_id: &str,
            rows: &[ResultRow],
        ) -> anyhow::Result<ImportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_rows.lock().unwrap() = rows.to_vec();
            if self.fail {
                anyhow::bail!("connection refused");
            }

            let rejections: Vec<RowRejection> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| {
                    row.get("Roll")
                        .is_some_and(|roll| self.reject.iter().any(|r| *r == roll))
                })
                .map(|(i, row)| RowRejection {
                    row: Some(i + 1),
                    student: row.get("Roll").map(str::to_string),
                    reason: "Unknown roll number".to_string(),
                })
                .collect();

            Ok(ImportResponse {
                total: rows.len(),
                verified: rows.len() - rejections.len(),
                rejected: rejections.len(),
                message: String::new(),
                rejections,
            })
        }
    }

    /// Always returns a fixed, possibly inconsistent, response.
    struct CannedScorer(ImportResponse);

    impl ResultSubmitter for CannedScorer {
        async fn import_results(
            &self,
            _test_id: &str,
            _rows: &[ResultRow],
        ) -> anyhow::Result<ImportResponse> {
            Ok(self.0.clone())
        }
    }

    fn request(pasted: &str) -> UploadRequest {
        UploadRequest {
            test_id: "t-42".to_string(),
            file: None,
            pasted: pasted.to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_input_never_reaches_parser_or_network() {
        let scorer = FakeScorer::new(Vec::new());

        for pasted in ["", "   \n\t  "] {
            let outcome = upload_results(&scorer, &request(pasted)).await;
            assert!(
                matches!(&outcome, Err(IngestError::Validation(m)) if m == NO_INPUT_MESSAGE)
            );

            let notification = notify(&outcome);
            assert_eq!(notification.level, NotificationLevel::Error);
            assert_eq!(notification.message, NO_INPUT_MESSAGE);
        }
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_input_wins_over_missing_test() {
        let scorer = FakeScorer::new(Vec::new());
        let req = UploadRequest {
            test_id: " ".to_string(),
            ..UploadRequest::default()
        };

        let notification = notify(&upload_results(&scorer, &req).await);
        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(notification.message, NO_INPUT_MESSAGE);
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_upload_accounts_for_every_row() {
        let scorer = FakeScorer::new(Vec::new());
        let pasted = "Roll\tName\tScore\n101\tAsha\t87\n102\tKabir\t64\n103\tMeera\t91\n";

        let summary = upload_results(&scorer, &request(pasted)).await.unwrap();
        let response = &summary.response;
        assert_eq!(response.total, 3);
        assert_eq!(response.verified + response.rejected, response.total);
        assert_eq!(summary.submitted, response.total);
        assert_eq!(scorer.calls(), 1);

        let sent = scorer.last_rows.lock().unwrap();
        assert_eq!(sent[2].get("Name"), Some("Meera"));

        let notification = notify(&Ok(summary.clone()));
        assert_eq!(notification.level, NotificationLevel::Success);
        assert_eq!(notification.message, "All 3 rows verified");
    }

    #[tokio::test]
    async fn test_rejections_surface_as_warning() {
        let scorer = FakeScorer::new(vec!["102"]);
        let pasted = "Roll,Score\n101,87\n102,64\n,50\n";

        let outcome = upload_results(&scorer, &request(pasted)).await;
        let summary = outcome.as_ref().unwrap();
        assert_eq!(summary.response.rejected, 1);
        assert_eq!(summary.skipped.len(), 1);

        let notification = notify(&outcome);
        assert_eq!(notification.level, NotificationLevel::Warning);
        assert_eq!(notification.message, "1 of 2 rows rejected, 1 verified");
        assert_eq!(
            notification.details,
            vec![
                "Row 2 (102): Unknown roll number".to_string(),
                "Line 4: missing Roll (not sent)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_parse_error_stops_before_network() {
        let scorer = FakeScorer::new(Vec::new());

        let outcome = upload_results(&scorer, &request("Roll,Score\n")).await;
        assert!(matches!(outcome, Err(IngestError::Parse(ParseError::NoDataRows))));
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_rows_without_identity_are_not_sent() {
        let scorer = FakeScorer::new(Vec::new());

        let outcome = upload_results(&scorer, &request("Name,Score\nAsha,87\n")).await;
        assert!(matches!(outcome, Err(IngestError::Validation(_))));
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_test_id_is_rejected() {
        let scorer = FakeScorer::new(Vec::new());
        let mut req = request("Roll\n1\n");
        req.test_id = "  ".to_string();

        assert!(matches!(
            upload_results(&scorer, &req).await,
            Err(IngestError::Validation(_))
        ));
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_is_a_submission_error() {
        let scorer = FakeScorer::failing();

        let outcome = upload_results(&scorer, &request("Roll\n101\n")).await;
        match &outcome {
            Err(IngestError::Submission(message)) => assert!(message.contains("connection refused")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(scorer.calls(), 1);
        assert_eq!(notify(&outcome).level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn test_inconsistent_response_is_refused() {
        let rows = vec![ResultRow::default(), ResultRow::default()];

        let short = CannedScorer(ImportResponse {
            total: 1,
            verified: 1,
            rejected: 0,
            message: String::new(),
            rejections: Vec::new(),
        });
        assert!(matches!(
            submit_for_verification(&short, "t", &rows).await,
            Err(IngestError::Submission(_))
        ));

        let lopsided = CannedScorer(ImportResponse {
            total: 2,
            verified: 2,
            rejected: 1,
            message: String::new(),
            rejections: Vec::new(),
        });
        assert!(matches!(
            submit_for_verification(&lopsided, "t", &rows).await,
            Err(IngestError::Submission(_))
        ));
    }

    #[test]
    fn test_file_wins_over_pasted_text() {
        let source = resolve_source(Some(Path::new("results.csv")), "Roll\n1\n").unwrap();
        assert_eq!(source, TabularSource::File(PathBuf::from("results.csv")));

        let source = resolve_source(None, "Roll\n1\n").unwrap();
        assert_eq!(source, TabularSource::Text("Roll\n1\n".to_string()));
    }
}
