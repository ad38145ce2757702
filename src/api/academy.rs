use crate::config::Config;
use crate::ingest::ResultSubmitter;
use crate::models::{ImportResponse, ResultRow, StudentFeeRecord};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Some endpoints wrap their payload as `{ "success": true, "data": ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

/// Client for the academy CRM backend. Each instance carries its own token.
#[derive(Clone)]
pub struct AcademyClient {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

/// `base` with `segments` appended, each percent-encoded as a single path segment.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    if let Some(bad) = segments.iter().find(|s| s.is_empty() || **s == "." || **s == "..") {
        anyhow::bail!("`{}` is not a valid identifier", bad);
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("API URL {} cannot have a path", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl AcademyClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(&config.api_base_url)
            .with_context(|| format!("Invalid API URL {}", config.api_base_url))?;
        Ok(Self {
            client,
            base_url,
            token: config.api_token.clone(),
        })
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .context("API token contains characters not allowed in a header")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("academy-desk"));
        Ok(headers)
    }

    async fn read_json<T: DeserializeOwned>(url: &Url, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        // Get the response text for both error and success cases
        let response_text = response.text().await.context("Failed to get response text")?;

        if !status.is_success() {
            anyhow::bail!(
                "API request failed with status {} for URL {}\nResponse body: {}",
                status,
                url,
                response_text
            );
        }

        serde_json::from_str::<Envelope<T>>(&response_text)
            .map(Envelope::into_inner)
            .with_context(|| {
                format!(
                    "Failed to parse JSON response from {}. Response body (first 500 chars): {}",
                    url,
                    &response_text.chars().take(500).collect::<String>()
                )
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T> {
        let url = endpoint(&self.base_url, path)?;
        let response = self
            .client
            .get(url.clone())
            .headers(self.build_headers()?)
            .send()
            .await
            .context(format!("Failed to send request to {}", url))?;

        Self::read_json(&url, response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &[&str], body: &B) -> Result<T> {
        let url = endpoint(&self.base_url, path)?;
        let response = self
            .client
            .post(url.clone())
            .headers(self.build_headers()?)
            .json(body)
            .send()
            .await
            .context(format!("Failed to send request to {}", url))?;

        Self::read_json(&url, response).await
    }

    pub async fn get_student_fees(&self, student_id: &str) -> Result<StudentFeeRecord> {
        let student_id = student_id.trim();
        if student_id.is_empty() {
            anyhow::bail!("Student ID is empty");
        }

        debug!(student_id, "fetching fee record");
        self.get(&["api", "finance", "student", student_id, "fees"])
            .await
            .with_context(|| format!("Failed to load fees for student {}", student_id))
    }
}

impl ResultSubmitter for AcademyClient {
    /// One request, no retry: a failed import is redone by the user as a whole.
    async fn import_results(&self, test_id: &str, rows: &[ResultRow]) -> Result<ImportResponse> {
        debug!(test_id, rows = rows.len(), "posting results import");
        self.post(&["api", "tests", test_id, "results", "import"], rows)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_accepts_wrapped_and_bare() {
        let bare = r#"{"total": 1, "verified": 1, "rejected": 0}"#;
        let wrapped = r#"{"success": true, "data": {"total": 2, "verified": 1, "rejected": 1, "message": "done"}}"#;

        let bare: ImportResponse = serde_json::from_str::<Envelope<ImportResponse>>(bare)
            .unwrap()
            .into_inner();
        assert_eq!(bare.total, 1);

        let wrapped: ImportResponse = serde_json::from_str::<Envelope<ImportResponse>>(wrapped)
            .unwrap()
            .into_inner();
        assert_eq!(wrapped.rejected, 1);
        assert_eq!(wrapped.message, "done");
    }

    #[test]
    fn test_ids_stay_inside_their_path_segment() {
        let base = Url::parse("http://crm.local/").unwrap();

        let url = endpoint(&base, &["api", "finance", "student", "../../tests/x/results/import?", "fees"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://crm.local/api/finance/student/..%2F..%2Ftests%2Fx%2Fresults%2Fimport%3F/fees"
        );
        assert_eq!(url.query(), None);

        let url = endpoint(&base, &["api", "tests", "T/7#a", "results", "import"]).unwrap();
        assert_eq!(url.path(), "/api/tests/T%2F7%23a/results/import");
        assert_eq!(url.fragment(), None);

        assert!(endpoint(&base, &["api", "finance", "student", "..", "fees"]).is_err());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://example.edu/crm").unwrap();
        let url = endpoint(&base, &["api", "tests", "42", "results", "import"]).unwrap();
        assert_eq!(url.as_str(), "https://example.edu/crm/api/tests/42/results/import");
    }
}
