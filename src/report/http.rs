use async_trait::async_trait;
use anyhow::{Result, anyhow};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use super::{parse_response, ReportBackend, ReportRequest, ReportResponse};

/// Posts report requests to the external report service.
pub struct HttpReportClient {
    base_url: String,
    client: Client,
}

impl HttpReportClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("Report service URL is empty or missing!"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Shiftboard/1.0"));

        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| anyhow!("Report API key contains invalid header characters"))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn url_for(&self, request: &ReportRequest) -> String {
        format!("{}/{}", self.base_url, request.kind.endpoint())
    }
}

#[async_trait]
impl ReportBackend for HttpReportClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn trigger(&self, request: &ReportRequest) -> Result<ReportResponse> {
        let url = self.url_for(request);
        info!(kind = request.kind.as_str(), site = %request.site_id, start = %request.start_date, end = %request.end_date, "Triggering report");

        let resp = self.client.post(&url).json(request).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Report API Error: {} - Body: {}", status, error_text));
        }

        let text = resp.text().await?;
        debug!(bytes = text.len(), "Report service replied");

        let json: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| anyhow!("Report service returned invalid JSON: {}", e))?
        };

        parse_response(&json)
    }
}
