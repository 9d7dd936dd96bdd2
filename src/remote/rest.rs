use super::{Filter, Query, RemoteError, RemoteTable, Result, Subscription};
use crate::models::{Report, ReportDraft};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Hosted table over its PostgREST endpoint. Has no push channel.
#[derive(Debug, Clone)]
pub struct RestTable {
    client: reqwest::Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
}

impl RestTable {
    pub fn new(base_url: &str, table: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let apikey = HeaderValue::from_str(key)
                .map_err(|_| RemoteError::api(0, "invalid API key format"))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| RemoteError::api(0, "invalid API key format"))?;
            headers.insert("apikey", apikey);
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(headers)
    }

    async fn parse_response(response: reqwest::Response) -> Result<Vec<Report>> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
            debug!("remote table error ({status}): {preview}");
            return Err(RemoteError::api(status.as_u16(), preview));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Translates a query into PostgREST query-string parameters.
pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        ("order".to_string(), "created_at.desc".to_string()),
        ("limit".to_string(), query.limit.to_string()),
    ];

    for filter in &query.filters {
        let param = match filter {
            Filter::Eq(column, value) => (column.as_str().to_string(), format!("eq.{value}")),
            Filter::IsNull(column) => (column.as_str().to_string(), "is.null".to_string()),
            Filter::CreatedSince(since) => (
                "created_at".to_string(),
                format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ),
        };
        params.push(param);
    }
    params
}

#[async_trait]
impl RemoteTable for RestTable {
    async fn insert(&self, draft: &ReportDraft) -> Result<Report> {
        let response = self
            .client
            .post(self.endpoint())
            .headers(self.headers()?)
            .header("Prefer", "return=representation")
            .json(&[draft])
            .send()
            .await?;

        Self::parse_response(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::api(200, "insert returned no representation"))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Report>> {
        let response = self
            .client
            .get(self.endpoint())
            .headers(self.headers()?)
            .query(&query_params(query))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn subscribe(&self, _table: &str) -> Result<Subscription> {
        Err(RemoteError::Unsupported("push channel over REST"))
    }
}
