//! HTTP executor for translated LogsQL queries.
//!
//! [`LogsClient`] POSTs a LogsQL program form-encoded to a VictoriaLogs-style
//! backend (`<endpoint>/select/logsql/query` for rows,
//! `/select/logsql/field_names` for the field listing). The endpoint and
//! bearer token come either from the client configuration or from per-request
//! parameters, never both. Transport failures and non-2xx responses surface
//! as gateway errors (HTTP 502) so callers can distinguish backend trouble
//! from translation problems.

use std::time::Duration;

use sqlogs_result::{Error, Result};

/// Endpoint settings fixed at client construction.
#[derive(Debug, Clone, Default)]
pub struct EndpointConfig {
    pub endpoint: String,
    pub bearer_token: String,
}

/// Per-request overrides and the query time range.
///
/// `start` and `end` are passed through verbatim; the backend accepts both
/// RFC3339 timestamps and relative durations there.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub endpoint: String,
    pub bearer_token: String,
    pub start: String,
    pub end: String,
}

pub struct LogsClient {
    config: EndpointConfig,
    limit: u32,
    client: reqwest::blocking::Client,
}

impl LogsClient {
    pub fn new(config: EndpointConfig, limit: u32) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| Error::Gateway(format!("failed to build HTTP client: {err}")))?;
        Ok(LogsClient {
            config,
            limit,
            client,
        })
    }

    /// Run a LogsQL query and return the raw response body (one JSON object
    /// per line, as produced by the backend).
    pub fn query(&self, logsql: &str, params: &RequestParams) -> Result<String> {
        self.execute("/select/logsql/query", logsql, params)
    }

    /// Fetch the field names matching a LogsQL query.
    pub fn field_names(&self, logsql: &str, params: &RequestParams) -> Result<String> {
        self.execute("/select/logsql/field_names", logsql, params)
    }

    fn execute(&self, path: &str, logsql: &str, params: &RequestParams) -> Result<String> {
        let (endpoint, bearer_token) = resolve_endpoint(&self.config, params)?;
        let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
        let form = build_form(logsql, self.limit, params);

        tracing::debug!(%url, query = %logsql, "dispatching LogsQL query");
        let mut request = self.client.post(&url).form(&form);
        if !bearer_token.is_empty() {
            request = request.bearer_auth(bearer_token);
        }
        let response = request
            .send()
            .map_err(|err| Error::Gateway(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| Error::Gateway(format!("failed to read response from {url}: {err}")))?;
        if !status.is_success() {
            return Err(Error::Gateway(format!(
                "backend returned {status}: {}",
                body.trim()
            )));
        }
        Ok(body)
    }
}

fn resolve_endpoint<'a>(
    config: &'a EndpointConfig,
    params: &'a RequestParams,
) -> Result<(&'a str, &'a str)> {
    if !config.endpoint.is_empty() && !params.endpoint.is_empty() {
        return Err(Error::Invalid(
            "endpoint can be set either in config or in request, not both".into(),
        ));
    }
    if !params.endpoint.is_empty() {
        return Ok((&params.endpoint, &params.bearer_token));
    }
    if !config.endpoint.is_empty() {
        return Ok((&config.endpoint, &config.bearer_token));
    }
    Err(Error::Invalid(
        "endpoint is required for this statement".into(),
    ))
}

fn build_form(logsql: &str, limit: u32, params: &RequestParams) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("query", logsql.to_string()),
        ("limit", limit.to_string()),
    ];
    if !params.start.is_empty() {
        form.push(("start", params.start.clone()));
    }
    if !params.end.is_empty() {
        form.push(("end", params.end.clone()));
    }
    form
}
