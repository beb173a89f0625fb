//! Prometheus query client and a minimal text-exposition reader.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use ttft_experiments::executor::QueueDepthProbe;

pub const QUEUE_DEPTH_QUERY: &str = r#"avg(llm_request_queue_length{pod=~"llm-.*"})"#;

/// Series watched by the metrics poller.
pub const WATCHED_SERIES: [&str; 5] = [
    "llm_request_queue_length",
    "llm_requests_in_flight",
    "vllm_config_max_inflight",
    "llm_requests_total",
    "llm_requests_failed_total",
];

#[derive(Debug, thiserror::Error)]
pub enum PrometheusError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QuerySample>,
}

#[derive(Debug, Deserialize)]
struct QuerySample {
    /// `[unix_seconds, "value"]`
    value: (f64, String),
}

/// First sample of an instant-query response, `None` when the result is empty.
pub fn parse_query_response(body: &str) -> Result<Option<f64>, PrometheusError> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|error| PrometheusError::Malformed(error.to_string()))?;

    if response.status != "success" {
        return Err(PrometheusError::Malformed(
            response
                .error
                .unwrap_or_else(|| format!("query status {}", response.status)),
        ));
    }

    let Some(sample) = response.data.and_then(|data| data.result.into_iter().next()) else {
        return Ok(None);
    };
    sample
        .value
        .1
        .parse::<f64>()
        .map(Some)
        .map_err(|_| PrometheusError::Malformed(format!("non-numeric value {:?}", sample.value.1)))
}

/// Values for `names` from a text exposition. Samples of the same series with
/// different labels are summed; absent series map to `None`.
pub fn parse_exposition(text: &str, names: &[&str]) -> BTreeMap<String, Option<f64>> {
    let mut values: BTreeMap<String, Option<f64>> =
        names.iter().map(|name| (name.to_string(), None)).collect();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((series, rest)) = split_series(line) else {
            continue;
        };
        let Some(slot) = values.get_mut(series) else {
            continue;
        };
        let Some(value) = rest
            .split_whitespace()
            .next()
            .and_then(|raw| raw.parse::<f64>().ok())
        else {
            continue;
        };
        *slot = Some(slot.unwrap_or(0.0) + value);
    }
    values
}

/// Splits `name{labels} value [ts]` into the metric name and the text after the labels.
fn split_series(line: &str) -> Option<(&str, &str)> {
    match line.find(['{', ' ', '\t']) {
        Some(at) if line[at..].starts_with('{') => {
            let close = line[at..].find('}')? + at;
            Some((&line[..at], &line[close + 1..]))
        }
        Some(at) => Some((&line[..at], &line[at..])),
        None => None,
    }
}

pub struct PrometheusClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl PrometheusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::builder().timeout(timeout).build()?,
        })
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String, PrometheusError> {
        let http = |source| PrometheusError::Http {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).query(query).send().map_err(http)?;
        if !response.status().is_success() {
            return Err(PrometheusError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.text().map_err(http)
    }

    /// Evaluate an instant query through `/api/v1/query`.
    pub fn query_scalar(&self, expression: &str) -> Result<Option<f64>, PrometheusError> {
        let url = format!("{}/api/v1/query", self.base_url);
        parse_query_response(&self.get(&url, &[("query", expression)])?)
    }

    /// Fetch a raw exposition page; `base_url` is the full `/metrics` URL here.
    pub fn scrape(&self, names: &[&str]) -> Result<BTreeMap<String, Option<f64>>, PrometheusError> {
        let body = self.get(&self.base_url, &[])?;
        Ok(parse_exposition(&body, names))
    }
}

impl QueueDepthProbe for PrometheusClient {
    fn queue_depth(&self) -> Option<f64> {
        match self.query_scalar(QUEUE_DEPTH_QUERY) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "queue depth unavailable");
                None
            }
        }
    }
}
