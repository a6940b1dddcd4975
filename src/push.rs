//! HTTP Push
//!
//! Optionally forwards each device's exposition text to an HTTP endpoint,
//! usually a Prometheus Pushgateway. Pushing is a best-effort side channel:
//! failures are reported to the caller, which logs and counts them, but they
//! never affect the local output files.
//!
//! When `push.job_name` is configured the request goes to the Pushgateway
//! grouping path `<url>/metrics/job/<job>/instance/<node>`, so each device
//! replaces only its own group. Otherwise the body is posted to `url` as is.

use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use tracing::debug;

use crate::config::PushConfig;
use crate::error::{ExporterError, Result};
use crate::roster::NodeId;

/// Content type of the Prometheus text exposition format
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub struct PushPublisher {
    client: reqwest::Client,
    url: Url,
    job_name: Option<String>,
}

impl PushPublisher {
    /// Builds a publisher when `push.url` is set, `None` otherwise
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>> {
        let Some(url) = config.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };

        let url = Url::parse(url.trim())
            .map_err(|e| ExporterError::Config(format!("invalid push.url '{}': {}", url, e)))?;
        if url.cannot_be_a_base() {
            return Err(ExporterError::Config(format!(
                "push.url '{}' cannot carry a path",
                url
            )));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_str(name.trim()).map_err(|e| {
                ExporterError::Config(format!("invalid push header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value.trim()).map_err(|e| {
                ExporterError::Config(format!("invalid value for push header '{}': {}", name, e))
            })?;
            headers.insert(name, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(EXPOSITION_CONTENT_TYPE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .user_agent(concat!("mesh-metrics/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Some(Self {
            client,
            url,
            job_name: config.job_name.clone().filter(|j| !j.trim().is_empty()),
        }))
    }

    /// Destination for one device's push
    pub fn target_url(&self, node: &NodeId) -> Url {
        let Some(job) = &self.job_name else {
            return self.url.clone();
        };

        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "metrics",
                "job",
                job.as_str(),
                "instance",
                node.bare(),
            ]);
        }
        url
    }

    /// POSTs `body` for `node`
    pub async fn publish(&self, node: &NodeId, body: &str) -> Result<()> {
        let url = self.target_url(node);
        debug!("Pushing {} bytes for {} to {}", body.len(), node, url);

        let response = self
            .client
            .post(url.clone())
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExporterError::Push(format!("{} returned {}", url, status)));
        }
        Ok(())
    }
}

/// Parses a `Name: value` header given on the command line
pub fn parse_header_arg(arg: &str) -> Option<(String, String)> {
    let (name, value) = arg.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
