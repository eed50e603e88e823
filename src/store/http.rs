use super::{PutCondition, ReportStore, Snapshot};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreOp};
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder},
    header::{ETAG, IF_MATCH, IF_NONE_MATCH},
};
use std::time::Duration;
use tracing::debug;

/// Object store reached over plain HTTP: `GET`/`PUT {endpoint}/{bucket}/{key}`.
/// Versions are ETags; conditional puts use `If-Match` / `If-None-Match: *`.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    url: String,
    key: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpStore {
    pub fn new(config: &StoreConfig, endpoint: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StoreError::Http)?;
        Ok(Self {
            client,
            url: object_url(endpoint, config.region.as_deref(), &config.bucket, &config.key),
            key: config.key.clone(),
            token: config.token.clone(),
            timeout: config.timeout,
        })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn transport_error(&self, op: StoreOp, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout {
                op,
                after: self.timeout,
            }
        } else {
            StoreError::Http(e)
        }
    }
}

pub(crate) fn object_url(endpoint: &str, region: Option<&str>, bucket: &str, key: &str) -> String {
    let endpoint = match region {
        Some(region) => endpoint.replace("{region}", region),
        None => endpoint.to_string(),
    };
    let mut url = endpoint.trim_end_matches('/').to_string();
    for part in [bucket, key] {
        let part = part.trim_matches('/');
        if !part.is_empty() {
            url.push('/');
            url.push_str(part);
        }
    }
    url
}

impl ReportStore for HttpStore {
    fn key(&self) -> &str {
        &self.key
    }

    fn get(&self) -> Result<Snapshot, StoreError> {
        let resp = self
            .authorized(self.client.get(&self.url))
            .send()
            .map_err(|e| self.transport_error(StoreOp::Fetch, e))?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Err(StoreError::NotFound),
            status if !status.is_success() => {
                return Err(StoreError::Status {
                    op: StoreOp::Fetch,
                    status: status.as_u16(),
                });
            }
            _ => {}
        }
        let version = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let blob = resp
            .bytes()
            .map_err(|e| self.transport_error(StoreOp::Fetch, e))?
            .to_vec();
        debug!(url = %self.url, bytes = blob.len(), ?version, "fetched report object");
        Ok(Snapshot { blob, version })
    }

    fn put(&self, blob: &[u8], condition: PutCondition<'_>) -> Result<(), StoreError> {
        let mut req = self.authorized(self.client.put(&self.url)).body(blob.to_vec());
        req = match condition {
            PutCondition::Always => req,
            PutCondition::IfAbsent => req.header(IF_NONE_MATCH, "*"),
            PutCondition::IfMatch(token) => req.header(IF_MATCH, token),
        };
        let resp = req
            .send()
            .map_err(|e| self.transport_error(StoreOp::Put, e))?;
        match resp.status() {
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Err(StoreError::Conflict),
            status if status.is_success() => {
                debug!(url = %self.url, bytes = blob.len(), "stored report object");
                Ok(())
            }
            status => Err(StoreError::Status {
                op: StoreOp::Put,
                status: status.as_u16(),
            }),
        }
    }
}
