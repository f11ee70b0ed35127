//! PCE REST client.
//!
//! `PceApi` is the seam between the reconciliation core and the network.
//! Everything above it works on JSON values and typed models; only
//! `HttpPce` performs HTTP I/O. Paths are relative to `/api/v2` and always
//! start with `/orgs/<org>/...`, which is also the shape of every href.

use crate::core::config::PceProfile;
use crate::core::error::{PceError, PceResult};
use crate::core::model::{BulkResult, Label};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

/// Maximum items per workload bulk call or VEN unpair call.
pub const BULK_CHUNK: usize = 1000;

const ASYNC_POLL_LIMIT: usize = 600;

pub trait PceApi {
    fn org(&self) -> u32;
    fn get_collection(&self, path: &str, query: &[(String, String)]) -> PceResult<Vec<Value>>;
    fn post(&self, path: &str, body: &Value) -> PceResult<Value>;
    fn put(&self, path: &str, body: &Value) -> PceResult<Value>;
}

pub fn org_path(api: &dyn PceApi, tail: &str) -> String {
    format!("/orgs/{}/{}", api.org(), tail)
}

pub fn draft_path(api: &dyn PceApi, tail: &str) -> String {
    format!("/orgs/{}/sec_policy/draft/{}", api.org(), tail)
}

/// GET a collection and deserialize every element.
pub fn fetch<T: DeserializeOwned>(
    api: &dyn PceApi,
    path: &str,
    query: &[(String, String)],
) -> PceResult<Vec<T>> {
    api.get_collection(path, query)?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(PceError::JsonError))
        .collect()
}

pub fn create_label(api: &dyn PceApi, key: &str, value: &str) -> PceResult<Label> {
    let created = api.post(
        &org_path(api, "labels"),
        &json!({ "key": key, "value": value }),
    )?;
    let label: Label = serde_json::from_value(created)?;
    info!(href = %label.href, key, value, "created label");
    Ok(label)
}

/// PUT `items` to a workload bulk endpoint in chunks, failing on the first
/// item whose status is not a success.
pub fn bulk_workloads(
    api: &dyn PceApi,
    action: &str,
    items: Vec<Value>,
) -> PceResult<Vec<BulkResult>> {
    let path = org_path(api, &format!("workloads/{}", action));
    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(BULK_CHUNK) {
        let response = api.put(&path, &Value::Array(chunk.to_vec()))?;
        let statuses: Vec<BulkResult> = match response {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        };
        for status in &statuses {
            if !matches!(status.status.as_str(), "updated" | "created" | "") {
                return Err(PceError::ApiError {
                    status: 406,
                    path: path.clone(),
                    message: format!(
                        "{} for {}: {}",
                        status.status,
                        status.href.as_deref().unwrap_or("<new workload>"),
                        status.message.as_deref().unwrap_or("no message")
                    ),
                });
            }
        }
        debug!(path = %path, count = chunk.len(), "bulk call complete");
        results.extend(statuses);
    }
    Ok(results)
}

/// Provision draft changes for the given subset, e.g.
/// `{"rule_sets": [{"href": ...}]}`.
pub fn provision(api: &dyn PceApi, change_subset: Value, description: &str) -> PceResult<()> {
    api.post(
        &org_path(api, "sec_policy"),
        &json!({ "update_description": description, "change_subset": change_subset }),
    )?;
    info!(description, "provisioned draft policy");
    Ok(())
}

/// Drop the `href` key; the PCE rejects it in single-object PUT bodies.
pub fn without_href(mut body: Value) -> Value {
    if let Some(obj) = body.as_object_mut() {
        obj.remove("href");
    }
    body
}

/// Blocking HTTP implementation of [`PceApi`].
pub struct HttpPce {
    client: Client,
    base: String,
    org: u32,
    api_user: String,
    api_key: String,
}

impl HttpPce {
    pub fn new(profile: &PceProfile) -> PceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(profile.timeout_secs))
            .danger_accept_invalid_certs(profile.disable_tls)
            .build()?;
        Ok(Self {
            client,
            base: format!("https://{}:{}/api/v2", profile.fqdn, profile.port),
            org: profile.org,
            api_user: profile.api_user.clone(),
            api_key: profile.api_key.clone(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth(&self.api_user, Some(&self.api_key))
            .header("Accept", "application/json")
    }

    fn check(&self, method: &str, path: &str, response: Response) -> PceResult<Response> {
        let status = response.status();
        debug!(method, path, status = status.as_u16(), "pce response");
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(PceError::ApiError {
            status: status.as_u16(),
            path: path.to_string(),
            message,
        })
    }

    fn json_or_null(response: Response) -> PceResult<Value> {
        let text = response.text()?;
        if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    /// Re-run a truncated GET as an async job and return the full result.
    fn get_async(&self, path: &str, query: &[(String, String)]) -> PceResult<Vec<Value>> {
        let url = format!("{}{}", self.base, path);
        let response = self.request(self.client.get(&url).query(query))
            .header("Prefer", "respond-async")
            .send()?;
        let response = self.check("GET", path, response)?;
        let job = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PceError::ApiError {
                status: response.status().as_u16(),
                path: path.to_string(),
                message: "async collection request returned no job location".into(),
            })?;
        let wait = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);

        for _ in 0..ASYNC_POLL_LIMIT {
            std::thread::sleep(Duration::from_secs(wait));
            let poll = self
                .request(self.client.get(format!("{}{}", self.base, job)))
                .send()?;
            let poll = self.check("GET", &job, poll)?;
            let status: Value = poll.json()?;
            if status["status"] == "done" {
                let result = status["result"]["href"].as_str().ok_or_else(|| {
                    PceError::ApiError {
                        status: 200,
                        path: job.clone(),
                        message: "async job finished without a result href".into(),
                    }
                })?;
                let data = self
                    .request(self.client.get(format!("{}{}", self.base, result)))
                    .send()?;
                let data = self.check("GET", result, data)?;
                return Ok(data.json()?);
            }
            if status["status"] == "failed" {
                return Err(PceError::ApiError {
                    status: 200,
                    path: job,
                    message: "async collection job failed".into(),
                });
            }
        }
        Err(PceError::ApiError {
            status: StatusCode::REQUEST_TIMEOUT.as_u16(),
            path: path.to_string(),
            message: "async collection job did not finish".into(),
        })
    }
}

impl PceApi for HttpPce {
    fn org(&self) -> u32 {
        self.org
    }

    fn get_collection(&self, path: &str, query: &[(String, String)]) -> PceResult<Vec<Value>> {
        let url = format!("{}{}", self.base, path);
        let response = self.request(self.client.get(&url).query(query)).send()?;
        let response = self.check("GET", path, response)?;
        let total = response
            .headers()
            .get("X-Total-Count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let items: Vec<Value> = response.json()?;
        match total {
            Some(total) if total > items.len() => {
                debug!(path, total, returned = items.len(), "collection truncated; using async job");
                self.get_async(path, query)
            }
            _ => Ok(items),
        }
    }

    fn post(&self, path: &str, body: &Value) -> PceResult<Value> {
        let url = format!("{}{}", self.base, path);
        let response = self.request(self.client.post(&url).json(body)).send()?;
        Self::json_or_null(self.check("POST", path, response)?)
    }

    fn put(&self, path: &str, body: &Value) -> PceResult<Value> {
        let url = format!("{}{}", self.base, path);
        let response = self.request(self.client.put(&url).json(body)).send()?;
        Self::json_or_null(self.check("PUT", path, response)?)
    }
}
