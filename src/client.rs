//! HTTP client for the LaunchDarkly REST API (v2).

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::AppError;
use crate::models::project::{Environment, Project};

pub const PAGE_SIZE: usize = 20;
const JSON_PATCH: &str = "application/json-patch+json";

pub struct LdClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LdClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("ld-provisioner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        Self::new(&settings.base_url, &settings.api_key)
    }

    pub async fn get(&self, path: &str) -> Result<Value, AppError> {
        self.execute(Method::GET, path, None).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value, AppError> {
        let body = encode(body)?;
        self.execute(Method::POST, path, Some(body)).await
    }

    /// PATCH with either a JSON-Patch operation list or a plain JSON body. The
    /// content type follows the shape of the body.
    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value, AppError> {
        let body = encode(body)?;
        self.execute(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), AppError> {
        self.execute(Method::DELETE, path, None).await.map(|_| ())
    }

    async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, AppError> {
        let operation = format!("{} {}", method, path);
        let url = format!("{}{}", self.base_url, path);

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header(AUTHORIZATION, &self.api_key)
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            let content_type = if body.is_array() { JSON_PATCH } else { "application/json" };
            debug!(%method, path, body = %body, "sending request");
            req = req.header(CONTENT_TYPE, content_type).body(body.to_string());
        } else {
            debug!(%method, path, "sending request");
        }

        let resp = req.send().await.map_err(|source| {
            warn!(%method, path, error = %source, "request failed");
            AppError::Transport {
                operation: operation.clone(),
                source,
            }
        })?;

        handle_response(resp, &operation).await
    }

    // ── Projects ──────────────────────────────────────────────

    /// Every project visible to the token, walking the paginated listing.
    pub async fn list_projects(&self) -> Result<Vec<Project>, AppError> {
        let mut projects = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .get(&format!("/projects?limit={}&offset={}", PAGE_SIZE, offset))
                .await?;
            let items: Vec<Project> = decode_items(page, "listing projects")?;
            let fetched = items.len();
            projects.extend(items);
            debug!(offset, fetched, total = projects.len(), "fetched project page");
            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(projects)
    }

    /// `None` when the project does not exist.
    pub async fn get_project(&self, key: &str) -> Result<Option<Project>, AppError> {
        match self.get(&project_path(key)).await {
            Ok(v) => decode(v, "getting project").map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_project(&self, project: &Project) -> Result<Project, AppError> {
        let v = self.post("/projects", &project.creation_payload()).await?;
        decode(v, "project creation")
    }

    // ── Environments ──────────────────────────────────────────

    pub async fn list_environments(&self, project: &str) -> Result<Vec<Environment>, AppError> {
        let v = self.get(&environments_path(project)).await?;
        decode_items(v, "listing environments")
    }

    pub async fn get_environment(&self, project: &str, env: &str) -> Result<Environment, AppError> {
        let v = self.get(&environment_path(project, env)).await?;
        decode(v, "getting environment")
    }

    pub async fn create_environment(&self, project: &str, env: &Environment) -> Result<Environment, AppError> {
        let v = self
            .post(&environments_path(project), &env.creation_payload())
            .await?;
        decode(v, "environment creation")
    }

    pub async fn patch_environment<T: Serialize + ?Sized>(
        &self,
        project: &str,
        env: &str,
        ops: &T,
    ) -> Result<Environment, AppError> {
        let v = self.patch(&environment_path(project, env), ops).await?;
        decode(v, "environment update")
    }

    pub async fn delete_environment(&self, project: &str, env: &str) -> Result<(), AppError> {
        self.delete(&environment_path(project, env)).await
    }
}

pub fn project_path(project: &str) -> String {
    format!("/projects/{}", urlencoding::encode(&project.to_lowercase()))
}

pub fn environments_path(project: &str) -> String {
    format!("{}/environments", project_path(project))
}

pub fn environment_path(project: &str, env: &str) -> String {
    format!(
        "{}/{}",
        environments_path(project),
        urlencoding::encode(&env.to_lowercase())
    )
}

async fn handle_response(resp: reqwest::Response, operation: &str) -> Result<Value, AppError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!(operation, status = status.as_u16(), "credentials rejected");
        return Err(AppError::Auth(format!(
            "{} was rejected (HTTP {}): check LD_API_KEY",
            operation, status
        )));
    }

    if !status.is_success() {
        warn!(operation, status = status.as_u16(), body = %body, "request returned an error");
        return Err(AppError::Remote {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    info!(operation, status = status.as_u16(), "request completed");
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("{}: invalid JSON response: {}", operation, e)))
}

fn encode<T: Serialize + ?Sized>(body: &T) -> Result<Value, AppError> {
    serde_json::to_value(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode request body: {}", e)))
}

fn decode<T: DeserializeOwned>(v: Value, what: &str) -> Result<T, AppError> {
    serde_json::from_value(v)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("unexpected response while {}: {}", what, e)))
}

fn decode_items<T: DeserializeOwned>(mut v: Value, what: &str) -> Result<Vec<T>, AppError> {
    match v.get_mut("items").map(Value::take) {
        Some(items) => decode(items, what),
        None => Err(AppError::Internal(anyhow::anyhow!(
            "unexpected response while {}: missing items",
            what
        ))),
    }
}
