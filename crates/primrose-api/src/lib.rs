// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use primrose_app::{AuthBackend, HealthStatus, Record, RecordId, RecordStore, Resource, StoreStatus};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const HEALTH_PATH: &str = "/health";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const HEALTH_TOKEN_HEADER: &str = "X-Health-Token";
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
pub const DEFAULT_HEALTH_TIMEOUT: Duration = primrose_app::HEALTH_CHECK_TIMEOUT;

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    health_token: String,
    timeout: Duration,
    health_timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, health_token: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed =
            Url::parse(&base_url).with_context(|| format!("api.base_url {base_url:?} is invalid"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            health_token: health_token.to_owned(),
            timeout,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            http,
        })
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `Err` only when no response arrived; statuses map onto [`HealthStatus`].
    pub fn health(&self) -> Result<HealthStatus> {
        let mut request = self
            .http
            .get(self.url(HEALTH_PATH))
            .timeout(self.health_timeout);
        if !self.health_token.is_empty() {
            request = request.header(HEALTH_TOKEN_HEADER, &self.health_token);
        }
        let response = request
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        let health = if status == StatusCode::TOO_MANY_REQUESTS {
            HealthStatus::RateLimited
        } else if status.is_success() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        debug!(status = status.as_u16(), ?health, "health check");
        Ok(health)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest { username, password })
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!(
                "login rejected ({}){}",
                status.as_u16(),
                body_suffix(&body)
            ));
        }

        let token = extract_token(&headers, &body)
            .ok_or_else(|| anyhow!("login response carried no token"))?;
        info!(username, "login accepted");
        Ok(token)
    }

    pub fn list(&self, path: &str, token: &str) -> Result<Vec<Record>> {
        let response = self.send(
            self.http.get(self.url(path)),
            token,
            &format!("Failed to fetch data from {path}"),
        )?;
        response
            .json::<Vec<Record>>()
            .with_context(|| format!("decode records from {path}"))
    }

    pub fn create(&self, path: &str, token: &str, item: &Record) -> Result<()> {
        self.send(
            self.http.post(self.url(path)).json(item),
            token,
            "Failed to create item",
        )
        .map(drop)
    }

    pub fn update(&self, path: &str, token: &str, item: &Record) -> Result<()> {
        self.send(
            self.http.put(self.url(path)).json(item),
            token,
            "Failed to update item",
        )
        .map(drop)
    }

    pub fn delete(&self, path: &str, token: &str) -> Result<()> {
        self.send(
            self.http.delete(self.url(path)),
            token,
            "Failed to delete item",
        )
        .map(drop)
    }

    fn send(&self, request: RequestBuilder, token: &str, failure: &str) -> Result<Response> {
        let response = request
            .bearer_auth(token)
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            debug!(status = status.as_u16(), failure, "request rejected");
            return Err(anyhow!("{failure}{}", body_suffix(&body)));
        }
        Ok(response)
    }
}

impl AuthBackend for Client {
    fn check_health(&self) -> Result<HealthStatus> {
        self.health()
    }

    fn login(&self, username: &str, password: &str) -> Result<String> {
        Client::login(self, username, password)
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Finds the bearer token in a login response: the body's `token` field,
/// then `X-Auth-Token`, then `Authorization: Bearer`.
pub fn extract_token(headers: &HeaderMap, body: &str) -> Option<String> {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(serde_json::Value::String(token)) = fields.get("token")
        && !token.is_empty()
    {
        return Some(token.clone());
    }

    if let Some(token) = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_owned());
    }

    let authorization = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = authorization.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("\n{body}")
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("request to {base_url} timed out");
    }
    anyhow!("cannot reach {base_url} ({error})")
}

/// Endpoints of one resource. Unset overrides fall back to the base path,
/// with `/{id}` appended for update and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    pub base: String,
    pub fetch: Option<String>,
    pub create: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

impl ResourcePaths {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            fetch: None,
            create: None,
            update: None,
            delete: None,
        }
    }

    pub fn with_fetch(mut self, path: impl Into<String>) -> Self {
        self.fetch = Some(path.into());
        self
    }

    pub fn for_resource(resource: Resource) -> Self {
        let paths = Self::new(resource.base_path());
        match resource.fetch_path() {
            Some(fetch) => paths.with_fetch(fetch),
            None => paths,
        }
    }

    pub fn fetch_path(&self) -> &str {
        self.fetch.as_deref().unwrap_or(&self.base)
    }

    pub fn create_path(&self) -> &str {
        self.create.as_deref().unwrap_or(&self.base)
    }

    pub fn update_path(&self, id: &RecordId) -> String {
        self.update
            .clone()
            .unwrap_or_else(|| format!("{}/{id}", self.base))
    }

    pub fn delete_path(&self, id: &RecordId) -> String {
        self.delete
            .clone()
            .unwrap_or_else(|| format!("{}/{id}", self.base))
    }
}

/// HTTP-backed record store for one resource.
#[derive(Debug, Clone)]
pub struct CrudStore {
    client: Client,
    paths: ResourcePaths,
    token: Option<String>,
    records: Vec<Record>,
    status: StoreStatus,
}

impl CrudStore {
    pub fn new(client: Client, paths: ResourcePaths) -> Self {
        Self {
            client,
            paths,
            token: None,
            records: Vec::new(),
            status: StoreStatus::default(),
        }
    }

    /// Installs the bearer token. Losing the token drops cached rows.
    pub fn set_token(&mut self, token: Option<&str>) {
        if token.is_none() {
            self.records.clear();
        }
        self.token = token.map(str::to_owned);
    }

    fn mutate<F>(&mut self, operation: F)
    where
        F: FnOnce(&Client, &str) -> Result<()>,
    {
        let Some(token) = self.token.clone() else {
            debug!(base = %self.paths.base, "mutation skipped without token");
            return;
        };
        self.status.is_updating = true;
        self.status.error = None;

        match operation(&self.client, &token) {
            Ok(()) => self.fetch_data(),
            Err(error) => {
                let message = format!("{error:#}");
                warn!(base = %self.paths.base, error = %message, "mutation failed");
                self.status.error = Some(message);
            }
        }

        self.status.is_updating = false;
    }
}

impl RecordStore for CrudStore {
    fn records(&self) -> &[Record] {
        &self.records
    }

    fn status(&self) -> &StoreStatus {
        &self.status
    }

    fn fetch_data(&mut self) {
        let Some(token) = self.token.clone() else {
            return;
        };
        self.status.is_loading = true;
        self.status.error = None;

        let path = self.paths.fetch_path().to_owned();
        match self.client.list(&path, &token) {
            Ok(records) => {
                debug!(path = %path, count = records.len(), "fetched records");
                self.records = records;
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(path = %path, error = %message, "fetch failed");
                self.status.error = Some(message);
            }
        }

        self.status.is_loading = false;
    }

    fn create_item(&mut self, item: &Record) {
        let path = self.paths.create_path().to_owned();
        self.mutate(|client, token| client.create(&path, token, item));
    }

    fn update_item(&mut self, id: &RecordId, item: &Record) {
        let path = self.paths.update_path(id);
        self.mutate(|client, token| client.update(&path, token, item));
    }

    fn delete_item(&mut self, id: &RecordId) {
        let path = self.paths.delete_path(id);
        self.mutate(|client, token| client.delete(&path, token));
    }
}
