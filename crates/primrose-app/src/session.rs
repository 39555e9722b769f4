// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::token;

pub const TOKEN_STORAGE_KEY: &str = "primrose_token";
pub const HEALTH_CHECK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::seconds(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    RateLimited,
}

/// Health and login endpoints. `Err` means the request never produced a
/// usable response (transport failure, timeout, missing token).
pub trait AuthBackend {
    fn check_health(&self) -> Result<HealthStatus>;
    fn login(&self, username: &str, password: &str) -> Result<String>;
}

/// Durable single-key storage for the bearer token.
pub trait TokenVault {
    fn load_token(&self) -> Result<Option<String>>;
    fn save_token(&self, token: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    HealthCheckSkipped,
    HealthChecked(HealthStatus),
    RateLimitLifted,
    LoginStarted,
    LoggedIn { username: String },
    LoginFailed(String),
    LoggedOut,
    TokenRestored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    is_healthy: bool,
    is_health_check_in_progress: bool,
    is_rate_limited: bool,
    last_health_check_time: Option<OffsetDateTime>,
    rate_limit_expires_at: Option<OffsetDateTime>,
    rate_limit_cooldown: Duration,
    is_logging_in: bool,
    is_logged_in: bool,
    token: Option<String>,
    last_login_failed: bool,
    login_name: String,
    allowed_roles: BTreeSet<String>,
    has_admin_rights: bool,
    error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            is_healthy: false,
            is_health_check_in_progress: false,
            is_rate_limited: false,
            last_health_check_time: None,
            rate_limit_expires_at: None,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            is_logging_in: false,
            is_logged_in: false,
            token: None,
            last_login_failed: false,
            login_name: String::new(),
            allowed_roles: BTreeSet::new(),
            has_admin_rights: false,
            error: None,
        }
    }
}

impl Session {
    pub fn with_rate_limit_cooldown(cooldown: Duration) -> Self {
        Self {
            rate_limit_cooldown: cooldown,
            ..Self::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }

    pub fn is_health_check_in_progress(&self) -> bool {
        self.is_health_check_in_progress
    }

    pub fn is_rate_limited(&self) -> bool {
        self.is_rate_limited
    }

    pub fn last_health_check_time(&self) -> Option<OffsetDateTime> {
        self.last_health_check_time
    }

    pub fn rate_limit_expires_at(&self) -> Option<OffsetDateTime> {
        self.rate_limit_expires_at
    }

    pub fn is_logging_in(&self) -> bool {
        self.is_logging_in
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn last_login_failed(&self) -> bool {
        self.last_login_failed
    }

    pub fn login_name(&self) -> &str {
        &self.login_name
    }

    pub fn allowed_roles(&self) -> &BTreeSet<String> {
        &self.allowed_roles
    }

    pub fn has_admin_rights(&self) -> bool {
        self.has_admin_rights
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Fires the rate-limit cooldown once its deadline has passed.
    pub fn tick(&mut self, now: OffsetDateTime) -> Vec<SessionEvent> {
        match self.rate_limit_expires_at {
            Some(expires_at) if self.is_rate_limited && now >= expires_at => {
                self.is_rate_limited = false;
                self.rate_limit_expires_at = None;
                info!("health check rate limit lifted");
                vec![SessionEvent::RateLimitLifted]
            }
            _ => Vec::new(),
        }
    }

    /// Returns false when a health request must not be issued.
    pub fn begin_health_check(&mut self, now: OffsetDateTime) -> bool {
        if self.is_rate_limited {
            debug!("health check skipped while rate limited");
            return false;
        }
        self.is_health_check_in_progress = true;
        self.last_health_check_time = Some(now);
        true
    }

    pub fn finish_health_check(
        &mut self,
        outcome: Result<HealthStatus>,
        now: OffsetDateTime,
    ) -> SessionEvent {
        self.is_health_check_in_progress = false;
        let status = match outcome {
            Ok(status) => status,
            Err(error) => {
                let message = format!("{error:#}");
                warn!(error = %message, "health check failed");
                HealthStatus::Unhealthy
            }
        };

        match status {
            HealthStatus::Healthy => {
                self.is_healthy = true;
                self.is_rate_limited = false;
                self.rate_limit_expires_at = None;
            }
            HealthStatus::Unhealthy => {
                self.is_healthy = false;
            }
            HealthStatus::RateLimited => {
                self.is_healthy = false;
                self.is_rate_limited = true;
                self.rate_limit_expires_at = Some(now + self.rate_limit_cooldown);
                warn!(
                    cooldown_secs = self.rate_limit_cooldown.whole_seconds(),
                    "health endpoint rate limited"
                );
            }
        }
        debug!(?status, "health check finished");
        SessionEvent::HealthChecked(status)
    }

    pub fn check_health<B>(&mut self, backend: &B, now: OffsetDateTime) -> Vec<SessionEvent>
    where
        B: AuthBackend + ?Sized,
    {
        let mut events = self.tick(now);
        if !self.begin_health_check(now) {
            events.push(SessionEvent::HealthCheckSkipped);
            return events;
        }
        let outcome = backend.check_health();
        events.push(self.finish_health_check(outcome, now));
        events
    }

    pub fn begin_login(&mut self) -> SessionEvent {
        self.is_logging_in = true;
        self.last_login_failed = false;
        self.error = None;
        SessionEvent::LoginStarted
    }

    pub fn finish_login<V>(
        &mut self,
        vault: &V,
        username: &str,
        outcome: Result<String>,
    ) -> SessionEvent
    where
        V: TokenVault + ?Sized,
    {
        self.is_logging_in = false;
        match outcome {
            Ok(token) => {
                if let Err(error) = vault.save_token(&token) {
                    let message = format!("{error:#}");
                    warn!(error = %message, "persist login token");
                }
                self.set_token(Some(token));
                self.is_logged_in = true;
                self.login_name = username.to_owned();
                info!(username, "logged in");
                SessionEvent::LoggedIn {
                    username: username.to_owned(),
                }
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(username, error = %message, "login failed");
                self.set_token(None);
                self.is_logged_in = false;
                self.last_login_failed = true;
                self.error = Some(message.clone());
                SessionEvent::LoginFailed(message)
            }
        }
    }

    pub fn login<B, V>(
        &mut self,
        backend: &B,
        vault: &V,
        username: &str,
        password: &str,
    ) -> Vec<SessionEvent>
    where
        B: AuthBackend + ?Sized,
        V: TokenVault + ?Sized,
    {
        let started = self.begin_login();
        let outcome = backend.login(username, password);
        vec![started, self.finish_login(vault, username, outcome)]
    }

    /// Drops the in-memory credentials. The persisted token is left in place.
    pub fn logout(&mut self) -> Vec<SessionEvent> {
        self.set_token(None);
        self.is_logged_in = false;
        self.last_login_failed = false;
        self.login_name.clear();
        self.error = None;
        info!("logged out");
        vec![SessionEvent::LoggedOut]
    }

    pub fn try_load_stored_token<V>(&mut self, vault: &V) -> Vec<SessionEvent>
    where
        V: TokenVault + ?Sized,
    {
        match vault.load_token() {
            Ok(Some(token)) if !token.is_empty() => {
                self.set_token(Some(token));
                self.is_logged_in = true;
                info!("restored stored login token");
                vec![SessionEvent::TokenRestored]
            }
            Ok(_) => Vec::new(),
            Err(error) => {
                let message = format!("{error:#}");
                warn!(error = %message, "read stored login token");
                Vec::new()
            }
        }
    }

    fn set_token(&mut self, token: Option<String>) {
        match &token {
            Some(value) => {
                self.allowed_roles = token::roles_of(value);
                self.has_admin_rights = token::is_admin_of(value);
            }
            None => {
                self.allowed_roles.clear();
                self.has_admin_rights = false;
            }
        }
        self.token = token;
    }
}
