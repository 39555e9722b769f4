// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const FALLBACK_API_URL: &str = "http://localhost:8080";
const DEFAULT_LOG_FILTER: &str = "primrose=info";

/// API location baked in at build time, if any.
const BUILD_API_URL: Option<&str> = option_env!("PRIMROSE_API_URL");
const BUILD_HEALTHCHECK_TOKEN: Option<&str> = option_env!("PRIMROSE_HEALTHCHECK_TOKEN");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub health: Health,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            health: Health::default(),
            storage: Storage::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub health_token: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub poll_interval: Option<String>,
    pub timeout: Option<String>,
    pub rate_limit_cooldown: Option<String>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            poll_interval: Some("30s".to_owned()),
            timeout: Some("5s".to_owned()),
            rate_limit_cooldown: Some("60s".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub enabled: Option<bool>,
    pub filter: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            enabled: Some(true),
            filter: Some(DEFAULT_LOG_FILTER.to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("PRIMROSE_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set PRIMROSE_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(primrose_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [api], [health], [storage], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            primrose_db::validate_db_path(db_path)?;
        }

        if let Some(base_url) = &self.api.base_url
            && !base_url.contains("://")
        {
            bail!(
                "api.base_url in {} must include a scheme such as http://, got {:?}",
                path.display(),
                base_url
            );
        }

        let durations = [
            ("api.timeout", self.api.timeout.as_deref()),
            ("health.poll_interval", self.health.poll_interval.as_deref()),
            ("health.timeout", self.health.timeout.as_deref()),
            (
                "health.rate_limit_cooldown",
                self.health.rate_limit_cooldown.as_deref(),
            ),
        ];
        for (name, raw) in durations {
            let Some(raw) = raw else {
                continue;
            };
            let parsed = parse_duration(raw)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "{name} in {} must be positive, got {}",
                    path.display(),
                    raw
                );
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => primrose_db::default_db_path(),
        }
    }

    /// File value, then runtime env, then the build-time default.
    pub fn api_base_url(&self) -> String {
        let raw = self
            .api
            .base_url
            .clone()
            .or_else(|| env::var("PRIMROSE_API_URL").ok())
            .or_else(|| BUILD_API_URL.map(str::to_owned))
            .unwrap_or_else(|| FALLBACK_API_URL.to_owned());
        raw.trim_end_matches('/').to_owned()
    }

    pub fn health_token(&self) -> String {
        self.api
            .health_token
            .clone()
            .or_else(|| env::var("PRIMROSE_HEALTHCHECK_TOKEN").ok())
            .or_else(|| BUILD_HEALTHCHECK_TOKEN.map(str::to_owned))
            .unwrap_or_default()
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or("10s"))
    }

    pub fn health_poll_interval(&self) -> Result<Duration> {
        parse_duration(self.health.poll_interval.as_deref().unwrap_or("30s"))
    }

    pub fn health_timeout(&self) -> Result<Duration> {
        parse_duration(self.health.timeout.as_deref().unwrap_or("5s"))
    }

    pub fn rate_limit_cooldown(&self) -> Result<Duration> {
        parse_duration(self.health.rate_limit_cooldown.as_deref().unwrap_or("60s"))
    }

    pub fn log_enabled(&self) -> bool {
        self.log.enabled.unwrap_or(true)
    }

    pub fn log_filter(&self) -> &str {
        self.log.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# primrose config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\n# Sent as X-Health-Token on health checks.\nhealth_token = \"\"\ntimeout = \"10s\"\n\n[health]\npoll_interval = \"30s\"\ntimeout = \"5s\"\nrate_limit_cooldown = \"60s\"\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/primrose/primrose.db)\n# db_path = \"/absolute/path/to/primrose.db\"\n\n[log]\nenabled = true\n# Overridden by PRIMROSE_LOG.\nfilter = \"{}\"\n",
            path.display(),
            FALLBACK_API_URL,
            DEFAULT_LOG_FILTER,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
