// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use primrose_app::{
    AuthBackend, HealthStatus, Record, RecordId, RecordStore, StoreStatus, TokenVault,
};
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

const USER_NAMES: [&str; 12] = [
    "avery", "jordan", "taylor", "riley", "morgan", "casey", "quinn", "parker", "drew", "elliot",
    "robin", "rowan",
];

const DATA_ROLES: [&str; 3] = ["Admin", "web_app", "Admin,web_app"];

const PAGE_TOPICS: [&str; 8] = [
    "Visiting hours",
    "Cafeteria menu",
    "Parking",
    "Staff directory",
    "Pharmacy",
    "Maternity ward",
    "Outpatient clinic",
    "Volunteer program",
];

/// Encodes claims into an unsigned three-segment bearer token.
pub fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

pub fn admin_token() -> String {
    unsigned_token(&json!({ "sub": "root", "roles": ["ADMIN", "WEBAPP"], "isAdmin": true }))
}

pub fn webapp_token() -> String {
    unsigned_token(&json!({ "sub": "editor", "role": "WEBAPP" }))
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator of user and page rows shaped like the admin API's.
#[derive(Debug, Clone)]
pub struct AdminFaker {
    rng: DeterministicRng,
    next_id: i64,
}

impl AdminFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn user(&mut self) -> Record {
        let id = self.take_id();
        let name = self.pick(&USER_NAMES);
        let role = self.pick(&DATA_ROLES);
        Record::new()
            .with("id", id)
            .with("username", format!("{name}{id}"))
            .with("passwordHash", format!("$2b$10${:016x}", self.rng.next_u64()))
            .with("isAdmin", self.rng.bool())
            .with("role", role)
            .with("createdAt", fixture_datetime())
    }

    pub fn page(&mut self) -> Record {
        let id = self.take_id();
        let topic = self.pick(&PAGE_TOPICS);
        let slug = topic.to_lowercase().replace(' ', "-");
        Record::new()
            .with("id", id)
            .with("description", topic)
            .with("url", format!("https://primrose.example/{slug}"))
    }

    pub fn users(&mut self, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.user()).collect()
    }

    pub fn pages(&mut self, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.page()).collect()
    }

    fn take_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Fetch,
    Create(Record),
    Update(RecordId, Record),
    Delete(RecordId),
}

/// Record store that applies mutations locally and logs every call.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub records: Vec<Record>,
    pub status: StoreStatus,
    pub calls: Vec<StoreCall>,
    pub fail_with: Option<String>,
}

impl MemoryStore {
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    fn finish(&mut self, label: &str) -> bool {
        match &self.fail_with {
            Some(body) => {
                self.status.error = Some(format!("{label}\n{body}"));
                false
            }
            None => {
                self.status.error = None;
                true
            }
        }
    }

    fn position_of(&self, id: &RecordId) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.id().as_ref() == Some(id))
    }
}

impl RecordStore for MemoryStore {
    fn records(&self) -> &[Record] {
        &self.records
    }

    fn status(&self) -> &StoreStatus {
        &self.status
    }

    fn fetch_data(&mut self) {
        self.calls.push(StoreCall::Fetch);
    }

    fn create_item(&mut self, item: &Record) {
        self.calls.push(StoreCall::Create(item.clone()));
        if self.finish("Failed to create item") {
            let next_id = self
                .records
                .iter()
                .filter_map(|record| match record.id() {
                    Some(RecordId::Number(id)) => Some(id),
                    _ => None,
                })
                .max()
                .unwrap_or(0)
                + 1;
            self.records.push(item.clone().with("id", next_id));
        }
    }

    fn update_item(&mut self, id: &RecordId, item: &Record) {
        self.calls.push(StoreCall::Update(id.clone(), item.clone()));
        if self.finish("Failed to update item")
            && let Some(index) = self.position_of(id)
        {
            self.records[index] = item.clone();
        }
    }

    fn delete_item(&mut self, id: &RecordId) {
        self.calls.push(StoreCall::Delete(id.clone()));
        if self.finish("Failed to delete item")
            && let Some(index) = self.position_of(id)
        {
            self.records.remove(index);
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryVault {
    token: RefCell<Option<String>>,
    pub fail_writes: bool,
}

impl MemoryVault {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: RefCell::new(Some(token.to_owned())),
            fail_writes: false,
        }
    }

    pub fn stored(&self) -> Option<String> {
        self.token.borrow().clone()
    }
}

impl TokenVault for MemoryVault {
    fn load_token(&self) -> Result<Option<String>> {
        Ok(self.token.borrow().clone())
    }

    fn save_token(&self, token: &str) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("vault is read-only"));
        }
        *self.token.borrow_mut() = Some(token.to_owned());
        Ok(())
    }
}

/// Backend that replays queued health outcomes and answers logins with a
/// fixed result.
#[derive(Debug, Default)]
pub struct StubBackend {
    health: RefCell<VecDeque<HealthStatus>>,
    login_token: Option<String>,
    health_calls: Cell<usize>,
    login_calls: Cell<usize>,
}

impl StubBackend {
    pub fn healthy() -> Self {
        Self::with_health([HealthStatus::Healthy])
    }

    pub fn with_health<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        Self {
            health: RefCell::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn accepting(mut self, token: &str) -> Self {
        self.login_token = Some(token.to_owned());
        self
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.get()
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.get()
    }
}

impl AuthBackend for StubBackend {
    fn check_health(&self) -> Result<HealthStatus> {
        self.health_calls.set(self.health_calls.get() + 1);
        let mut queue = self.health.borrow_mut();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        next.ok_or_else(|| anyhow!("connection refused"))
    }

    fn login(&self, _username: &str, _password: &str) -> Result<String> {
        self.login_calls.set(self.login_calls.get() + 1);
        self.login_token
            .clone()
            .ok_or_else(|| anyhow!("login rejected (401)"))
    }
}
