// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use primrose_api::{Client, CrudStore, ResourcePaths};
use primrose_app::{RecordStore, Resource, Session, SessionEvent, TokenVault};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

/// Live wiring: REST backend for auth and records, `V` for the token.
pub struct ApiRuntime<'a, V: TokenVault> {
    vault: &'a V,
    client: Client,
    session: Session,
    users: CrudStore,
    pages: CrudStore,
    poll_interval: Duration,
}

impl<'a, V: TokenVault> ApiRuntime<'a, V> {
    pub fn new(vault: &'a V, client: Client, session: Session, poll_interval: Duration) -> Self {
        let users = CrudStore::new(client.clone(), ResourcePaths::for_resource(Resource::Users));
        let pages = CrudStore::new(client.clone(), ResourcePaths::for_resource(Resource::Pages));
        Self {
            vault,
            client,
            session,
            users,
            pages,
            poll_interval,
        }
    }

    /// Hands the session's current token to every record store.
    fn share_token(&mut self) {
        let token = self.session.token().map(str::to_owned);
        debug!(present = token.is_some(), "sharing session token with stores");
        self.users.set_token(token.as_deref());
        self.pages.set_token(token.as_deref());
    }
}

impl<V: TokenVault> primrose_tui::AppRuntime for ApiRuntime<'_, V> {
    fn session(&self) -> &Session {
        &self.session
    }

    fn restore_session(&mut self) -> Vec<SessionEvent> {
        let events = self.session.try_load_stored_token(self.vault);
        self.share_token();
        events
    }

    fn check_health(&mut self, now: OffsetDateTime) -> Vec<SessionEvent> {
        self.session.check_health(&self.client, now)
    }

    fn tick(&mut self, now: OffsetDateTime) -> Vec<SessionEvent> {
        self.session.tick(now)
    }

    fn login(&mut self, username: &str, password: &str) -> Vec<SessionEvent> {
        let events = self
            .session
            .login(&self.client, self.vault, username, password);
        self.share_token();
        events
    }

    fn logout(&mut self) -> Vec<SessionEvent> {
        let events = self.session.logout();
        self.share_token();
        events
    }

    fn health_poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn store(&self, resource: Resource) -> &dyn RecordStore {
        match resource {
            Resource::Users => &self.users,
            Resource::Pages => &self.pages,
        }
    }

    fn store_mut(&mut self, resource: Resource) -> &mut dyn RecordStore {
        match resource {
            Resource::Users => &mut self.users,
            Resource::Pages => &mut self.pages,
        }
    }
}
