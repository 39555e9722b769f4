// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::resources::Resource;
use crate::session::Session;
use crate::token::ROLE_WEBAPP;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Entry,
    Administration,
    WebViewApp,
}

impl Page {
    pub const ALL: [Self; 3] = [Self::Entry, Self::Administration, Self::WebViewApp];
    pub const SIDEBAR: [Self; 2] = [Self::Administration, Self::WebViewApp];

    pub const fn path(self) -> &'static str {
        match self {
            Self::Entry => "/",
            Self::Administration => "/administration",
            Self::WebViewApp => "/web_view_app",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Entry => "Home",
            Self::Administration => "Administration",
            Self::WebViewApp => "Web View App",
        }
    }

    pub const fn required_roles(self) -> &'static [&'static str] {
        match self {
            Self::Entry | Self::Administration => &[],
            Self::WebViewApp => &[ROLE_WEBAPP],
        }
    }

    pub const fn is_protected(self) -> bool {
        !matches!(self, Self::Entry)
    }

    pub const fn resource(self) -> Option<Resource> {
        match self {
            Self::Entry => None,
            Self::Administration => Some(Resource::Users),
            Self::WebViewApp => Some(Resource::Pages),
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|page| page.path() == path)
    }
}

/// Protected pages need a healthy backend, a login, and one of the page's
/// roles when it names any.
pub fn has_access(page: Page, session: &Session) -> bool {
    if !page.is_protected() {
        return true;
    }
    let required = page.required_roles();
    session.is_healthy()
        && session.is_logged_in()
        && (required.is_empty()
            || required
                .iter()
                .any(|role| session.allowed_roles().contains(*role)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub page: Page,
    pub focus: Focus,
    pub sidebar_index: usize,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            page: Page::Entry,
            focus: Focus::Content,
            sidebar_index: 0,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    Navigate(Page),
    NextSidebarItem,
    PrevSidebarItem,
    OpenSelected,
    ToggleFocus,
    GoHome,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    PageChanged(Page),
    AccessDenied(Page),
    FocusChanged(Focus),
    SidebarMoved(usize),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand, session: &Session) -> Vec<AppEvent> {
        match command {
            AppCommand::Navigate(page) => self.navigate(page, session),
            AppCommand::NextSidebarItem => self.move_sidebar(1),
            AppCommand::PrevSidebarItem => self.move_sidebar(-1),
            AppCommand::OpenSelected => {
                let page = Page::SIDEBAR[self.sidebar_index % Page::SIDEBAR.len()];
                self.navigate(page, session)
            }
            AppCommand::ToggleFocus => {
                self.focus = match self.focus {
                    Focus::Sidebar => Focus::Content,
                    Focus::Content => Focus::Sidebar,
                };
                vec![AppEvent::FocusChanged(self.focus)]
            }
            AppCommand::GoHome => self.navigate(Page::Entry, session),
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    /// Falls back to the entry page when the current page is no longer
    /// reachable. Call after every session change.
    pub fn enforce_access(&mut self, session: &Session) -> Vec<AppEvent> {
        if has_access(self.page, session) {
            return Vec::new();
        }
        let denied = self.page;
        self.page = Page::Entry;
        vec![AppEvent::AccessDenied(denied), AppEvent::PageChanged(Page::Entry)]
    }

    pub fn set_status(&mut self, message: impl Into<String>) -> AppEvent {
        let message = message.into();
        self.status_line = Some(message.clone());
        AppEvent::StatusUpdated(message)
    }

    fn navigate(&mut self, page: Page, session: &Session) -> Vec<AppEvent> {
        if !has_access(page, session) {
            let mut events = vec![
                AppEvent::AccessDenied(page),
                self.set_status(format!("{} is not available", page.label())),
            ];
            if self.page != Page::Entry {
                self.page = Page::Entry;
                events.push(AppEvent::PageChanged(Page::Entry));
            }
            return events;
        }
        if let Some(index) = Page::SIDEBAR.iter().position(|candidate| *candidate == page) {
            self.sidebar_index = index;
        }
        self.page = page;
        self.focus = Focus::Content;
        vec![AppEvent::PageChanged(page)]
    }

    fn move_sidebar(&mut self, delta: isize) -> Vec<AppEvent> {
        let len = Page::SIDEBAR.len() as isize;
        let next = (self.sidebar_index as isize + delta).rem_euclid(len) as usize;
        self.sidebar_index = next;
        vec![AppEvent::SidebarMoved(next)]
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppState, Focus, Page, has_access};
    use crate::session::{AuthBackend, HealthStatus, Session, TokenVault};
    use anyhow::Result;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;
    use std::cell::RefCell;
    use time::OffsetDateTime;

    struct Backend {
        token: String,
    }

    impl AuthBackend for Backend {
        fn check_health(&self) -> Result<HealthStatus> {
            Ok(HealthStatus::Healthy)
        }

        fn login(&self, _username: &str, _password: &str) -> Result<String> {
            Ok(self.token.clone())
        }
    }

    #[derive(Default)]
    struct Vault(RefCell<Option<String>>);

    impl TokenVault for Vault {
        fn load_token(&self) -> Result<Option<String>> {
            Ok(self.0.borrow().clone())
        }

        fn save_token(&self, token: &str) -> Result<()> {
            *self.0.borrow_mut() = Some(token.to_owned());
            Ok(())
        }
    }

    fn session_with_roles(roles: &[&str], healthy: bool) -> Session {
        let payload = URL_SAFE_NO_PAD.encode(json!({ "roles": roles }).to_string());
        let backend = Backend {
            token: format!("h.{payload}.s"),
        };
        let mut session = Session::default();
        let now = OffsetDateTime::UNIX_EPOCH;
        if healthy {
            session.check_health(&backend, now);
        }
        session.login(&backend, &Vault::default(), "ada", "secret1");
        session
    }

    #[test]
    fn entry_page_is_always_reachable() {
        assert!(has_access(Page::Entry, &Session::default()));
    }

    #[test]
    fn protected_pages_need_health_and_login() {
        let unhealthy = session_with_roles(&["ADMIN"], false);
        assert!(!has_access(Page::Administration, &unhealthy));

        let healthy = session_with_roles(&["ADMIN"], true);
        assert!(has_access(Page::Administration, &healthy));
        assert!(!has_access(Page::WebViewApp, &healthy));

        let webapp = session_with_roles(&["WEBAPP"], true);
        assert!(has_access(Page::WebViewApp, &webapp));
    }

    #[test]
    fn denied_navigation_stays_on_entry() {
        let session = session_with_roles(&["ADMIN"], true);
        let mut state = AppState::default();

        let events = state.dispatch(AppCommand::Navigate(Page::WebViewApp), &session);
        assert_eq!(state.page, Page::Entry);
        assert_eq!(
            events,
            vec![
                AppEvent::AccessDenied(Page::WebViewApp),
                AppEvent::StatusUpdated("Web View App is not available".to_owned()),
            ]
        );
    }

    #[test]
    fn open_selected_uses_sidebar_cursor() {
        let session = session_with_roles(&["ADMIN", "WEBAPP"], true);
        let mut state = AppState {
            focus: Focus::Sidebar,
            ..AppState::default()
        };

        state.dispatch(AppCommand::PrevSidebarItem, &session);
        assert_eq!(state.sidebar_index, 1);
        let events = state.dispatch(AppCommand::OpenSelected, &session);
        assert_eq!(events, vec![AppEvent::PageChanged(Page::WebViewApp)]);
        assert_eq!(state.focus, Focus::Content);
    }

    #[test]
    fn logout_forces_fallback_to_entry() {
        let mut session = session_with_roles(&["ADMIN"], true);
        let mut state = AppState::default();
        state.dispatch(AppCommand::Navigate(Page::Administration), &session);
        assert!(state.enforce_access(&session).is_empty());

        session.logout();
        let events = state.enforce_access(&session);
        assert_eq!(state.page, Page::Entry);
        assert_eq!(
            events,
            vec![
                AppEvent::AccessDenied(Page::Administration),
                AppEvent::PageChanged(Page::Entry),
            ]
        );
    }

    #[test]
    fn pages_resolve_from_paths() {
        assert_eq!(Page::from_path("/web_view_app"), Some(Page::WebViewApp));
        assert_eq!(Page::from_path("/nope"), None);
        assert!(!Page::SIDEBAR.contains(&Page::Entry));
    }
}
