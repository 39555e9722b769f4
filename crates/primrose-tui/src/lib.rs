// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use primrose_app::{
    AppCommand, AppEvent, AppState, BufferTarget, ColumnMode, Editor, Focus, HealthStatus,
    LOGIN_FAILED_MESSAGE, LoginField, LoginForm, Page, Record, RecordStore, Resource, Session,
    SessionEvent, TableEditor, editor_text, has_access, table_config, toggle_option,
    visible_rows,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::macros::format_description;

const SIDEBAR_WIDTH: u16 = 30;
const LOCK_MARK: &str = "🔒";
const UNHEALTHY_TEXT: &str = "Application is not healthy. Refresh state in the Sidebar, if the issue persist, Please contact administrator.";

/// Everything the UI needs from the outside world.
pub trait AppRuntime {
    fn session(&self) -> &Session;
    fn restore_session(&mut self) -> Vec<SessionEvent>;
    fn check_health(&mut self, now: OffsetDateTime) -> Vec<SessionEvent>;
    fn tick(&mut self, now: OffsetDateTime) -> Vec<SessionEvent>;
    fn login(&mut self, username: &str, password: &str) -> Vec<SessionEvent>;
    fn logout(&mut self) -> Vec<SessionEvent>;
    fn health_poll_interval(&self) -> Duration;
    fn store(&self, resource: Resource) -> &dyn RecordStore;
    fn store_mut(&mut self, resource: Resource) -> &mut dyn RecordStore;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug, Clone, Default)]
struct TableView {
    editor: TableEditor,
    selected_row: usize,
    selected_field: usize,
    option_cursor: usize,
    loaded: bool,
}

#[derive(Debug, Clone, Default)]
struct ViewData {
    login: LoginForm,
    tables: BTreeMap<Resource, TableView>,
    help_visible: bool,
    status_token: u64,
    last_health_poll: Option<Instant>,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    sync_tables(&*runtime, &mut view_data);
    let restored = runtime.restore_session();
    apply_session_events(state, runtime, &mut view_data, &internal_tx, restored);

    let mut result = Ok(());
    loop {
        process_internal_events(state, &view_data, &internal_rx);
        poll_health(state, runtime, &mut view_data, &internal_tx, Instant::now());

        if let Err(error) = terminal.draw(|frame| render(frame, state, runtime, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.status_line = None;
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

/// Fires the rate-limit timer and issues a health check when the poll
/// interval has elapsed.
fn poll_health<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    now: Instant,
) {
    let wall_clock = OffsetDateTime::now_utc();
    let mut events = runtime.tick(wall_clock);

    let due = view_data
        .last_health_poll
        .is_none_or(|last| now.duration_since(last) >= runtime.health_poll_interval());
    if due {
        view_data.last_health_poll = Some(now);
        events.extend(runtime.check_health(wall_clock));
    }

    apply_session_events(state, runtime, view_data, internal_tx, events);
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.set_status(message);
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn sync_tables<R: AppRuntime>(runtime: &R, view_data: &mut ViewData) {
    for resource in Resource::ALL {
        let view = view_data.tables.entry(resource).or_default();
        view.editor
            .reconfigure(table_config(resource, runtime.session()));
        view.loaded = false;
        view.selected_field = 0;
        view.option_cursor = 0;
    }
}

fn apply_session_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    events: Vec<SessionEvent>,
) {
    if events.is_empty() {
        return;
    }

    let identity_changed = events.iter().any(|event| {
        matches!(
            event,
            SessionEvent::LoggedIn { .. }
                | SessionEvent::LoggedOut
                | SessionEvent::TokenRestored
                | SessionEvent::LoginFailed(_)
        )
    });
    if identity_changed {
        sync_tables(&*runtime, view_data);
    }

    for event in events {
        let message = match event {
            SessionEvent::LoggedIn { username } => Some(format!("logged in as {username}")),
            SessionEvent::LoggedOut => Some("logged out".to_owned()),
            SessionEvent::TokenRestored => Some("session restored".to_owned()),
            SessionEvent::RateLimitLifted => Some("health checks resumed".to_owned()),
            SessionEvent::HealthChecked(HealthStatus::RateLimited) => {
                Some("health check rate limited; retrying later".to_owned())
            }
            _ => None,
        };
        if let Some(message) = message {
            emit_status(state, view_data, internal_tx, message);
        }
    }

    let access = state.enforce_access(runtime.session());
    if let Some(AppEvent::AccessDenied(page)) = access.first() {
        let message = format!("{} is not available; returned home", page.label());
        emit_status(state, view_data, internal_tx, message);
    }

    if let Some(resource) = state.page.resource() {
        ensure_loaded(runtime, view_data, resource);
    }
}

fn ensure_loaded<R: AppRuntime>(runtime: &mut R, view_data: &mut ViewData, resource: Resource) {
    let Some(view) = view_data.tables.get_mut(&resource) else {
        return;
    };
    if view.loaded {
        return;
    }
    runtime.store_mut(resource).fetch_data();
    view.loaded = true;
    let rows = visible_rows_for(&*runtime, resource).len();
    view.selected_row = view.selected_row.min(rows.saturating_sub(1));
}

fn visible_rows_for<R: AppRuntime>(runtime: &R, resource: Resource) -> Vec<Record> {
    visible_rows(
        resource,
        runtime.store(resource).records(),
        runtime.session(),
    )
}

fn dispatch_page_command<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command, runtime.session());
    for event in events {
        match event {
            AppEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(internal_tx, view_data.status_token);
            }
            AppEvent::PageChanged(page) => {
                if let Some(resource) = page.resource() {
                    ensure_loaded(runtime, view_data, resource);
                }
            }
            _ => {}
        }
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('q') {
        return true;
    }

    if ctrl && key.code == KeyCode::Char('r') {
        view_data.last_health_poll = Some(Instant::now());
        let events = runtime.check_health(OffsetDateTime::now_utc());
        if events.contains(&SessionEvent::HealthCheckSkipped) {
            emit_status(state, view_data, internal_tx, "health check paused while rate limited");
        }
        apply_session_events(state, runtime, view_data, internal_tx, events);
        return false;
    }

    if ctrl && key.code == KeyCode::Char('l') {
        if runtime.session().is_logged_in() {
            let events = runtime.logout();
            view_data.login.clear();
            apply_session_events(state, runtime, view_data, internal_tx, events);
        } else {
            emit_status(state, view_data, internal_tx, "not logged in");
        }
        return false;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    match state.focus {
        Focus::Sidebar => handle_sidebar_key(state, runtime, view_data, internal_tx, key),
        Focus::Content => match state.page.resource() {
            Some(resource) => {
                handle_table_key(state, runtime, view_data, internal_tx, resource, key);
            }
            None => handle_entry_key(state, runtime, view_data, internal_tx, key),
        },
    }
    false
}

fn handle_sidebar_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let command = match key.code {
        KeyCode::Up | KeyCode::Char('k') => AppCommand::PrevSidebarItem,
        KeyCode::Down | KeyCode::Char('j') => AppCommand::NextSidebarItem,
        KeyCode::Enter => AppCommand::OpenSelected,
        KeyCode::Home | KeyCode::Char('g') => AppCommand::GoHome,
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') | KeyCode::Esc => {
            AppCommand::ToggleFocus
        }
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            return;
        }
        _ => return,
    };
    dispatch_page_command(state, runtime, view_data, internal_tx, command);
}

fn handle_entry_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let session = runtime.session();
    let login_open = session.is_healthy() && !session.is_logged_in();

    if key.code == KeyCode::Esc || (!login_open && key.code == KeyCode::Tab) {
        dispatch_page_command(state, runtime, view_data, internal_tx, AppCommand::ToggleFocus);
        return;
    }
    if !login_open || runtime.session().is_logging_in() {
        return;
    }

    let form = &mut view_data.login;
    match key.code {
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            form.focus = form.focus.next();
        }
        KeyCode::Backspace => form.pop_char(),
        KeyCode::Char(ch) if is_typing(key) => form.push_char(ch),
        KeyCode::Enter => {
            let Some((username, password)) = form.submit() else {
                return;
            };
            let events = runtime.login(&username, &password);
            if runtime.session().is_logged_in() {
                view_data.login.clear();
            } else {
                view_data.login.password.clear();
                view_data.login.focus = LoginField::Password;
            }
            apply_session_events(state, runtime, view_data, internal_tx, events);
        }
        _ => {}
    }
}

fn is_typing(key: KeyEvent) -> bool {
    key.modifiers == KeyModifiers::NONE || key.modifiers == KeyModifiers::SHIFT
}

fn handle_table_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    resource: Resource,
    key: KeyEvent,
) {
    let editing = view_data
        .tables
        .get(&resource)
        .is_some_and(|view| !view.editor.state().is_idle());
    if editing {
        handle_edit_key(state, runtime, view_data, internal_tx, resource, key);
        return;
    }

    let rows = visible_rows_for(&*runtime, resource);
    let Some(view) = view_data.tables.get_mut(&resource) else {
        return;
    };

    let message = match key.code {
        KeyCode::Esc | KeyCode::Tab => {
            dispatch_page_command(state, runtime, view_data, internal_tx, AppCommand::ToggleFocus);
            return;
        }
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            return;
        }
        KeyCode::Up | KeyCode::Char('k') => {
            view.selected_row = view.selected_row.saturating_sub(1);
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if view.selected_row + 1 < rows.len() {
                view.selected_row += 1;
            }
            None
        }
        KeyCode::Char('e') => {
            if view.editor.begin_edit(&rows, view.selected_row) {
                view.selected_field = 0;
                view.option_cursor = 0;
                Some("editing row".to_owned())
            } else if view.editor.is_row_disabled(view.selected_row) {
                Some("row is locked".to_owned())
            } else {
                Some("editing is not allowed here".to_owned())
            }
        }
        KeyCode::Char('n') => {
            if view.editor.begin_create() {
                view.selected_field = 0;
                view.option_cursor = 0;
                Some("new row".to_owned())
            } else {
                Some("creating is not allowed here".to_owned())
            }
        }
        KeyCode::Char('d') => {
            let store = runtime.store_mut(resource);
            if view.editor.delete(&rows, view.selected_row, store) {
                let remaining = visible_rows_for(&*runtime, resource).len();
                view.selected_row = view.selected_row.min(remaining.saturating_sub(1));
                Some(
                    runtime
                        .store(resource)
                        .status()
                        .error
                        .clone()
                        .unwrap_or_else(|| "deleted".to_owned()),
                )
            } else if view.editor.is_row_disabled(view.selected_row) {
                Some("row is locked".to_owned())
            } else {
                Some("deleting is not allowed here".to_owned())
            }
        }
        KeyCode::Char('r') => {
            runtime.store_mut(resource).fetch_data();
            view.loaded = true;
            Some(
                runtime
                    .store(resource)
                    .status()
                    .error
                    .clone()
                    .unwrap_or_else(|| "refreshed".to_owned()),
            )
        }
        _ => None,
    };

    if let Some(message) = message {
        emit_status(state, view_data, internal_tx, message);
    }
}

/// Keys of the fields the open buffer can change, in column order.
fn active_fields(editor: &TableEditor, rows: &[Record]) -> Vec<String> {
    let model = editor.columns(rows);
    if editor.state().is_creating_new_row {
        model
            .all_keys()
            .into_iter()
            .filter(|key| model.is_editable(key, ColumnMode::Create))
            .collect()
    } else {
        model
            .effective_columns(ColumnMode::Display)
            .into_iter()
            .filter(|key| model.is_editable(key, ColumnMode::Display))
            .collect()
    }
}

fn buffer_target(editor: &TableEditor) -> BufferTarget {
    if editor.state().is_creating_new_row {
        BufferTarget::Create
    } else {
        BufferTarget::Edit
    }
}

fn handle_edit_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    resource: Resource,
    key: KeyEvent,
) {
    let rows = visible_rows_for(&*runtime, resource);
    let Some(view) = view_data.tables.get_mut(&resource) else {
        return;
    };
    let target = buffer_target(&view.editor);
    let fields = active_fields(&view.editor, &rows);

    let message = match key.code {
        KeyCode::Esc => {
            view.editor.cancel();
            Some("canceled".to_owned())
        }
        KeyCode::Enter => {
            let store = runtime.store_mut(resource);
            let sent = match target {
                BufferTarget::Create => view.editor.commit_create(store),
                BufferTarget::Edit => view.editor.commit_edit(&rows, store),
            };
            let error = runtime.store(resource).status().error.clone();
            let remaining = visible_rows_for(&*runtime, resource).len();
            view.selected_row = view.selected_row.min(remaining.saturating_sub(1));
            match (sent, error) {
                (_, Some(error)) => Some(error),
                (Some(_), None) => Some("saved".to_owned()),
                (None, None) => Some("nothing to save".to_owned()),
            }
        }
        KeyCode::Tab | KeyCode::Right if !fields.is_empty() => {
            view.selected_field = (view.selected_field + 1) % fields.len();
            view.option_cursor = 0;
            None
        }
        KeyCode::BackTab | KeyCode::Left if !fields.is_empty() => {
            view.selected_field = (view.selected_field + fields.len() - 1) % fields.len();
            view.option_cursor = 0;
            None
        }
        _ => {
            if let Some(field) = fields.get(view.selected_field) {
                edit_field(view, &rows, field, target, key);
            }
            None
        }
    };

    if let Some(message) = message {
        emit_status(state, view_data, internal_tx, message);
    }
}

fn edit_field(view: &mut TableView, rows: &[Record], field: &str, target: BufferTarget, key: KeyEvent) {
    let editor_kind = view.editor.columns(rows).editor_for(field);
    let current = view.editor.buffered(field, target).cloned();
    let current_text = editor_text(&editor_kind, current.as_ref());

    let next = match (&editor_kind, key.code) {
        (Editor::Boolean, KeyCode::Char(' ') | KeyCode::Up | KeyCode::Down) => {
            let flag = matches!(&current, Some(Value::Bool(true)))
                || matches!(&current, Some(Value::String(text)) if text == "true");
            Some(Value::Bool(!flag))
        }
        (
            Editor::Select {
                options,
                multiple: false,
            },
            KeyCode::Char(' ') | KeyCode::Up | KeyCode::Down,
        ) if !options.is_empty() => {
            let position = options
                .iter()
                .position(|option| *option == current_text)
                .unwrap_or(0);
            let next = if key.code == KeyCode::Up {
                (position + options.len() - 1) % options.len()
            } else if current.is_none() {
                position
            } else {
                (position + 1) % options.len()
            };
            Some(Value::String(options[next].clone()))
        }
        (
            Editor::Select {
                options,
                multiple: true,
            },
            KeyCode::Up | KeyCode::Down,
        ) if !options.is_empty() => {
            let len = options.len();
            view.option_cursor = if key.code == KeyCode::Up {
                (view.option_cursor + len - 1) % len
            } else {
                (view.option_cursor + 1) % len
            };
            None
        }
        (
            Editor::Select {
                options,
                multiple: true,
            },
            KeyCode::Char(' '),
        ) => options.get(view.option_cursor).map(|option| {
            let selected = current.as_ref().map(primrose_app::display_value).unwrap_or_default();
            Value::String(toggle_option(&selected, option, options))
        }),
        (Editor::Text | Editor::Password, KeyCode::Char(ch)) if is_typing(key) => {
            let mut text = current.as_ref().map(primrose_app::display_value).unwrap_or_default();
            text.push(ch);
            Some(Value::String(text))
        }
        (Editor::Text | Editor::Password, KeyCode::Backspace) => {
            let mut text = current.as_ref().map(primrose_app::display_value).unwrap_or_default();
            text.pop();
            Some(Value::String(text))
        }
        _ => None,
    };

    if let Some(value) = next {
        view.editor.change_field(field, value, target);
    }
}

fn render<R: AppRuntime>(
    frame: &mut ratatui::Frame<'_>,
    state: &AppState,
    runtime: &R,
    view_data: &ViewData,
) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(frame.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
        .split(outer[0]);

    let session = runtime.session();
    let sidebar = Paragraph::new(sidebar_text(state, session))
        .block(focus_block("Navigation", state.focus == Focus::Sidebar));
    frame.render_widget(sidebar, columns[0]);

    match state.page.resource() {
        Some(resource) => render_table_page(frame, columns[1], state, runtime, view_data, resource),
        None => {
            let entry = Paragraph::new(entry_text(session, &view_data.login))
                .wrap(Wrap { trim: false })
                .block(focus_block("primrose", state.focus == Focus::Content));
            frame.render_widget(entry, columns[1]);
        }
    }

    let status = Paragraph::new(status_text(state, session, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, outer[1]);

    if view_data.help_visible {
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn focus_block(title: &str, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .title(title.to_owned())
        .borders(Borders::ALL)
        .border_style(style)
}

fn health_label(session: &Session) -> &'static str {
    if session.is_health_check_in_progress() {
        "checking"
    } else if session.is_rate_limited() {
        "rate limited"
    } else if session.is_healthy() {
        "healthy"
    } else {
        "unhealthy"
    }
}

fn format_check_time(at: Option<OffsetDateTime>) -> String {
    let Some(at) = at else {
        return "never".to_owned();
    };
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

fn sidebar_text(state: &AppState, session: &Session) -> String {
    let mut lines = vec![
        "Health Check".to_owned(),
        format!("  status: {}", health_label(session)),
        format!(
            "  Check Time: {}",
            format_check_time(session.last_health_check_time())
        ),
        String::new(),
    ];

    for (index, page) in Page::SIDEBAR.iter().enumerate() {
        let cursor = if state.focus == Focus::Sidebar && index == state.sidebar_index {
            ">"
        } else {
            " "
        };
        let current = if *page == state.page { "*" } else { " " };
        let lock = if has_access(*page, session) {
            String::new()
        } else {
            format!(" {LOCK_MARK}")
        };
        lines.push(format!("{cursor}{current} {}{lock}", page.label()));
    }

    lines.push(String::new());
    if session.is_logged_in() {
        let name = if session.login_name().is_empty() {
            "(restored session)"
        } else {
            session.login_name()
        };
        lines.push(format!("user: {name}"));
        if !session.allowed_roles().is_empty() {
            let roles = session
                .allowed_roles()
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(",");
            lines.push(format!("roles: {roles}"));
        }
    } else {
        lines.push("not logged in".to_owned());
    }
    lines.join("\n")
}

fn entry_text(session: &Session, login: &LoginForm) -> String {
    let mut lines = vec!["Welcome to the Primrose General".to_owned(), String::new()];

    if !session.is_healthy() {
        lines.push(UNHEALTHY_TEXT.to_owned());
        return lines.join("\n");
    }

    if session.is_logged_in() {
        lines.push(format!("You are logged in as {}.", session.login_name()));
        lines.push("Choose an administration area in the Sidebar.".to_owned());
        return lines.join("\n");
    }

    lines.push("Log in using the form to access the administration areas.".to_owned());
    lines.push(String::new());
    if session.last_login_failed() {
        lines.push(LOGIN_FAILED_MESSAGE.to_owned());
    }
    lines.push("Login".to_owned());
    lines.push("Enter your credentials to access the application.".to_owned());

    let marker = |field: LoginField| if login.focus == field { ">" } else { " " };
    lines.push(format!(
        "{} Username: {}",
        marker(LoginField::Username),
        login.username
    ));
    lines.push(format!(
        "{} Password: {}",
        marker(LoginField::Password),
        "*".repeat(login.password.chars().count())
    ));
    if let Some(error) = &login.error {
        lines.push(error.clone());
    }

    let action = if session.is_logging_in() {
        "Logging in..."
    } else if login.can_submit() {
        "[enter] Login"
    } else {
        "Login (needs a username over 3 and a password over 5 characters)"
    };
    lines.push(String::new());
    lines.push(action.to_owned());
    lines.join("\n")
}

/// Column keys shown for the table in its current state.
fn table_keys(editor: &TableEditor, rows: &[Record]) -> Vec<String> {
    let model = editor.columns(rows);
    if editor.state().is_creating_new_row {
        model.all_keys()
    } else {
        model.effective_columns(ColumnMode::Display)
    }
}

/// Cell text for every data row, plus the create row when one is open.
fn table_grid(view: &TableView, rows: &[Record], keys: &[String]) -> Vec<Vec<String>> {
    let model = view.editor.columns(rows);
    let state = view.editor.state();

    let mut grid = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            keys.iter()
                .map(|key| {
                    if state.editing_row_index == Some(index)
                        && model.is_editable(key, ColumnMode::Display)
                    {
                        editor_text(&model.editor_for(key), state.edit_buffer.get(key))
                    } else {
                        model.resting_text(row, key)
                    }
                })
                .collect()
        })
        .collect::<Vec<Vec<String>>>();

    if state.is_creating_new_row {
        grid.push(
            keys.iter()
                .map(|key| {
                    if model.is_editable(key, ColumnMode::Create) {
                        editor_text(&model.editor_for(key), state.create_buffer.get(key))
                    } else {
                        String::new()
                    }
                })
                .collect(),
        );
    }
    grid
}

fn render_table_page<R: AppRuntime>(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    runtime: &R,
    view_data: &ViewData,
    resource: Resource,
) {
    let focused = state.focus == Focus::Content;
    let Some(view) = view_data.tables.get(&resource) else {
        frame.render_widget(Paragraph::new("").block(focus_block(state.page.label(), focused)), area);
        return;
    };

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let status = runtime.store(resource).status();
    let headline = match &status.error {
        Some(error) => error.clone(),
        None => page_headline(state.page),
    };
    let headline_style = if status.error.is_some() {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    frame.render_widget(
        Paragraph::new(headline)
            .style(headline_style)
            .wrap(Wrap { trim: false })
            .block(Block::default().title(state.page.label()).borders(Borders::ALL)),
        layout[0],
    );

    let rows = visible_rows_for(&*runtime, resource);
    let keys = table_keys(&view.editor, &rows);
    let model = view.editor.columns(&rows);
    let grid = table_grid(view, &rows, &keys);
    let edit_state = view.editor.state();
    let fields = active_fields(&view.editor, &rows);
    let active_field = fields.get(view.selected_field);
    let create_index = edit_state.is_creating_new_row.then_some(rows.len());

    let header = Row::new(
        std::iter::once(String::new())
            .chain(keys.iter().map(|key| model.display_name_of(key)))
            .map(|label| {
                Cell::from(label).style(
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                )
            }),
    );

    let body = grid.into_iter().enumerate().map(|(row_index, cells)| {
        let open = edit_state.editing_row_index == Some(row_index) || create_index == Some(row_index);
        let marker = if create_index == Some(row_index) {
            "+".to_owned()
        } else if view.editor.is_row_disabled(row_index) {
            LOCK_MARK.to_owned()
        } else {
            String::new()
        };
        let selected_row = !edit_state.is_creating_new_row && row_index == view.selected_row;

        let data_cells = cells.into_iter().zip(keys.iter()).map(|(text, key)| {
            let mut style = Style::default();
            if selected_row && focused {
                style = style.bg(Color::DarkGray);
            }
            if open && active_field == Some(key) {
                style = Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD);
            }
            Cell::from(text).style(style)
        });
        Row::new(std::iter::once(Cell::from(marker)).chain(data_cells))
    });

    let mut widths = vec![Constraint::Length(2)];
    widths.extend(std::iter::repeat_n(Constraint::Min(8), keys.len().max(1)));

    let table = Table::new(body, widths)
        .header(header)
        .column_spacing(1)
        .block(focus_block(&table_title(resource, rows.len(), status), focused));
    frame.render_widget(table, layout[1]);
}

fn page_headline(page: Page) -> String {
    match page {
        Page::Administration => "Welcome to the administration panel.".to_owned(),
        Page::WebViewApp => "Pages published to the web view app.".to_owned(),
        Page::Entry => String::new(),
    }
}

fn table_title(resource: Resource, rows: usize, status: &primrose_app::StoreStatus) -> String {
    let mut title = format!("{} r:{rows}", resource.title());
    if status.is_loading {
        title.push_str(" loading");
    }
    if status.is_updating {
        title.push_str(" saving");
    }
    title
}

fn status_text(state: &AppState, session: &Session, view_data: &ViewData) -> String {
    let hints = match (state.focus, state.page.resource()) {
        (Focus::Sidebar, _) => {
            "j/k move | enter open | g home | tab content | ctrl+r health | ctrl+l logout | ? help | ctrl+q quit"
        }
        (Focus::Content, None) if session.is_healthy() && !session.is_logged_in() => {
            "type credentials | tab field | enter login | esc sidebar | ctrl+q quit"
        }
        (Focus::Content, None) => "esc sidebar | ctrl+r health | ctrl+q quit",
        (Focus::Content, Some(resource)) => {
            let editing = view_data
                .tables
                .get(&resource)
                .is_some_and(|view| !view.editor.state().is_idle());
            if editing {
                "tab/shift+tab field | space toggle/choose | up/down option | enter save | esc cancel"
            } else {
                "j/k row | e edit | n new | d delete | r refresh | esc sidebar | ? help"
            }
        }
    };
    match &state.status_line {
        Some(status) => format!("{status} | {hints}"),
        None => hints.to_owned(),
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ctrl+r check health | ctrl+l logout\n\
sidebar: j/k move | enter open page | g home | tab/esc content | ? help\n\
login: type | tab switch field | backspace erase | enter submit\n\
table: j/k row | e edit | n new row | d delete | r refresh | esc sidebar\n\
editing: tab/shift+tab field | space toggle boolean or choose option | up/down move option | enter save | esc cancel"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, ViewData, active_fields, entry_text, handle_key_event, poll_health,
        sidebar_text, status_text, sync_tables, table_grid, table_keys,
    };
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use primrose_app::{
        AppState, Focus, HealthStatus, LoginForm, Page, Record, RecordId, RecordStore, Resource,
        Session, SessionEvent,
    };
    use primrose_testkit::{
        AdminFaker, MemoryStore, MemoryVault, StoreCall, StubBackend, admin_token, webapp_token,
    };
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};
    use time::OffsetDateTime;

    struct TestRuntime {
        session: Session,
        backend: StubBackend,
        vault: MemoryVault,
        users: MemoryStore,
        pages: MemoryStore,
    }

    impl TestRuntime {
        fn new(backend: StubBackend) -> Self {
            let mut faker = AdminFaker::new(3);
            Self {
                session: Session::default(),
                backend,
                vault: MemoryVault::default(),
                users: MemoryStore::with_records(faker.users(3)),
                pages: MemoryStore::with_records(faker.pages(2)),
            }
        }

        fn healthy_admin() -> Self {
            Self::new(StubBackend::healthy().accepting(&admin_token()))
        }
    }

    impl AppRuntime for TestRuntime {
        fn session(&self) -> &Session {
            &self.session
        }

        fn restore_session(&mut self) -> Vec<SessionEvent> {
            self.session.try_load_stored_token(&self.vault)
        }

        fn check_health(&mut self, now: OffsetDateTime) -> Vec<SessionEvent> {
            self.session.check_health(&self.backend, now)
        }

        fn tick(&mut self, now: OffsetDateTime) -> Vec<SessionEvent> {
            self.session.tick(now)
        }

        fn login(&mut self, username: &str, password: &str) -> Vec<SessionEvent> {
            self.session
                .login(&self.backend, &self.vault, username, password)
        }

        fn logout(&mut self) -> Vec<SessionEvent> {
            self.session.logout()
        }

        fn health_poll_interval(&self) -> Duration {
            Duration::from_secs(30)
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

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    struct Harness {
        state: AppState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: mpsc::Sender<super::InternalEvent>,
        _rx: mpsc::Receiver<super::InternalEvent>,
    }

    impl Harness {
        fn new(runtime: TestRuntime) -> Self {
            let (tx, rx) = mpsc::channel();
            let mut harness = Self {
                state: AppState::default(),
                runtime,
                view_data: ViewData::default(),
                tx,
                _rx: rx,
            };
            sync_tables(&harness.runtime, &mut harness.view_data);
            poll_health(
                &mut harness.state,
                &mut harness.runtime,
                &mut harness.view_data,
                &harness.tx,
                Instant::now(),
            );
            harness
        }

        fn press(&mut self, event: KeyEvent) -> bool {
            handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                event,
            )
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(key(KeyCode::Char(ch)));
            }
        }

        fn log_in(&mut self) {
            self.type_text("admin");
            self.press(key(KeyCode::Tab));
            self.type_text("hunter22");
            self.press(key(KeyCode::Enter));
        }

        fn open_sidebar_page(&mut self, page: Page) {
            if self.state.focus == Focus::Content {
                self.press(key(KeyCode::Esc));
            }
            while Page::SIDEBAR[self.state.sidebar_index] != page {
                self.press(key(KeyCode::Down));
            }
            self.press(key(KeyCode::Enter));
        }
    }

    #[test]
    fn ctrl_q_quits() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        assert!(harness.press(ctrl('q')));
    }

    #[test]
    fn first_poll_checks_health_and_later_polls_wait_for_interval() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        assert!(harness.runtime.session.is_healthy());
        assert_eq!(harness.runtime.backend.health_calls(), 1);

        let soon = Instant::now();
        poll_health(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            soon,
        );
        assert_eq!(harness.runtime.backend.health_calls(), 1);
    }

    #[test]
    fn login_form_submits_credentials_and_clears_itself() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();

        assert!(harness.runtime.session.is_logged_in());
        assert_eq!(harness.runtime.session.login_name(), "admin");
        assert_eq!(harness.view_data.login, LoginForm::default());
        assert_eq!(harness.runtime.vault.stored(), Some(admin_token()));
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some("logged in as admin")
        );
    }

    #[test]
    fn short_credentials_do_not_reach_backend() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.type_text("abc");
        harness.press(key(KeyCode::Tab));
        harness.type_text("123456");
        harness.press(key(KeyCode::Enter));

        assert_eq!(harness.runtime.backend.login_calls(), 0);
        assert!(!harness.runtime.session.is_logged_in());
    }

    #[test]
    fn failed_login_shows_message_and_keeps_username() {
        let mut harness = Harness::new(TestRuntime::new(StubBackend::healthy()));
        harness.log_in();

        assert!(harness.runtime.session.last_login_failed());
        assert_eq!(harness.view_data.login.username, "admin");
        assert!(harness.view_data.login.password.is_empty());
        let text = entry_text(&harness.runtime.session, &harness.view_data.login);
        assert!(text.contains("Username or password are wrong, please, check."));
    }

    #[test]
    fn opening_administration_fetches_users_once() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);

        assert_eq!(harness.state.page, Page::Administration);
        assert_eq!(harness.runtime.users.calls, vec![StoreCall::Fetch]);

        harness.open_sidebar_page(Page::Administration);
        assert_eq!(harness.runtime.users.calls, vec![StoreCall::Fetch]);

        harness.press(key(KeyCode::Char('r')));
        assert_eq!(
            harness.runtime.users.calls,
            vec![StoreCall::Fetch, StoreCall::Fetch]
        );
    }

    #[test]
    fn pages_need_webapp_role() {
        let mut harness = Harness::new(TestRuntime::new(
            StubBackend::healthy().accepting(&webapp_token()),
        ));
        harness.log_in();
        harness.open_sidebar_page(Page::WebViewApp);
        assert_eq!(harness.state.page, Page::WebViewApp);

        let mut admin_only = Harness::new(TestRuntime::new(StubBackend::healthy().accepting(
            &primrose_testkit::unsigned_token(&json!({"roles": ["ADMIN"]})),
        )));
        admin_only.log_in();
        admin_only.open_sidebar_page(Page::WebViewApp);
        assert_eq!(admin_only.state.page, Page::Entry);
    }

    #[test]
    fn main_admin_cannot_edit_first_row() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);

        harness.press(key(KeyCode::Char('e')));
        assert_eq!(harness.state.status_line.as_deref(), Some("row is locked"));
        harness.press(key(KeyCode::Char('d')));
        assert_eq!(harness.runtime.users.records.len(), 3);
    }

    #[test]
    fn editing_a_user_sends_merged_row() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);

        harness.press(key(KeyCode::Down));
        harness.press(key(KeyCode::Char('e')));
        harness.type_text("x");
        harness.press(key(KeyCode::Enter));

        let original = harness.runtime.users.records[1].clone();
        let Some(StoreCall::Update(id, sent)) = harness.runtime.users.calls.last().cloned() else {
            panic!("expected an update call");
        };
        assert_eq!(id, RecordId::Number(2));
        assert!(sent.text("username").ends_with('x'));
        assert_eq!(sent.get("passwordHash"), original.get("passwordHash"));
        assert_eq!(harness.state.status_line.as_deref(), Some("saved"));
    }

    #[test]
    fn creating_a_user_coerces_admin_flag() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);

        harness.press(key(KeyCode::Char('n')));
        harness.type_text("newuser");
        harness.press(key(KeyCode::Tab));
        harness.type_text("secret1");
        harness.press(key(KeyCode::Tab));
        harness.press(key(KeyCode::Char(' ')));
        harness.press(key(KeyCode::Tab));
        harness.press(key(KeyCode::Down));
        harness.press(key(KeyCode::Char(' ')));
        harness.press(key(KeyCode::Enter));

        let Some(StoreCall::Create(sent)) = harness.runtime.users.calls.last().cloned() else {
            panic!("expected a create call");
        };
        let expected = Record::new()
            .with("username", "newuser")
            .with("password", "secret1")
            .with("isAdmin", true)
            .with("role", "WEBAPP");
        assert_eq!(sent, expected);
        assert_eq!(harness.runtime.users.records.len(), 4);
    }

    #[test]
    fn escape_cancels_open_buffer() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);

        harness.press(key(KeyCode::Char('n')));
        harness.type_text("zzz");
        harness.press(key(KeyCode::Esc));

        let view = &harness.view_data.tables[&Resource::Users];
        assert!(view.editor.state().is_idle());
        assert_eq!(harness.runtime.users.calls, vec![StoreCall::Fetch]);
    }

    #[test]
    fn logout_returns_to_entry_page() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);

        harness.press(ctrl('l'));
        assert!(!harness.runtime.session.is_logged_in());
        assert_eq!(harness.state.page, Page::Entry);
        assert_eq!(harness.runtime.vault.stored(), Some(admin_token()));
    }

    #[test]
    fn rate_limited_manual_check_reports_pause() {
        let mut harness = Harness::new(TestRuntime::new(StubBackend::with_health([
            HealthStatus::RateLimited,
        ])));
        assert!(harness.runtime.session.is_rate_limited());

        harness.press(ctrl('r'));
        assert_eq!(harness.runtime.backend.health_calls(), 1);
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some("health check paused while rate limited")
        );
        let sidebar = sidebar_text(&harness.state, &harness.runtime.session);
        assert!(sidebar.contains("status: rate limited"));
    }

    #[test]
    fn entry_text_follows_session_state() {
        let unhealthy = Session::default();
        assert!(entry_text(&unhealthy, &LoginForm::default()).contains("Application is not healthy."));

        let mut harness = Harness::new(TestRuntime::healthy_admin());
        let logged_out = entry_text(&harness.runtime.session, &harness.view_data.login);
        assert!(logged_out.contains("Log in using the form"));

        harness.log_in();
        let logged_in = entry_text(&harness.runtime.session, &harness.view_data.login);
        assert!(logged_in.contains("You are logged in as admin."));
        assert!(logged_in.contains("Choose an administration area in the Sidebar."));
    }

    #[test]
    fn password_column_is_masked_in_grid() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);

        let view = &harness.view_data.tables[&Resource::Users];
        let rows = harness.runtime.users.records.clone();
        let keys = table_keys(&view.editor, &rows);
        assert_eq!(
            keys,
            vec!["username", "password", "isAdmin", "role", "createdAt"]
        );
        let grid = table_grid(view, &rows, &keys);
        assert_eq!(grid.len(), 3);
        assert!(grid.iter().all(|cells| cells[1] == "******"));
    }

    #[test]
    fn create_row_lists_only_creatable_fields() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);
        harness.press(key(KeyCode::Char('n')));

        let view = &harness.view_data.tables[&Resource::Users];
        let rows = harness.runtime.users.records.clone();
        assert_eq!(
            active_fields(&view.editor, &rows),
            vec!["username", "password", "isAdmin", "role"]
        );
        let grid = table_grid(view, &rows, &table_keys(&view.editor, &rows));
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[3][2], "false");
    }

    #[test]
    fn status_text_switches_hints_while_editing() {
        let mut harness = Harness::new(TestRuntime::healthy_admin());
        harness.log_in();
        harness.open_sidebar_page(Page::Administration);
        harness.state.status_line = None;

        let idle = status_text(&harness.state, &harness.runtime.session, &harness.view_data);
        assert!(idle.contains("e edit"));

        harness.press(key(KeyCode::Char('n')));
        let editing = status_text(&harness.state, &harness.runtime.session, &harness.view_data);
        assert!(editing.contains("enter save"));
    }
}
