// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Column derivation for the generic record table.
//!
//! The model never owns data. It reads the table configuration, the rows on
//! screen and, when a row is being created, the create buffer, and answers
//! which keys are shown, what they are called, and whether they can be edited.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::record::{Record, display_value};

pub const PASSWORD_MASK: &str = "******";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    #[default]
    Text,
    Boolean,
    Select,
    Password,
}

pub type CellRenderer = fn(&Record) -> String;

#[derive(Debug, Clone, Default)]
pub struct ColumnDefinition {
    pub key: String,
    pub display_name: Option<String>,
    pub header_content: Option<String>,
    pub field_type: FieldType,
    pub select_options: Option<Vec<String>>,
    pub multiple: bool,
    pub read_only: Option<bool>,
    pub render: Option<CellRenderer>,
}

impl ColumnDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    pub fn select_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn render(mut self, render: CellRenderer) -> Self {
        self.render = Some(render);
        self
    }
}

/// Table-level knobs. Empty lists mean "not configured".
#[derive(Debug, Clone, Default)]
pub struct TableConfig {
    pub headers: Vec<String>,
    pub column_definitions: Vec<ColumnDefinition>,
    pub exclude_fields: Vec<String>,
    pub exclude_on_create: Vec<String>,
    pub create_fields: Vec<String>,
    pub edit_fields: Vec<String>,
    pub read_only_fields: Vec<String>,
    pub disabled_rows: BTreeSet<usize>,
    pub editable: bool,
    pub deletable: bool,
    pub creatable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMode {
    Display,
    Create,
}

/// How a field is edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Editor {
    Boolean,
    Select { options: Vec<String>, multiple: bool },
    Password,
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnModel<'a> {
    config: &'a TableConfig,
    rows: &'a [Record],
    create_buffer: Option<&'a Map<String, Value>>,
}

impl<'a> ColumnModel<'a> {
    pub fn new(
        config: &'a TableConfig,
        rows: &'a [Record],
        create_buffer: Option<&'a Map<String, Value>>,
    ) -> Self {
        Self {
            config,
            rows,
            create_buffer,
        }
    }

    fn base_keys(&self) -> Vec<String> {
        if !self.config.column_definitions.is_empty() {
            return self
                .config
                .column_definitions
                .iter()
                .map(|definition| definition.key.clone())
                .collect();
        }
        if !self.config.headers.is_empty() {
            return self
                .config
                .headers
                .iter()
                .map(|header| normalize_header(header))
                .collect();
        }
        if let Some(first) = self.rows.first() {
            return first.keys().map(str::to_owned).collect();
        }
        match self.create_buffer {
            Some(buffer) if !buffer.is_empty() => buffer.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn effective_columns(&self, mode: ColumnMode) -> Vec<String> {
        let base = self.base_keys();
        match mode {
            ColumnMode::Create if !self.config.create_fields.is_empty() => {
                self.config.create_fields.clone()
            }
            ColumnMode::Create => without(base, &self.config.exclude_on_create),
            ColumnMode::Display => without(base, &self.config.exclude_fields),
        }
    }

    /// Display keys followed by any creation-only keys.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = self.effective_columns(ColumnMode::Display);
        for key in self.effective_columns(ColumnMode::Create) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn definition(&self, key: &str) -> Option<&'a ColumnDefinition> {
        self.config
            .column_definitions
            .iter()
            .find(|definition| definition.key == key)
    }

    pub fn display_name_of(&self, key: &str) -> String {
        if let Some(definition) = self.definition(key) {
            if let Some(name) = &definition.display_name {
                return name.clone();
            }
            if let Some(content) = &definition.header_content {
                return content.clone();
            }
        }
        if let Some(header) = self
            .config
            .headers
            .iter()
            .find(|header| normalize_header(header) == key)
        {
            return header.clone();
        }
        humanize(key)
    }

    pub fn field_type_of(&self, key: &str) -> FieldType {
        self.definition(key)
            .map(|definition| definition.field_type)
            .unwrap_or_default()
    }

    pub fn is_editable(&self, key: &str, mode: ColumnMode) -> bool {
        match mode {
            ColumnMode::Display => {
                if !self.config.edit_fields.is_empty() {
                    return self.config.edit_fields.iter().any(|field| field == key);
                }
                !self.is_read_only(key)
            }
            ColumnMode::Create => {
                if !self.config.create_fields.is_empty() {
                    return self.config.create_fields.iter().any(|field| field == key);
                }
                if self.is_read_only(key) {
                    return false;
                }
                self.effective_columns(ColumnMode::Create)
                    .iter()
                    .chain(self.effective_columns(ColumnMode::Display).iter())
                    .any(|candidate| candidate == key)
            }
        }
    }

    fn is_read_only(&self, key: &str) -> bool {
        let listed = self.config.read_only_fields.iter().any(|field| field == key);
        self.definition(key)
            .and_then(|definition| definition.read_only)
            .unwrap_or(listed)
    }

    pub fn editor_for(&self, key: &str) -> Editor {
        let Some(definition) = self.definition(key) else {
            return Editor::Text;
        };
        match (&definition.field_type, &definition.select_options) {
            (FieldType::Boolean, _) => Editor::Boolean,
            (FieldType::Select, Some(options)) => Editor::Select {
                options: options.clone(),
                multiple: definition.multiple,
            },
            (_, Some(options)) => Editor::Select {
                options: options.clone(),
                multiple: false,
            },
            (FieldType::Password, None) => Editor::Password,
            _ => Editor::Text,
        }
    }

    /// Text shown for a cell that is not being edited.
    pub fn resting_text(&self, record: &Record, key: &str) -> String {
        if let Some(definition) = self.definition(key) {
            if let Some(render) = definition.render {
                return render(record);
            }
            if definition.field_type == FieldType::Password {
                return PASSWORD_MASK.to_owned();
            }
        }
        record.text(key)
    }
}

/// Text shown inside an editor for a buffered value.
pub fn editor_text(editor: &Editor, value: Option<&Value>) -> String {
    match (editor, value) {
        (Editor::Boolean, None) => "false".to_owned(),
        (Editor::Select { options, multiple }, None) if !multiple => {
            options.first().cloned().unwrap_or_default()
        }
        (Editor::Password, Some(value)) => "*".repeat(display_value(value).chars().count()),
        (_, Some(value)) => display_value(value),
        (_, None) => String::new(),
    }
}

/// Splits a comma-joined multi-select value.
pub fn selected_options(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Adds or removes one option, keeping the option list's order.
pub fn toggle_option(current: &str, option: &str, options: &[String]) -> String {
    let mut selected = selected_options(current);
    if let Some(position) = selected.iter().position(|value| value == option) {
        selected.remove(position);
    } else {
        selected.push(option.to_owned());
    }
    options
        .iter()
        .filter(|candidate| selected.contains(candidate))
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

pub fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut in_space = false;
    for ch in header.to_lowercase().chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

pub fn humanize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.map(|ch| if ch == '_' { ' ' } else { ch }))
            .collect(),
        None => String::new(),
    }
}

fn without(keys: Vec<String>, excluded: &[String]) -> Vec<String> {
    keys.into_iter()
        .filter(|key| !excluded.contains(key))
        .collect()
}
