// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Edit and create buffers for the generic record table.
//!
//! Rows are addressed by their index in the list currently on screen. The
//! editor resolves index to record to id before it touches the store.

use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::columns::{ColumnModel, FieldType, TableConfig};
use crate::record::Record;
use crate::store::RecordStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableEditState {
    pub editing_row_index: Option<usize>,
    pub edit_buffer: Map<String, Value>,
    pub is_creating_new_row: bool,
    pub create_buffer: Map<String, Value>,
}

impl TableEditState {
    pub fn is_idle(&self) -> bool {
        self.editing_row_index.is_none() && !self.is_creating_new_row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    Edit,
    Create,
}

#[derive(Debug, Clone, Default)]
pub struct TableEditor {
    config: TableConfig,
    state: TableEditState,
}

impl TableEditor {
    pub fn new(config: TableConfig) -> Self {
        Self {
            config,
            state: TableEditState::default(),
        }
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn state(&self) -> &TableEditState {
        &self.state
    }

    /// Swaps the policy, e.g. after the viewer's roles change. Any open
    /// buffer is dropped.
    pub fn reconfigure(&mut self, config: TableConfig) {
        self.config = config;
        self.cancel();
    }

    pub fn columns<'a>(&'a self, rows: &'a [Record]) -> ColumnModel<'a> {
        let create_buffer = self
            .state
            .is_creating_new_row
            .then_some(&self.state.create_buffer);
        ColumnModel::new(&self.config, rows, create_buffer)
    }

    pub fn is_row_disabled(&self, index: usize) -> bool {
        self.config.disabled_rows.contains(&index)
    }

    pub fn can_edit_row(&self, index: usize) -> bool {
        self.config.editable && !self.is_row_disabled(index)
    }

    pub fn can_delete_row(&self, index: usize) -> bool {
        self.config.deletable && !self.is_row_disabled(index)
    }

    pub fn begin_edit(&mut self, rows: &[Record], index: usize) -> bool {
        let Some(record) = rows.get(index) else {
            return false;
        };
        if !self.can_edit_row(index) {
            return false;
        }
        self.cancel();
        self.state.editing_row_index = Some(index);
        self.state.edit_buffer = record.fields().clone();
        true
    }

    pub fn begin_create(&mut self) -> bool {
        if !self.config.creatable {
            return false;
        }
        self.cancel();
        self.state.is_creating_new_row = true;
        true
    }

    /// Writes a raw value into the active buffer. Writes to an inactive
    /// buffer are dropped.
    pub fn change_field(&mut self, key: &str, value: Value, target: BufferTarget) {
        let buffer = match target {
            BufferTarget::Edit if self.state.editing_row_index.is_some() => {
                &mut self.state.edit_buffer
            }
            BufferTarget::Create if self.state.is_creating_new_row => {
                &mut self.state.create_buffer
            }
            _ => {
                debug!(key, ?target, "ignoring change to inactive buffer");
                return;
            }
        };
        buffer.insert(key.to_owned(), value);
    }

    pub fn buffered(&self, key: &str, target: BufferTarget) -> Option<&Value> {
        match target {
            BufferTarget::Edit => self.state.edit_buffer.get(key),
            BufferTarget::Create => self.state.create_buffer.get(key),
        }
    }

    /// Sends the merged, coerced row to the store and closes the editor,
    /// whatever the store does with it.
    pub fn commit_edit<S>(&mut self, rows: &[Record], store: &mut S) -> Option<Record>
    where
        S: RecordStore + ?Sized,
    {
        let index = self.state.editing_row_index?;
        let buffer = std::mem::take(&mut self.state.edit_buffer);
        self.cancel();

        let Some(original) = rows.get(index) else {
            warn!(index, "edited row is no longer on screen");
            return None;
        };
        let Some(id) = original.id() else {
            warn!(index, "edited row has no id");
            return None;
        };

        let mut merged = original.clone();
        for (key, value) in buffer {
            let value = self.coerce(&key, original.get(&key), value);
            merged.insert(key, value);
        }

        store.update_item(&id, &merged);
        Some(merged)
    }

    pub fn commit_create<S>(&mut self, store: &mut S) -> Option<Record>
    where
        S: RecordStore + ?Sized,
    {
        if !self.state.is_creating_new_row {
            return None;
        }
        let buffer = std::mem::take(&mut self.state.create_buffer);
        self.cancel();

        let mut created = Record::new();
        for (key, value) in buffer {
            let value = self.coerce(&key, None, value);
            created.insert(key, value);
        }

        store.create_item(&created);
        Some(created)
    }

    pub fn cancel(&mut self) {
        self.state = TableEditState::default();
    }

    pub fn delete<S>(&mut self, rows: &[Record], index: usize, store: &mut S) -> bool
    where
        S: RecordStore + ?Sized,
    {
        if !self.can_delete_row(index) {
            return false;
        }
        let Some(id) = rows.get(index).and_then(Record::id) else {
            warn!(index, "cannot delete a row without an id");
            return false;
        };
        store.delete_item(&id);
        true
    }

    fn coerce(&self, key: &str, original: Option<&Value>, value: Value) -> Value {
        // Numeric originals win over the column's declared type.
        if let (Some(Value::Number(_)), Value::String(text)) = (original, &value) {
            return parse_number(text);
        }
        let field_type = ColumnModel::new(&self.config, &[], None).field_type_of(key);
        if field_type != FieldType::Boolean {
            return value;
        }
        let flag = match &value {
            Value::Bool(flag) => *flag,
            Value::String(text) => text == "true",
            _ => false,
        };
        Value::Bool(flag)
    }
}

/// Numeric reading of edited text: blank is zero, unparseable is null.
pub fn parse_number(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::from(0);
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }
    let Ok(float) = trimmed.parse::<f64>() else {
        return Value::Null;
    };
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
        return Value::from(float as i64);
    }
    Number::from_f64(float).map_or(Value::Null, Value::Number)
}
