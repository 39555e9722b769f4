// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::record::{Record, RecordId};

/// Progress and last failure of a record store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatus {
    pub is_loading: bool,
    pub is_updating: bool,
    pub error: Option<String>,
}

/// Create/read/update/delete collaborator for one resource.
///
/// Operations never fail to the caller. Failures land in
/// [`StoreStatus::error`] and the in-progress flags are always reset.
pub trait RecordStore {
    fn records(&self) -> &[Record];
    fn status(&self) -> &StoreStatus;
    fn fetch_data(&mut self);
    fn create_item(&mut self, item: &Record);
    fn update_item(&mut self, id: &RecordId, item: &Record);
    fn delete_item(&mut self, id: &RecordId);
}
