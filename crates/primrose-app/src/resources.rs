// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Per-resource table policies.

use std::collections::BTreeSet;

use crate::columns::{ColumnDefinition, FieldType, TableConfig};
use crate::record::Record;
use crate::session::Session;
use crate::token::{ROLE_ADMIN, ROLE_WEBAPP};

pub const ADMINS_PATH: &str = "/api/admins";
pub const PAGES_PATH: &str = "/api/pages";
pub const PAGES_ADMIN_PATH: &str = "/api/pages/admin";

pub const ALL_SYSTEM_ROLES: [&str; 2] = [ROLE_ADMIN, ROLE_WEBAPP];

/// Spellings of system roles inside user records.
const DATA_ROLE_ALIASES: [(&str, &str); 2] = [(ROLE_ADMIN, "Admin"), (ROLE_WEBAPP, "web_app")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Users,
    Pages,
}

impl Resource {
    pub const ALL: [Self; 2] = [Self::Users, Self::Pages];

    pub const fn base_path(self) -> &'static str {
        match self {
            Self::Users => ADMINS_PATH,
            Self::Pages => PAGES_PATH,
        }
    }

    /// List endpoint, when it differs from the base path.
    pub const fn fetch_path(self) -> Option<&'static str> {
        match self {
            Self::Users => None,
            Self::Pages => Some(PAGES_ADMIN_PATH),
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::Users => "User Management",
            Self::Pages => "Pages",
        }
    }
}

pub fn is_main_admin(session: &Session) -> bool {
    session.allowed_roles().contains(ROLE_ADMIN)
}

/// Rows the viewer may see, in server order.
pub fn visible_rows(resource: Resource, records: &[Record], session: &Session) -> Vec<Record> {
    match resource {
        Resource::Users => visible_users(records, session),
        Resource::Pages => records.to_vec(),
    }
}

pub fn visible_users(records: &[Record], session: &Session) -> Vec<Record> {
    if is_main_admin(session) {
        return records.to_vec();
    }
    let viewer: BTreeSet<String> = session
        .allowed_roles()
        .iter()
        .flat_map(|role| role_spellings(role))
        .collect();
    records
        .iter()
        .filter(|record| {
            record
                .text("role")
                .split(',')
                .map(|role| role.trim().to_lowercase())
                .any(|role| viewer.contains(&role))
        })
        .cloned()
        .collect()
}

fn role_spellings(role: &str) -> Vec<String> {
    let mut spellings = vec![role.to_lowercase()];
    spellings.extend(
        DATA_ROLE_ALIASES
            .iter()
            .filter(|(system, _)| *system == role)
            .map(|(_, data)| data.to_lowercase()),
    );
    spellings
}

pub fn user_role_options(session: &Session) -> Vec<String> {
    let main_admin = is_main_admin(session);
    ALL_SYSTEM_ROLES
        .iter()
        .filter(|role| main_admin || session.allowed_roles().contains(**role))
        .map(|role| (*role).to_owned())
        .collect()
}

pub fn user_columns(session: &Session) -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::new("username").display_name("User Name"),
        ColumnDefinition::new("password")
            .field_type(FieldType::Password)
            .display_name("Password"),
        ColumnDefinition::new("passwordHash"),
        ColumnDefinition::new("isAdmin")
            .field_type(FieldType::Boolean)
            .display_name("Is Admin"),
        ColumnDefinition::new("role")
            .display_name("Roles")
            .field_type(FieldType::Select)
            .select_options(user_role_options(session))
            .multiple(true),
        ColumnDefinition::new("createdAt").display_name("Created At"),
    ]
}

pub fn table_config(resource: Resource, session: &Session) -> TableConfig {
    match resource {
        Resource::Users => {
            let admin = session.has_admin_rights();
            let editable_fields = strings(&["username", "password", "isAdmin", "role"]);
            TableConfig {
                column_definitions: user_columns(session),
                exclude_fields: strings(&["id", "passwordHash"]),
                create_fields: editable_fields.clone(),
                edit_fields: editable_fields,
                read_only_fields: strings(&["createdAt"]),
                disabled_rows: if is_main_admin(session) {
                    BTreeSet::from([0])
                } else {
                    BTreeSet::new()
                },
                editable: admin,
                deletable: admin,
                creatable: admin,
                ..TableConfig::default()
            }
        }
        Resource::Pages => TableConfig {
            exclude_on_create: strings(&["id"]),
            read_only_fields: strings(&["id"]),
            editable: true,
            deletable: true,
            creatable: true,
            ..TableConfig::default()
        },
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::{Resource, table_config, user_role_options, visible_rows};
    use crate::columns::{ColumnMode, ColumnModel};
    use crate::record::Record;
    use crate::session::{AuthBackend, HealthStatus, Session, TokenVault};
    use anyhow::Result;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::{Value, json};

    struct Backend(String);

    impl AuthBackend for Backend {
        fn check_health(&self) -> Result<HealthStatus> {
            Ok(HealthStatus::Healthy)
        }

        fn login(&self, _username: &str, _password: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct NoVault;

    impl TokenVault for NoVault {
        fn load_token(&self) -> Result<Option<String>> {
            Ok(None)
        }

        fn save_token(&self, _token: &str) -> Result<()> {
            Ok(())
        }
    }

    fn viewer(claims: Value) -> Session {
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let mut session = Session::default();
        session.login(&Backend(format!("h.{payload}.s")), &NoVault, "viewer", "secret1");
        session
    }

    fn users() -> Vec<Record> {
        vec![
            Record::new().with("id", 1).with("username", "root").with("role", "ADMIN"),
            Record::new().with("id", 2).with("username", "web").with("role", "Admin, web_app"),
            Record::new().with("id", 3).with("username", "ops").with("role", "ops"),
        ]
    }

    #[test]
    fn main_admin_sees_everyone_and_first_row_is_locked() {
        let session = viewer(json!({"roles": ["ADMIN"]}));
        let rows = visible_rows(Resource::Users, &users(), &session);
        assert_eq!(rows.len(), 3);

        let config = table_config(Resource::Users, &session);
        assert!(config.disabled_rows.contains(&0));
        assert!(config.editable && config.deletable && config.creatable);
        assert_eq!(user_role_options(&session), vec!["ADMIN", "WEBAPP"]);
    }

    #[test]
    fn other_viewers_see_users_sharing_a_role() {
        let session = viewer(json!({"roles": ["WEBAPP", "ops"]}));
        let rows = visible_rows(Resource::Users, &users(), &session);
        let names: Vec<String> = rows.iter().map(|row| row.text("username")).collect();
        assert_eq!(names, vec!["web", "ops"]);

        let config = table_config(Resource::Users, &session);
        assert!(config.disabled_rows.is_empty());
        assert!(!config.editable);
        assert_eq!(user_role_options(&session), vec!["WEBAPP"]);
    }

    #[test]
    fn admin_flag_without_admin_role_grants_editing_only() {
        let session = viewer(json!({"isAdmin": true, "roles": ["WEBAPP"]}));
        let config = table_config(Resource::Users, &session);
        assert!(config.editable);
        assert!(config.disabled_rows.is_empty());
    }

    #[test]
    fn user_table_hides_identity_and_hash_columns() {
        let session = viewer(json!({"roles": ["ADMIN"]}));
        let config = table_config(Resource::Users, &session);
        let rows = users();
        let model = ColumnModel::new(&config, &rows, None);
        assert_eq!(
            model.effective_columns(ColumnMode::Display),
            vec!["username", "password", "isAdmin", "role", "createdAt"]
        );
        assert_eq!(
            model.effective_columns(ColumnMode::Create),
            vec!["username", "password", "isAdmin", "role"]
        );
        assert!(!model.is_editable("createdAt", ColumnMode::Display));
        assert_eq!(model.display_name_of("isAdmin"), "Is Admin");
    }

    #[test]
    fn pages_are_fully_editable_except_id() {
        let session = viewer(json!({"roles": ["WEBAPP"]}));
        let config = table_config(Resource::Pages, &session);
        let rows = vec![Record::new().with("id", 4).with("description", "d").with("url", "u")];
        let model = ColumnModel::new(&config, &rows, None);
        assert_eq!(
            model.effective_columns(ColumnMode::Create),
            vec!["description", "url"]
        );
        assert!(model.is_editable("url", ColumnMode::Display));
        assert!(!model.is_editable("id", ColumnMode::Display));
        assert_eq!(Resource::Pages.fetch_path(), Some("/api/pages/admin"));
    }
}
