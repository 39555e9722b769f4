// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Reads claims out of a bearer token's payload segment.
//!
//! Signatures are never verified here. The results only decide what the UI
//! shows; the server remains the authority on every request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_WEBAPP: &str = "WEBAPP";

/// Claim names that may carry roles, in lookup order.
pub const ROLE_CLAIMS: [&str; 7] = [
    "roles",
    "role",
    "scope",
    "Roles",
    "Role",
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/role",
];

/// Counts when truthy in any way.
const ADMIN_FLAG_CLAIM: &str = "isAdmin";
/// Count only as `true` or `"true"`.
const STRICT_ADMIN_FLAG_CLAIMS: [&str; 2] = ["IsAdmin", "isadmin"];

pub type Claims = Map<String, Value>;

pub fn decode(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let normalized = payload
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_");

    let bytes = match URL_SAFE_NO_PAD.decode(normalized) {
        Ok(bytes) => bytes,
        Err(error) => {
            debug!(%error, "token payload is not base64url");
            return None;
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Some(claims),
        Ok(_) => {
            debug!("token payload is not a JSON object");
            None
        }
        Err(error) => {
            debug!(%error, "token payload is not JSON");
            None
        }
    }
}

pub fn roles_of(token: &str) -> BTreeSet<String> {
    let Some(claims) = decode(token) else {
        return BTreeSet::new();
    };

    let Some(value) = ROLE_CLAIMS
        .iter()
        .filter_map(|name| claims.get(*name))
        .find(|value| is_truthy(value))
    else {
        return BTreeSet::new();
    };

    match value {
        Value::Array(items) => items.iter().map(claim_text).collect(),
        scalar => BTreeSet::from([claim_text(scalar)]),
    }
}

pub fn is_admin_of(token: &str) -> bool {
    let Some(claims) = decode(token) else {
        return false;
    };

    let flagged = claims.get(ADMIN_FLAG_CLAIM).is_some_and(is_truthy)
        || STRICT_ADMIN_FLAG_CLAIMS
            .iter()
            .filter_map(|name| claims.get(*name))
            .any(|value| match value {
                Value::Bool(flag) => *flag,
                Value::String(text) => text == "true",
                _ => false,
            });

    flagged || roles_of(token).contains(ROLE_ADMIN)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn claim_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, is_admin_of, roles_of};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;

    fn token_with(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    fn roles(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn malformed_tokens_decode_to_nothing() {
        for token in ["", "abc", "a.%%%.c", "a..c", "a.bm90IGpzb24.c"] {
            assert!(decode(token).is_none(), "token {token:?} should not decode");
            assert!(roles_of(token).is_empty());
            assert!(!is_admin_of(token));
        }
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let token = token_with(json!(["ADMIN"]));
        assert!(decode(&token).is_none());
    }

    #[test]
    fn padded_standard_alphabet_payload_still_decodes() {
        let payload = base64::engine::general_purpose::STANDARD.encode(r#"{"role":"x?>"}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(roles_of(&token), roles(&["x?>"]));
    }

    #[test]
    fn roles_claim_array_is_collected() {
        let token = token_with(json!({"roles": ["ADMIN", "WEBAPP"]}));
        assert_eq!(roles_of(&token), roles(&["ADMIN", "WEBAPP"]));
    }

    #[test]
    fn scalar_role_becomes_single_element_set() {
        let token = token_with(json!({"role": "WEBAPP"}));
        assert_eq!(roles_of(&token), roles(&["WEBAPP"]));
    }

    #[test]
    fn first_present_claim_wins_in_lookup_order() {
        let token = token_with(json!({"Role": "LATE", "role": "EARLY"}));
        assert_eq!(roles_of(&token), roles(&["EARLY"]));
    }

    #[test]
    fn empty_claim_falls_through_to_next_name() {
        let token = token_with(json!({"roles": "", "scope": "WEBAPP"}));
        assert_eq!(roles_of(&token), roles(&["WEBAPP"]));
    }

    #[test]
    fn namespaced_role_claim_is_recognized() {
        let token = token_with(json!({
            "http://schemas.microsoft.com/ws/2008/06/identity/claims/role": ["WEBAPP"]
        }));
        assert_eq!(roles_of(&token), roles(&["WEBAPP"]));
    }

    #[test]
    fn non_string_roles_are_stringified() {
        let token = token_with(json!({"roles": [1, true]}));
        assert_eq!(roles_of(&token), roles(&["1", "true"]));
    }

    #[test]
    fn admin_flag_accepts_bool_and_string_across_casings() {
        assert!(is_admin_of(&token_with(json!({"isAdmin": true}))));
        assert!(is_admin_of(&token_with(json!({"IsAdmin": "true"}))));
        assert!(is_admin_of(&token_with(json!({"isadmin": true}))));
        assert!(!is_admin_of(&token_with(json!({"isAdmin": false}))));
        assert!(!is_admin_of(&token_with(json!({"IsAdmin": "false"}))));
    }

    #[test]
    fn camel_case_admin_flag_counts_any_truthy_value() {
        assert!(is_admin_of(&token_with(json!({"isAdmin": 1}))));
        assert!(is_admin_of(&token_with(json!({"isAdmin": "yes"}))));
        assert!(is_admin_of(&token_with(json!({"isAdmin": "false"}))));
        assert!(!is_admin_of(&token_with(json!({"isAdmin": 0}))));
        assert!(!is_admin_of(&token_with(json!({"isAdmin": ""}))));
        assert!(!is_admin_of(&token_with(json!({"isAdmin": null}))));
    }

    #[test]
    fn other_admin_flag_casings_need_literal_true() {
        assert!(!is_admin_of(&token_with(json!({"IsAdmin": 1}))));
        assert!(!is_admin_of(&token_with(json!({"isadmin": "yes"}))));
        assert!(is_admin_of(&token_with(json!({"isadmin": "true"}))));
    }

    #[test]
    fn admin_role_grants_admin_rights() {
        assert!(is_admin_of(&token_with(json!({"roles": ["ADMIN"]}))));
        assert!(!is_admin_of(&token_with(json!({"roles": ["admin"]}))));
    }
}
