// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

pub const LOGIN_FAILED_MESSAGE: &str = "Username or password are wrong, please, check.";

const MIN_USERNAME_LEN: usize = 4;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginField {
    #[default]
    Username,
    Password,
}

impl LoginField {
    pub const fn next(self) -> Self {
        match self {
            Self::Username => Self::Password,
            Self::Password => Self::Username,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub focus: LoginField,
    pub error: Option<String>,
}

impl LoginForm {
    pub fn field_mut(&mut self, field: LoginField) -> &mut String {
        match field {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn push_char(&mut self, ch: char) {
        self.field_mut(self.focus).push(ch);
    }

    pub fn pop_char(&mut self) {
        self.field_mut(self.focus).pop();
    }

    /// Whether the submit action is offered at all.
    pub fn can_submit(&self) -> bool {
        self.username.chars().count() >= MIN_USERNAME_LEN
            && self.password.chars().count() >= MIN_PASSWORD_LEN
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.password.is_empty() {
            bail!("Please enter both username and password.");
        }
        Ok(())
    }

    /// Validates and returns the credentials, recording any error on the form.
    pub fn submit(&mut self) -> Option<(String, String)> {
        self.error = None;
        if let Err(error) = self.validate() {
            self.error = Some(error.to_string());
            return None;
        }
        if !self.can_submit() {
            return None;
        }
        Some((self.username.clone(), self.password.clone()))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
