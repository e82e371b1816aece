use bson::{Document, doc};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::User;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("no fields to update")]
    EmptyUpdate,
}

fn check_email(email: &str) -> Result<(), ValidationError> {
    let bad = || ValidationError::InvalidEmail(email.to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(bad());
    }
    let Some((local, domain)) = email.split_once('@') else { return Err(bad()) };
    if local.is_empty() || domain.contains('@') {
        return Err(bad());
    }
    match domain.split_once('.') {
        Some((host, _)) if !host.is_empty() && !domain.ends_with('.') => Ok(()),
        _ => Err(bad()),
    }
}

/// Request body for creating a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserDto {
    pub name: String,
    pub email: String,
}

impl CreateUserDto {
    #[must_use]
    pub fn new(name: &str, email: &str) -> Self {
        Self { name: name.to_string(), email: email.to_string() }
    }

    /// Trims both fields, then checks they are present and the email is well formed.
    ///
    /// # Errors
    /// The first failing rule.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        if self.name.is_empty() {
            return Err(ValidationError::Required("name"));
        }
        if self.email.is_empty() {
            return Err(ValidationError::Required("email"));
        }
        check_email(&self.email)
    }
}

impl From<CreateUserDto> for User {
    fn from(dto: CreateUserDto) -> Self {
        Self { name: dto.name, email: dto.email, ..Self::default() }
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UpdateUserDto {
    /// # Errors
    /// `EmptyUpdate` when no field is set, otherwise the first failing rule.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if let Some(name) = self.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(ValidationError::Required("name"));
            }
        }
        if let Some(email) = self.email.as_mut() {
            *email = email.trim().to_lowercase();
            check_email(email)?;
        }
        if self.name.is_none() && self.email.is_none() {
            return Err(ValidationError::EmptyUpdate);
        }
        Ok(())
    }

    /// The `$set` body for the present fields.
    #[must_use]
    pub fn to_set_document(&self) -> Document {
        let mut set = Document::new();
        if let Some(name) = &self.name {
            set.insert("name", name.as_str());
        }
        if let Some(email) = &self.email {
            set.insert("email", email.as_str());
        }
        set
    }

    #[must_use]
    pub fn to_update(&self, now: bson::DateTime) -> Document {
        let mut set = self.to_set_document();
        set.insert("updated_at", now);
        doc! { "$set": set }
    }
}

/// Outgoing representation of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

fn rfc3339(at: Option<bson::DateTime>) -> String {
    at.and_then(|d| chrono::DateTime::from_timestamp_millis(d.timestamp_millis()))
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

impl From<&User> for UserResponseDto {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: u.name.clone(),
            email: u.email.clone(),
            created_at: rfc3339(u.created_at),
            updated_at: rfc3339(u.updated_at),
        }
    }
}

impl From<User> for UserResponseDto {
    fn from(u: User) -> Self {
        Self::from(&u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validation() {
        let mut ok = CreateUserDto::new("  Aman ", "Aman@Gmail.com ");
        assert!(ok.validate().is_ok());
        assert_eq!(ok, CreateUserDto::new("Aman", "aman@gmail.com"));

        assert_eq!(CreateUserDto::new("", "a@b.c").validate(), Err(ValidationError::Required("name")));
        for bad in ["nope", "@x.io", "a@b", "a b@c.io", "a@b.", "a@@b.io"] {
            assert!(
                matches!(CreateUserDto::new("n", bad).validate(), Err(ValidationError::InvalidEmail(_))),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn update_builds_set_document() {
        let mut upd = UpdateUserDto { name: Some(" Zed ".into()), email: None };
        upd.validate().unwrap();
        assert_eq!(upd.to_set_document(), doc! { "name": "Zed" });
        assert_eq!(UpdateUserDto::default().validate(), Err(ValidationError::EmptyUpdate));
    }

    #[test]
    fn response_formats_times() {
        let mut u = User::new("a", "a@x.io");
        u.id = Some(bson::oid::ObjectId::new());
        u.created_at = Some(bson::DateTime::from_millis(0));
        let dto = UserResponseDto::from(&u);
        assert_eq!(dto.id.len(), 24);
        assert_eq!(dto.created_at, "1970-01-01T00:00:00.000Z");
        assert_eq!(dto.updated_at, "");
    }
}
