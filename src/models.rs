use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const DEFAULT_PHONE_LABEL: &str = "Mobile";
const DEFAULT_EMAIL_LABEL: &str = "Personal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Free,
    Premium,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Admin => "admin",
        }
    }
}

/// The already-authenticated caller on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user(user_id: u64) -> Self {
        Self::new(UserId(user_id), Role::Free)
    }

    pub fn admin(user_id: u64) -> Self {
        Self::new(UserId(user_id), Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub label: String,
    pub number: String,
}

impl PhoneNumber {
    pub fn new(label: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            number: number.into(),
        }
    }

    /// Parses `Label:Number`; a bare number gets the `Mobile` label.
    pub fn parse(raw: &str) -> Option<Self> {
        split_labeled(raw, DEFAULT_PHONE_LABEL).map(|(label, number)| Self::new(label, number))
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub label: String,
    pub address: String,
}

impl EmailAddress {
    pub fn new(label: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            address: address.into(),
        }
    }

    /// Parses `Label:address`; a bare address gets the `Personal` label.
    pub fn parse(raw: &str) -> Option<Self> {
        split_labeled(raw, DEFAULT_EMAIL_LABEL).map(|(label, address)| Self::new(label, address))
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.address)
    }
}

fn split_labeled(raw: &str, default_label: &str) -> Option<(String, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.split_once(':') {
        Some((label, value)) => Some((label.trim().to_string(), value.trim().to_string())),
        None => Some((default_label.to_string(), raw.to_string())),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonPayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationPayload {
    pub name: String,
    pub department: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactSortOrder {
    #[default]
    NameAsc,
    NameDesc,
    NewestFirst,
    OldestFirst,
    MostAccessed,
}

impl ContactSortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NameAsc => "name-asc",
            Self::NameDesc => "name-desc",
            Self::NewestFirst => "newest-first",
            Self::OldestFirst => "oldest-first",
            Self::MostAccessed => "most-accessed",
        }
    }
}

/// Serializable read model handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub id: Uuid,
    pub owner_id: UserId,
    pub kind: String,
    pub display_name: String,
    pub active: bool,
    pub access_count: u32,
    pub tags: Vec<String>,
    pub phone_numbers: Vec<PhoneNumber>,
    pub email_addresses: Vec<EmailAddress>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: Uuid,
    pub owner_id: UserId,
    pub name: String,
    pub member_count: usize,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub log_filter: String,
    pub max_undo_depth: Option<usize>,
    pub default_sort: ContactSortOrder,
    pub mask_emails: bool,
    pub upper_case_details: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            max_undo_depth: None,
            default_sort: ContactSortOrder::NameAsc,
            mask_emails: false,
            upper_case_details: false,
        }
    }
}
