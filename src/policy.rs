use crate::contact::{ContactDraft, ContactKind};
use crate::errors::{AppError, AppResult};
use crate::models::{Requester, UserId};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_NAME_LENGTH: usize = 200;
const MAX_TAG_LENGTH: usize = 64;
const MAX_CHANNELS_PER_CONTACT: usize = 20;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+$").expect("valid email regex"));

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ().-]{5,19}$").expect("valid phone regex"));

pub fn require_non_blank(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "{} exceeds {} characters",
            field, MAX_NAME_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Blank optional text collapses to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

pub fn validate_email(address: &str) -> AppResult<()> {
    if !EMAIL_PATTERN.is_match(address) {
        return Err(AppError::Validation(format!("Invalid email format: {}", address)));
    }
    Ok(())
}

pub fn validate_phone_number(number: &str) -> AppResult<()> {
    if !PHONE_PATTERN.is_match(number) {
        return Err(AppError::Validation(format!("Invalid phone number: {}", number)));
    }
    Ok(())
}

pub fn validate_tag_name(name: &str) -> AppResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Tag cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TAG_LENGTH {
        return Err(AppError::Validation(format!(
            "Tag exceeds {} characters",
            MAX_TAG_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_group_name(name: &str) -> AppResult<String> {
    require_non_blank(name, "Group name")
}

/// Checks everything [`crate::contact::Contact::new`] relies on.
pub fn validate_draft(draft: &ContactDraft) -> AppResult<()> {
    match &draft.kind {
        ContactKind::Person {
            first_name,
            last_name,
        } => {
            if first_name.trim().is_empty() && last_name.trim().is_empty() {
                return Err(AppError::Validation(
                    "At least one name (first or last) is required".to_string(),
                ));
            }
            if !first_name.trim().is_empty() {
                require_non_blank(first_name, "First name")?;
            }
            if !last_name.trim().is_empty() {
                require_non_blank(last_name, "Last name")?;
            }
        }
        ContactKind::Organization { name, .. } => {
            require_non_blank(name, "Organization name")?;
        }
    }

    if draft.phone_numbers.len() > MAX_CHANNELS_PER_CONTACT
        || draft.email_addresses.len() > MAX_CHANNELS_PER_CONTACT
    {
        return Err(AppError::Validation(format!(
            "A contact may hold at most {} phone numbers and {} email addresses",
            MAX_CHANNELS_PER_CONTACT, MAX_CHANNELS_PER_CONTACT
        )));
    }
    for phone in &draft.phone_numbers {
        validate_phone_number(&phone.number)?;
    }
    for email in &draft.email_addresses {
        validate_email(&email.address)?;
    }
    Ok(())
}

pub fn can_access(requester: &Requester, owner_id: UserId) -> bool {
    requester.is_admin() || requester.user_id == owner_id
}

pub fn ensure_owner_or_admin(requester: &Requester, owner_id: UserId, action: &str) -> AppResult<()> {
    if can_access(requester, owner_id) {
        return Ok(());
    }
    Err(AppError::AccessDenied(format!("You cannot {}", action)))
}
