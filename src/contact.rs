use crate::errors::{AppError, AppResult};
use crate::models::{ContactSummary, EmailAddress, PhoneNumber, UserId};
use crate::policy;
use crate::tags::{normalize_tag_name, Tag};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactKind {
    Person {
        first_name: String,
        last_name: String,
    },
    Organization {
        name: String,
        department: Option<String>,
        website: Option<String>,
    },
}

impl ContactKind {
    pub fn person(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self::Person {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    pub fn organization(name: impl Into<String>, department: Option<String>) -> Self {
        Self::Organization {
            name: name.into(),
            department,
            website: None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person { .. } => "person",
            Self::Organization { .. } => "organization",
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Person {
                first_name,
                last_name,
            } => format!("{} {}", first_name, last_name).trim().to_string(),
            Self::Organization {
                name, department, ..
            } => match department {
                Some(department) => format!("{} ({})", name, department),
                None => name.clone(),
            },
        }
    }
}

/// Validated construction input. Run [`policy::validate_draft`] before [`Contact::new`].
#[derive(Debug, Clone)]
pub struct ContactDraft {
    pub owner_id: UserId,
    pub kind: ContactKind,
    pub phone_numbers: Vec<PhoneNumber>,
    pub email_addresses: Vec<EmailAddress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub(crate) id: Uuid,
    pub(crate) owner_id: UserId,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) kind: ContactKind,
    pub(crate) active: bool,
    pub(crate) access_count: u32,
    pub(crate) tags: BTreeSet<Tag>,
    pub(crate) phone_numbers: Vec<PhoneNumber>,
    pub(crate) email_addresses: Vec<EmailAddress>,
}

impl Contact {
    pub fn new(draft: ContactDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: draft.owner_id,
            created_at: Utc::now(),
            kind: draft.kind,
            active: true,
            access_count: 0,
            tags: BTreeSet::new(),
            phone_numbers: draft.phone_numbers,
            email_addresses: draft.email_addresses,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn kind(&self) -> &ContactKind {
        &self.kind
    }

    pub fn display_name(&self) -> String {
        self.kind.display_name()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn access_count(&self) -> u32 {
        self.access_count
    }

    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(Tag::name)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        let name = normalize_tag_name(name);
        self.tags.iter().any(|tag| tag.name() == name)
    }

    pub fn phone_numbers(&self) -> &[PhoneNumber] {
        &self.phone_numbers
    }

    pub fn email_addresses(&self) -> &[EmailAddress] {
        &self.email_addresses
    }

    pub fn set_first_name(&mut self, value: &str) -> AppResult<()> {
        let value = policy::require_non_blank(value, "First name")?;
        match &mut self.kind {
            ContactKind::Person { first_name, .. } => {
                *first_name = value;
                Ok(())
            }
            ContactKind::Organization { .. } => Err(wrong_kind("first name", "organization")),
        }
    }

    pub fn set_last_name(&mut self, value: &str) -> AppResult<()> {
        let value = policy::require_non_blank(value, "Last name")?;
        match &mut self.kind {
            ContactKind::Person { last_name, .. } => {
                *last_name = value;
                Ok(())
            }
            ContactKind::Organization { .. } => Err(wrong_kind("last name", "organization")),
        }
    }

    pub fn set_organization_name(&mut self, value: &str) -> AppResult<()> {
        let value = policy::require_non_blank(value, "Organization name")?;
        match &mut self.kind {
            ContactKind::Organization { name, .. } => {
                *name = value;
                Ok(())
            }
            ContactKind::Person { .. } => Err(wrong_kind("organization name", "person")),
        }
    }

    pub fn set_department(&mut self, value: Option<&str>) -> AppResult<()> {
        match &mut self.kind {
            ContactKind::Organization { department, .. } => {
                *department = policy::optional_text(value);
                Ok(())
            }
            ContactKind::Person { .. } => Err(wrong_kind("department", "person")),
        }
    }

    pub fn set_website(&mut self, value: Option<&str>) -> AppResult<()> {
        match &mut self.kind {
            ContactKind::Organization { website, .. } => {
                *website = policy::optional_text(value);
                Ok(())
            }
            ContactKind::Person { .. } => Err(wrong_kind("website", "person")),
        }
    }

    pub fn set_phone_numbers(&mut self, phone_numbers: Vec<PhoneNumber>) -> AppResult<()> {
        for phone in &phone_numbers {
            policy::validate_phone_number(&phone.number)?;
        }
        self.phone_numbers = phone_numbers;
        Ok(())
    }

    pub fn set_email_addresses(&mut self, email_addresses: Vec<EmailAddress>) -> AppResult<()> {
        for email in &email_addresses {
            policy::validate_email(&email.address)?;
        }
        self.email_addresses = email_addresses;
        Ok(())
    }

    /// Returns false when the tag was already present.
    pub fn add_tag(&mut self, tag: Tag) -> bool {
        self.tags.insert(tag)
    }

    /// Returns false when no tag with that name was present.
    pub fn remove_tag(&mut self, name: &str) -> bool {
        let name = normalize_tag_name(name);
        let before = self.tags.len();
        self.tags.retain(|tag| tag.name() != name);
        self.tags.len() != before
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn soft_delete(&mut self) {
        self.active = false;
    }

    pub(crate) fn increment_access_count(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
    }

    pub fn details(&self) -> String {
        let mut out = format!("Name: {}\n", self.display_name());
        if let ContactKind::Organization {
            website: Some(website),
            ..
        } = &self.kind
        {
            out.push_str(&format!("Website: {}\n", website));
        }
        out.push_str(&format!("Created At: {}\n", self.created_at.to_rfc3339()));
        out.push_str(&format!("Access Count: {}\n", self.access_count));

        if !self.phone_numbers.is_empty() {
            out.push_str("Phone Numbers:\n");
            for phone in &self.phone_numbers {
                out.push_str(&format!("  - {}\n", phone));
            }
        }
        if !self.email_addresses.is_empty() {
            out.push_str("Emails:\n");
            for email in &self.email_addresses {
                out.push_str(&format!("  - {}\n", email));
            }
        }
        if !self.tags.is_empty() {
            let names = self.tag_names().collect::<Vec<_>>().join(", ");
            out.push_str(&format!("Tags: {}\n", names));
        }
        out
    }

    pub fn summary(&self) -> ContactSummary {
        ContactSummary {
            id: self.id,
            owner_id: self.owner_id,
            kind: self.kind.as_str().to_string(),
            display_name: self.display_name(),
            active: self.active,
            access_count: self.access_count,
            tags: self.tag_names().map(ToString::to_string).collect(),
            phone_numbers: self.phone_numbers.clone(),
            email_addresses: self.email_addresses.clone(),
            created_at: self.created_at,
        }
    }
}

fn wrong_kind(field: &str, kind: &str) -> AppError {
    AppError::Validation(format!("Cannot set {} on {} contact", field, kind))
}

/// Shared, individually locked contact. `id` and `owner_id` are cached since they never change.
#[derive(Clone)]
pub struct ContactHandle {
    id: Uuid,
    owner_id: UserId,
    inner: Arc<Mutex<Contact>>,
}

impl ContactHandle {
    pub fn new(contact: Contact) -> Self {
        Self {
            id: contact.id,
            owner_id: contact.owner_id,
            inner: Arc::new(Mutex::new(contact)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn read<R>(&self, f: impl FnOnce(&Contact) -> R) -> R {
        f(&self.lock())
    }

    pub fn snapshot(&self) -> Contact {
        self.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.read(Contact::is_active)
    }

    pub fn display_name(&self) -> String {
        self.read(Contact::display_name)
    }

    pub fn ptr_eq(&self, other: &ContactHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Contact> {
        // a panic mid-edit leaves plain data behind; keep serving it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ContactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactHandle")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tags::TagRegistry;

    pub(crate) fn person(owner: u64, first: &str, last: &str) -> Contact {
        Contact::new(ContactDraft {
            owner_id: UserId(owner),
            kind: ContactKind::person(first, last),
            phone_numbers: vec![PhoneNumber::new("Mobile", "555-0100")],
            email_addresses: vec![EmailAddress::new("Personal", "someone@example.com")],
        })
    }

    pub(crate) fn organization(owner: u64, name: &str, department: Option<&str>) -> Contact {
        Contact::new(ContactDraft {
            owner_id: UserId(owner),
            kind: ContactKind::organization(name, department.map(ToString::to_string)),
            phone_numbers: Vec::new(),
            email_addresses: Vec::new(),
        })
    }

    #[test]
    fn display_name_follows_variant() {
        assert_eq!(person(1, "Ann", "Lee").display_name(), "Ann Lee");
        assert_eq!(person(1, "", "Lee").display_name(), "Lee");
        assert_eq!(organization(1, "Acme", Some("Sales")).display_name(), "Acme (Sales)");
        assert_eq!(organization(1, "Acme", None).display_name(), "Acme");
    }

    #[test]
    fn variant_specific_setters_reject_other_variant() {
        let mut org = organization(1, "Acme", None);
        assert!(org.set_first_name("Ann").is_err());
        assert!(org.set_department(Some("Ops")).is_ok());
        assert_eq!(org.display_name(), "Acme (Ops)");

        let mut ann = person(1, "Ann", "Lee");
        assert!(ann.set_website(Some("https://acme.test")).is_err());
        assert!(ann.set_first_name("   ").is_err());
        assert_eq!(ann.display_name(), "Ann Lee");
    }

    #[test]
    fn invalid_email_leaves_list_untouched() {
        let mut ann = person(1, "Ann", "Lee");
        let result = ann.set_email_addresses(vec![
            EmailAddress::new("Work", "ann@work.example"),
            EmailAddress::new("Home", "not-an-email"),
        ]);
        assert!(result.is_err());
        assert_eq!(ann.email_addresses()[0].address, "someone@example.com");
    }

    #[test]
    fn tags_are_deduplicated_and_removed_by_name() {
        let registry = TagRegistry::new();
        let mut ann = person(1, "Ann", "Lee");
        assert!(ann.add_tag(registry.intern("friend").expect("tag")));
        assert!(!ann.add_tag(registry.intern(" friend").expect("tag")));
        assert!(ann.has_tag("friend "));
        assert!(ann.remove_tag("friend"));
        assert!(!ann.remove_tag("friend"));
    }

    #[test]
    fn details_lists_contact_channels_and_tags() {
        let registry = TagRegistry::new();
        let mut ann = person(1, "Ann", "Lee");
        ann.add_tag(registry.intern("friend").expect("tag"));
        let details = ann.details();
        assert!(details.starts_with("Name: Ann Lee\n"));
        assert!(details.contains("  - Mobile: 555-0100"));
        assert!(details.contains("  - Personal: someone@example.com"));
        assert!(details.contains("Tags: friend"));
    }

    #[test]
    fn handle_caches_immutable_identity() {
        let ann = person(7, "Ann", "Lee");
        let id = ann.id();
        let handle = ContactHandle::new(ann);
        assert_eq!(handle.id(), id);
        assert_eq!(handle.owner_id(), UserId(7));
        assert!(handle.ptr_eq(&handle.clone()));
        assert_eq!(handle.display_name(), "Ann Lee");
    }
}
