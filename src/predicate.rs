use crate::contact::Contact;
use crate::tags::normalize_tag_name;
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

type Matcher = dyn Fn(&Contact) -> bool + Send + Sync;

/// A composable, side-effect-free filter over contacts.
///
/// Predicates hold search terms only and read the contact passed at
/// evaluation time, so one built before an edit still sees the edit.
#[derive(Clone)]
pub struct ContactPredicate {
    description: String,
    matcher: Arc<Matcher>,
}

impl ContactPredicate {
    pub fn new<F>(description: impl Into<String>, matcher: F) -> Self
    where
        F: Fn(&Contact) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            matcher: Arc::new(matcher),
        }
    }

    pub fn match_all() -> Self {
        Self::new("all", |_| true)
    }

    pub fn match_none() -> Self {
        Self::new("none", |_| false)
    }

    pub fn matches(&self, contact: &Contact) -> bool {
        (self.matcher)(contact)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn and(&self, other: &ContactPredicate) -> Self {
        let (left, right) = (Arc::clone(&self.matcher), Arc::clone(&other.matcher));
        Self {
            description: format!("({} AND {})", self.description, other.description),
            matcher: Arc::new(move |contact: &Contact| left(contact) && right(contact)),
        }
    }

    pub fn or(&self, other: &ContactPredicate) -> Self {
        let (left, right) = (Arc::clone(&self.matcher), Arc::clone(&other.matcher));
        Self {
            description: format!("({} OR {})", self.description, other.description),
            matcher: Arc::new(move |contact: &Contact| left(contact) || right(contact)),
        }
    }

    pub fn negate(&self) -> Self {
        let inner = Arc::clone(&self.matcher);
        Self {
            description: format!("NOT {}", self.description),
            matcher: Arc::new(move |contact: &Contact| !inner(contact)),
        }
    }
}

impl fmt::Debug for ContactPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContactPredicate").field(&self.description).finish()
    }
}

impl Not for ContactPredicate {
    type Output = ContactPredicate;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl BitAnd for ContactPredicate {
    type Output = ContactPredicate;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(&rhs)
    }
}

impl BitOr for ContactPredicate {
    type Output = ContactPredicate;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(&rhs)
    }
}

/// Lower-cased needle, or `None` when the search term is blank. Surrounding
/// whitespace in a non-blank term is part of the needle.
fn needle(term: &str) -> Option<String> {
    if term.trim().is_empty() {
        None
    } else {
        Some(term.to_lowercase())
    }
}

fn contains_term<F>(field: &str, term: &str, matcher: F) -> ContactPredicate
where
    F: Fn(&Contact, &str) -> bool + Send + Sync + 'static,
{
    match needle(term) {
        None => ContactPredicate::match_all(),
        Some(needle) => ContactPredicate::new(format!("{} contains '{}'", field, needle), move |contact| {
            matcher(contact, &needle)
        }),
    }
}

/// Case-insensitive substring match on the display name. Blank matches all.
pub fn name_contains(term: &str) -> ContactPredicate {
    contains_term("name", term, |contact, needle| {
        contact.display_name().to_lowercase().contains(needle)
    })
}

pub fn phone_contains(term: &str) -> ContactPredicate {
    contains_term("phone", term, |contact, needle| {
        contact
            .phone_numbers()
            .iter()
            .any(|phone| phone.number.to_lowercase().contains(needle))
    })
}

pub fn email_contains(term: &str) -> ContactPredicate {
    contains_term("email", term, |contact, needle| {
        contact
            .email_addresses()
            .iter()
            .any(|email| email.address.to_lowercase().contains(needle))
    })
}

pub fn tag_contains(term: &str) -> ContactPredicate {
    contains_term("tag", term, |contact, needle| {
        contact
            .tag_names()
            .any(|name| name.to_lowercase().contains(needle))
    })
}

/// Whole-name tag match, ignoring case. Blank matches all.
pub fn has_tag(name: &str) -> ContactPredicate {
    match needle(normalize_tag_name(name)) {
        None => ContactPredicate::match_all(),
        Some(needle) => ContactPredicate::new(format!("tag = '{}'", needle), move |contact| {
            contact.tag_names().any(|name| name.to_lowercase() == needle)
        }),
    }
}

pub fn access_count_at_least(min: u32) -> ContactPredicate {
    ContactPredicate::new(format!("access count >= {}", min), move |contact| {
        contact.access_count() >= min
    })
}

pub fn added_since(since: DateTime<Utc>) -> ContactPredicate {
    ContactPredicate::new(format!("added since {}", since.to_rfc3339()), move |contact| {
        contact.created_at() >= since
    })
}

pub fn active_only() -> ContactPredicate {
    ContactPredicate::new("active", Contact::is_active)
}
