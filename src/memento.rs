use crate::contact::{Contact, ContactKind};
use crate::models::{EmailAddress, PhoneNumber};
use crate::tags::Tag;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Value copy of a contact's mutable state.
///
/// Tags are shared immutable instances, so copying the set of references is
/// enough; every other field is owned by the memento.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactMemento {
    source_id: Uuid,
    kind: ContactKind,
    active: bool,
    tags: BTreeSet<Tag>,
    phone_numbers: Vec<PhoneNumber>,
    email_addresses: Vec<EmailAddress>,
}

impl ContactMemento {
    pub fn capture(contact: &Contact) -> Self {
        Self {
            source_id: contact.id,
            kind: contact.kind.clone(),
            active: contact.active,
            tags: contact.tags.clone(),
            phone_numbers: contact.phone_numbers.clone(),
            email_addresses: contact.email_addresses.clone(),
        }
    }

    /// Overwrites the mutable fields of `contact`; identity, owner, creation
    /// time and access count are left alone.
    ///
    /// Restoring onto a contact other than the one captured is a programming
    /// error and trips a debug assertion.
    pub fn restore(&self, contact: &mut Contact) {
        debug_assert_eq!(
            self.source_id, contact.id,
            "memento restored onto a different contact"
        );
        contact.kind = self.kind.clone();
        contact.active = self.active;
        contact.tags = self.tags.clone();
        contact.phone_numbers = self.phone_numbers.clone();
        contact.email_addresses = self.email_addresses.clone();
    }

    pub fn source_id(&self) -> Uuid {
        self.source_id
    }

    pub fn display_name(&self) -> String {
        self.kind.display_name()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
