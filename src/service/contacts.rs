use crate::command::{AddTag, Command, CommandInvoker, ContactAction, RemoveTag};
use crate::contact::{Contact, ContactDraft, ContactHandle, ContactKind};
use crate::errors::{AppError, AppResult};
use crate::models::{CreateOrganizationPayload, CreatePersonPayload, EmailAddress, PhoneNumber, Requester, UserId};
use crate::observer::ObserverHub;
use crate::policy;
use crate::query::ContactQueryService;
use crate::store::ContactStore;
use crate::tags::{normalize_tag_name, Tag, TagRegistry};
use std::sync::Arc;
use uuid::Uuid;

/// Write side for single contacts: creation, deletion and edits routed
/// through a caller-owned [`CommandInvoker`].
#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn ContactStore>,
    query: ContactQueryService,
    registry: Arc<TagRegistry>,
    observers: Arc<ObserverHub>,
}

impl ContactService {
    pub fn new(store: Arc<dyn ContactStore>, registry: Arc<TagRegistry>, observers: Arc<ObserverHub>) -> Self {
        Self {
            query: ContactQueryService::new(Arc::clone(&store)),
            store,
            registry,
            observers,
        }
    }

    pub fn query(&self) -> &ContactQueryService {
        &self.query
    }

    pub fn create_person(&self, requester: &Requester, payload: CreatePersonPayload) -> AppResult<ContactHandle> {
        let first_name = payload.first_name.as_deref().unwrap_or_default().trim();
        let last_name = payload.last_name.as_deref().unwrap_or_default().trim();
        let draft = ContactDraft {
            owner_id: requester.user_id,
            kind: ContactKind::person(first_name, last_name),
            phone_numbers: parse_channels(&payload.phones, PhoneNumber::parse),
            email_addresses: parse_channels(&payload.emails, EmailAddress::parse),
        };
        self.create(draft)
    }

    pub fn create_organization(
        &self,
        requester: &Requester,
        payload: CreateOrganizationPayload,
    ) -> AppResult<ContactHandle> {
        let kind = ContactKind::Organization {
            name: payload.name.trim().to_string(),
            department: policy::optional_text(payload.department.as_deref()),
            website: policy::optional_text(payload.website.as_deref()),
        };
        let draft = ContactDraft {
            owner_id: requester.user_id,
            kind,
            phone_numbers: parse_channels(&payload.phones, PhoneNumber::parse),
            email_addresses: parse_channels(&payload.emails, EmailAddress::parse),
        };
        self.create(draft)
    }

    fn create(&self, draft: ContactDraft) -> AppResult<ContactHandle> {
        policy::validate_draft(&draft)?;
        let contact = ContactHandle::new(Contact::new(draft));
        self.store.save(&contact)?;
        tracing::info!(
            contact_id = %contact.id(),
            owner_id = %contact.owner_id(),
            kind = contact.read(|c| c.kind().as_str()),
            "contact created"
        );
        Ok(contact)
    }

    /// Runs `action` against a contact the requester owns (or any contact for
    /// admins) and records it in `history`.
    pub fn edit(
        &self,
        requester: &Requester,
        history: &mut CommandInvoker,
        contact_id: Uuid,
        action: impl ContactAction + 'static,
    ) -> AppResult<ContactHandle> {
        let contact = self.resolve_for_update(requester, contact_id, "edit this contact")?;
        history.execute_command(Command::new(contact.clone(), action))?;
        self.store.save(&contact)?;
        Ok(contact)
    }

    /// Tags through the command history so the tag can be undone. Resolution
    /// goes through `fetch_one`, so it counts as an access.
    pub fn tag_contact(
        &self,
        requester: &Requester,
        history: &mut CommandInvoker,
        contact_id: Uuid,
        tag_name: &str,
    ) -> AppResult<Tag> {
        policy::validate_tag_name(tag_name)?;
        let contact = self.query.fetch_one(requester, contact_id)?;
        let tag = self.registry.intern(tag_name)?;

        history.execute_command(Command::new(contact.clone(), AddTag(tag.clone())))?;
        self.store.save(&contact)?;
        self.observers.notify_tagged(&contact.snapshot(), &tag);
        Ok(tag)
    }

    /// Returns false, recording nothing, when the contact does not carry the tag.
    pub fn untag_contact(
        &self,
        requester: &Requester,
        history: &mut CommandInvoker,
        contact_id: Uuid,
        tag_name: &str,
    ) -> AppResult<bool> {
        let contact = self.query.fetch_one(requester, contact_id)?;
        let name = normalize_tag_name(tag_name);
        let Some(tag) = contact.read(|c| c.tags().iter().find(|tag| tag.name() == name).cloned()) else {
            return Ok(false);
        };

        history.execute_command(Command::new(contact.clone(), RemoveTag(name.to_string())))?;
        self.store.save(&contact)?;
        self.observers.notify_untagged(&contact.snapshot(), &tag);
        Ok(true)
    }

    /// Soft delete. An already inactive contact counts as missing.
    pub fn delete_contact(&self, requester: &Requester, contact_id: Uuid) -> AppResult<()> {
        let contact = self
            .store
            .find_by_id(contact_id)?
            .filter(ContactHandle::is_active)
            .ok_or_else(|| not_found(contact_id))?;
        policy::ensure_owner_or_admin(requester, contact.owner_id(), "delete this contact")?;

        self.store.soft_delete(&contact)?;
        tracing::info!(contact_id = %contact_id, requester = %requester.user_id, "contact deleted");
        self.observers.notify_deleted(&contact.snapshot());
        Ok(())
    }

    pub fn hard_delete_contact(&self, requester: &Requester, contact_id: Uuid) -> AppResult<()> {
        let contact = self.store.find_by_id(contact_id)?.ok_or_else(|| not_found(contact_id))?;
        policy::ensure_owner_or_admin(requester, contact.owner_id(), "delete this contact")?;

        self.store.hard_delete(&contact)?;
        tracing::info!(contact_id = %contact_id, requester = %requester.user_id, "contact permanently deleted");
        self.observers.notify_deleted(&contact.snapshot());
        Ok(())
    }

    /// Removes every contact of `owner_id`, active or not. Returns how many went.
    pub fn delete_all_for_owner(&self, requester: &Requester, owner_id: UserId) -> AppResult<usize> {
        policy::ensure_owner_or_admin(requester, owner_id, "delete these contacts")?;
        let doomed = self.store.find_by_owner(owner_id, true)?;
        let removed = self.store.delete_all_for_owner(owner_id)?;
        tracing::info!(owner_id = %owner_id, removed, "contacts purged for owner");
        for contact in doomed {
            self.observers.notify_deleted(&contact.snapshot());
        }
        Ok(removed)
    }

    fn resolve_for_update(&self, requester: &Requester, contact_id: Uuid, action: &str) -> AppResult<ContactHandle> {
        let contact = self.store.find_by_id(contact_id)?.ok_or_else(|| not_found(contact_id))?;
        policy::ensure_owner_or_admin(requester, contact.owner_id(), action)?;
        Ok(contact)
    }
}

fn not_found(contact_id: Uuid) -> AppError {
    AppError::NotFound(format!("Contact {} not found", contact_id))
}

fn parse_channels<T>(raw: &[String], parse: fn(&str) -> Option<T>) -> Vec<T> {
    raw.iter().filter_map(|value| parse(value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::UpdateName;
    use crate::observer::ContactObserver;
    use crate::store::InMemoryContactStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl ContactObserver for Events {
        fn on_contact_deleted(&self, contact: &Contact) -> AppResult<()> {
            self.0.lock().expect("events").push(format!("deleted {}", contact.display_name()));
            Ok(())
        }

        fn on_contact_tagged(&self, contact: &Contact, tag: &Tag) -> AppResult<()> {
            self.0
                .lock()
                .expect("events")
                .push(format!("tagged {} {}", contact.display_name(), tag));
            Ok(())
        }

        fn on_contact_untagged(&self, contact: &Contact, tag: &Tag) -> AppResult<()> {
            self.0
                .lock()
                .expect("events")
                .push(format!("untagged {} {}", contact.display_name(), tag));
            Ok(())
        }
    }

    fn service() -> (ContactService, Arc<Events>) {
        let hub = Arc::new(ObserverHub::new());
        let events = Arc::new(Events::default());
        hub.register(events.clone());
        let service = ContactService::new(Arc::new(InMemoryContactStore::new()), Arc::new(TagRegistry::new()), hub);
        (service, events)
    }

    fn ann(service: &ContactService) -> ContactHandle {
        service
            .create_person(
                &Requester::user(1),
                CreatePersonPayload {
                    first_name: Some(" Ann ".to_string()),
                    last_name: Some("Lee".to_string()),
                    phones: vec!["Work: 555-0100".to_string(), "  ".to_string()],
                    emails: vec!["ann@example.com".to_string()],
                },
            )
            .expect("create ann")
    }

    #[test]
    fn create_person_parses_channels() {
        let (service, _) = service();
        let contact = ann(&service);
        let snapshot = contact.snapshot();
        assert_eq!(snapshot.display_name(), "Ann Lee");
        assert_eq!(snapshot.owner_id(), UserId(1));
        assert_eq!(snapshot.phone_numbers(), &[PhoneNumber::new("Work", "555-0100")]);
        assert_eq!(snapshot.email_addresses()[0].label, "Personal");
    }

    #[test]
    fn create_rejects_invalid_input() {
        let (service, _) = service();
        let nameless = service.create_person(&Requester::user(1), CreatePersonPayload::default());
        assert!(matches!(nameless, Err(AppError::Validation(_))));

        let bad_email = service.create_organization(
            &Requester::user(1),
            CreateOrganizationPayload {
                name: "Acme".to_string(),
                emails: vec!["Work: nope".to_string()],
                ..CreateOrganizationPayload::default()
            },
        );
        assert!(matches!(bad_email, Err(AppError::Validation(_))));
        assert!(service.query().list_visible(&Requester::admin(9)).expect("list").is_empty());
    }

    #[test]
    fn tagging_is_undoable_and_observed() {
        let (service, events) = service();
        let contact = ann(&service);
        let requester = Requester::user(1);
        let mut history = CommandInvoker::new();

        service
            .tag_contact(&requester, &mut history, contact.id(), "friend")
            .expect("tag");
        assert!(contact.read(|c| c.has_tag("friend")));
        assert_eq!(contact.read(Contact::access_count), 1);

        history.undo();
        assert!(!contact.read(|c| c.has_tag("friend")));
        history.redo().expect("redo");

        assert!(service
            .untag_contact(&requester, &mut history, contact.id(), "friend")
            .expect("untag"));
        assert!(!service
            .untag_contact(&requester, &mut history, contact.id(), "friend")
            .expect("untag again"));

        let events = events.0.lock().expect("events").clone();
        assert_eq!(events, vec!["tagged Ann Lee friend", "untagged Ann Lee friend"]);
    }

    #[test]
    fn blank_tag_is_rejected_before_lookup() {
        let (service, _) = service();
        let contact = ann(&service);
        let mut history = CommandInvoker::new();
        let result = service.tag_contact(&Requester::user(1), &mut history, contact.id(), "  ");
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(contact.read(Contact::access_count), 0);
    }

    #[test]
    fn foreign_edit_is_denied() {
        let (service, _) = service();
        let contact = ann(&service);
        let mut history = CommandInvoker::new();

        let denied = service.edit(
            &Requester::user(2),
            &mut history,
            contact.id(),
            UpdateName("Eve Intruder".to_string()),
        );
        assert!(matches!(denied, Err(AppError::AccessDenied(_))));

        service
            .edit(&Requester::user(1), &mut history, contact.id(), UpdateName("Anna Lee".to_string()))
            .expect("edit");
        assert_eq!(contact.display_name(), "Anna Lee");
    }

    #[test]
    fn delete_rules() {
        let (service, events) = service();
        let contact = ann(&service);

        let denied = service.delete_contact(&Requester::user(2), contact.id());
        assert!(matches!(denied, Err(AppError::AccessDenied(_))));

        service.delete_contact(&Requester::user(1), contact.id()).expect("delete");
        assert!(!contact.is_active());
        let again = service.delete_contact(&Requester::user(1), contact.id());
        assert!(matches!(again, Err(AppError::NotFound(_))));

        service
            .hard_delete_contact(&Requester::admin(9), contact.id())
            .expect("hard delete");
        let gone = service.hard_delete_contact(&Requester::admin(9), contact.id());
        assert!(matches!(gone, Err(AppError::NotFound(_))));

        assert_eq!(events.0.lock().expect("events").len(), 2);
    }

    #[test]
    fn purge_by_owner_requires_ownership() {
        let (service, events) = service();
        ann(&service);
        ann(&service);

        let denied = service.delete_all_for_owner(&Requester::user(2), UserId(1));
        assert!(matches!(denied, Err(AppError::AccessDenied(_))));
        assert_eq!(
            service.delete_all_for_owner(&Requester::user(1), UserId(1)).expect("purge"),
            2
        );
        assert_eq!(events.0.lock().expect("events").len(), 2);
    }
}
