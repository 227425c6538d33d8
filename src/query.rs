use crate::contact::{Contact, ContactHandle};
use crate::errors::{AppError, AppResult};
use crate::models::{ContactSortOrder, Requester};
use crate::policy;
use crate::predicate::ContactPredicate;
use crate::store::ContactStore;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// Read side of the contact book: visibility, search and single-contact
/// fetches. Listing never touches access counts; only `fetch_one` does.
#[derive(Clone)]
pub struct ContactQueryService {
    store: Arc<dyn ContactStore>,
}

impl ContactQueryService {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self { store }
    }

    /// Active contacts the requester may see, in store order.
    pub fn list_visible(&self, requester: &Requester) -> AppResult<Vec<ContactHandle>> {
        self.list_visible_with(requester, false)
    }

    pub fn list_visible_with(
        &self,
        requester: &Requester,
        include_inactive: bool,
    ) -> AppResult<Vec<ContactHandle>> {
        if requester.is_admin() {
            self.store.find_all(include_inactive)
        } else {
            self.store.find_by_owner(requester.user_id, include_inactive)
        }
    }

    /// `None` matches everything.
    pub fn search(
        &self,
        requester: &Requester,
        predicate: Option<&ContactPredicate>,
    ) -> AppResult<Vec<ContactHandle>> {
        let visible = self.list_visible(requester)?;
        let Some(predicate) = predicate else {
            return Ok(visible);
        };
        Ok(visible
            .into_iter()
            .filter(|contact| contact.read(|c| predicate.matches(c)))
            .collect())
    }

    pub fn search_sorted(
        &self,
        requester: &Requester,
        predicate: Option<&ContactPredicate>,
        order: ContactSortOrder,
    ) -> AppResult<Vec<ContactHandle>> {
        let hits = self.search(requester, predicate)?;
        tracing::debug!(
            requester = %requester.user_id,
            order = order.as_str(),
            hits = hits.len(),
            "contacts searched"
        );
        Ok(sort_contacts(hits, order))
    }

    /// Resolves one contact and counts the access. Unknown and foreign ids
    /// both come back as `NotFound`.
    pub fn fetch_one(&self, requester: &Requester, contact_id: Uuid) -> AppResult<ContactHandle> {
        let contact = self
            .store
            .find_by_id(contact_id)?
            .filter(|contact| policy::can_access(requester, contact.owner_id()))
            .ok_or_else(|| AppError::NotFound(format!("Contact {} not found", contact_id)))?;

        contact.lock().increment_access_count();
        self.store.save(&contact)?;
        Ok(contact)
    }
}

/// Stable sort by one of the predefined orders.
pub fn sort_contacts(contacts: Vec<ContactHandle>, order: ContactSortOrder) -> Vec<ContactHandle> {
    match order {
        ContactSortOrder::NameAsc => sort_by_key(contacts, |c| c.display_name().to_lowercase(), false),
        ContactSortOrder::NameDesc => sort_by_key(contacts, |c| c.display_name().to_lowercase(), true),
        ContactSortOrder::NewestFirst => sort_by_key(contacts, Contact::created_at, true),
        ContactSortOrder::OldestFirst => sort_by_key(contacts, Contact::created_at, false),
        ContactSortOrder::MostAccessed => sort_by_key(contacts, Contact::access_count, true),
    }
}

/// Stable sort with a caller-supplied comparator over contact snapshots.
pub fn sort_by<F>(contacts: Vec<ContactHandle>, mut compare: F) -> Vec<ContactHandle>
where
    F: FnMut(&Contact, &Contact) -> Ordering,
{
    // snapshot once so the comparator never holds two contact locks
    let mut keyed = contacts
        .into_iter()
        .map(|handle| (handle.snapshot(), handle))
        .collect::<Vec<_>>();
    keyed.sort_by(|(left, _), (right, _)| compare(left, right));
    keyed.into_iter().map(|(_, handle)| handle).collect()
}

fn sort_by_key<K, F>(contacts: Vec<ContactHandle>, key: F, descending: bool) -> Vec<ContactHandle>
where
    K: Ord,
    F: Fn(&Contact) -> K,
{
    let mut keyed = contacts
        .into_iter()
        .map(|handle| (handle.read(&key), handle))
        .collect::<Vec<_>>();
    if descending {
        keyed.sort_by(|(left, _), (right, _)| right.cmp(left));
    } else {
        keyed.sort_by(|(left, _), (right, _)| left.cmp(right));
    }
    keyed.into_iter().map(|(_, handle)| handle).collect()
}
