use crate::contact::ContactHandle;
use crate::models::{GroupSummary, UserId};
use crate::tags::Tag;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const DETAIL_SEPARATOR: &str = "------------------------";

/// A group member: a single contact or a nested group.
#[derive(Clone)]
pub enum GroupMember {
    Contact(ContactHandle),
    Group(GroupHandle),
}

impl GroupMember {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Contact(contact) => contact.id(),
            Self::Group(group) => group.id(),
        }
    }

    pub fn owner_id(&self) -> UserId {
        match self {
            Self::Contact(contact) => contact.owner_id(),
            Self::Group(group) => group.owner_id(),
        }
    }

    pub fn add_tag(&self, tag: &Tag) {
        match self {
            Self::Contact(contact) => {
                contact.lock().add_tag(tag.clone());
            }
            Self::Group(group) => group.lock().add_tag(tag),
        }
    }

    pub fn remove_tag(&self, name: &str) {
        match self {
            Self::Contact(contact) => {
                contact.lock().remove_tag(name);
            }
            Self::Group(group) => group.lock().remove_tag(name),
        }
    }

    pub fn delete(&self) {
        match self {
            Self::Contact(contact) => contact.lock().soft_delete(),
            Self::Group(group) => group.lock().delete(),
        }
    }

    pub fn tags(&self) -> BTreeSet<Tag> {
        match self {
            Self::Contact(contact) => contact.read(|c| c.tags().clone()),
            Self::Group(group) => group.lock().tags(),
        }
    }

    pub fn details(&self) -> String {
        match self {
            Self::Contact(contact) => contact.read(|c| c.details()),
            Self::Group(group) => group.lock().details(),
        }
    }

    fn collect_contacts(&self, seen: &mut HashSet<Uuid>, out: &mut Vec<ContactHandle>) {
        match self {
            Self::Contact(contact) => {
                if seen.insert(contact.id()) {
                    out.push(contact.clone());
                }
            }
            Self::Group(group) => group.lock().collect_contacts(seen, out),
        }
    }

    fn reaches_group(&self, group_id: Uuid) -> bool {
        match self {
            Self::Contact(_) => false,
            Self::Group(group) => group.id() == group_id || group.lock().contains_group(group_id),
        }
    }
}

impl fmt::Debug for GroupMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contact(contact) => f.debug_tuple("Contact").field(&contact.id()).finish(),
            Self::Group(group) => f.debug_tuple("Group").field(&group.id()).finish(),
        }
    }
}

impl From<ContactHandle> for GroupMember {
    fn from(value: ContactHandle) -> Self {
        Self::Contact(value)
    }
}

impl From<GroupHandle> for GroupMember {
    fn from(value: GroupHandle) -> Self {
        Self::Group(value)
    }
}

/// Named, ordered collection of contacts and nested groups. Bulk operations
/// fan out to every member recursively.
///
/// Nesting a group inside itself is not checked here; `GroupService` rejects it.
#[derive(Debug, Clone)]
pub struct ContactGroup {
    id: Uuid,
    owner_id: UserId,
    name: String,
    created_at: DateTime<Utc>,
    members: Vec<GroupMember>,
}

impl ContactGroup {
    pub fn new(owner_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            created_at: Utc::now(),
            members: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn add(&mut self, member: impl Into<GroupMember>) {
        self.members.push(member.into());
    }

    /// Removing a non-member is a no-op.
    pub fn remove(&mut self, member_id: Uuid) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member.id() != member_id);
        self.members.len() != before
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Direct membership only.
    pub fn contains(&self, member_id: Uuid) -> bool {
        self.members.iter().any(|member| member.id() == member_id)
    }

    /// True when `group_id` is nested anywhere below this group.
    pub fn contains_group(&self, group_id: Uuid) -> bool {
        self.members.iter().any(|member| member.reaches_group(group_id))
    }

    pub fn add_tag(&self, tag: &Tag) {
        for member in &self.members {
            member.add_tag(tag);
        }
    }

    pub fn remove_tag(&self, name: &str) {
        for member in &self.members {
            member.remove_tag(name);
        }
    }

    /// Soft-deletes every member. Removing the group record is up to the caller.
    pub fn delete(&self) {
        for member in &self.members {
            member.delete();
        }
    }

    /// Union of all members' tags, computed on each call.
    pub fn tags(&self) -> BTreeSet<Tag> {
        self.members.iter().flat_map(|member| member.tags()).collect()
    }

    pub fn details(&self) -> String {
        let body = self
            .members
            .iter()
            .map(GroupMember::details)
            .collect::<Vec<_>>()
            .join(&format!("\n{}\n", DETAIL_SEPARATOR));
        format!("Group: {}\n{}\n{}", self.name, DETAIL_SEPARATOR, body)
    }

    /// Every contact reachable through this group, each listed once.
    pub fn contacts(&self) -> Vec<ContactHandle> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect_contacts(&mut seen, &mut out);
        out
    }

    fn collect_contacts(&self, seen: &mut HashSet<Uuid>, out: &mut Vec<ContactHandle>) {
        for member in &self.members {
            member.collect_contacts(seen, out);
        }
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name.clone(),
            member_count: self.members.len(),
            tags: self.tags().iter().map(|tag| tag.name().to_string()).collect(),
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct GroupHandle {
    id: Uuid,
    owner_id: UserId,
    inner: Arc<Mutex<ContactGroup>>,
}

impl GroupHandle {
    pub fn new(group: ContactGroup) -> Self {
        Self {
            id: group.id,
            owner_id: group.owner_id,
            inner: Arc::new(Mutex::new(group)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn lock(&self) -> MutexGuard<'_, ContactGroup> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> String {
        self.lock().name().to_string()
    }

    pub fn ptr_eq(&self, other: &GroupHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupHandle")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::tests::{organization, person};
    use crate::tags::TagRegistry;

    fn handle(contact: crate::contact::Contact) -> ContactHandle {
        ContactHandle::new(contact)
    }

    #[test]
    fn tag_cascades_through_nested_groups() {
        let registry = TagRegistry::new();
        let ann = handle(person(1, "Ann", "Lee"));
        let bob = handle(person(1, "Bob", "Ray"));
        let acme = handle(organization(1, "Acme", None));

        let mut inner = ContactGroup::new(UserId(1), "Inner");
        inner.add(bob.clone());
        let inner = GroupHandle::new(inner);

        let mut outer = ContactGroup::new(UserId(1), "Outer");
        outer.add(ann.clone());
        outer.add(inner.clone());
        outer.add(acme.clone());

        let vip = registry.intern("vip").expect("tag");
        outer.add_tag(&vip);

        for contact in [&ann, &bob, &acme] {
            assert!(contact.read(|c| c.has_tag("vip")));
        }
        assert_eq!(inner.lock().tags().len(), 1);
    }

    #[test]
    fn group_tags_are_union_of_members() {
        let registry = TagRegistry::new();
        let ann = handle(person(1, "Ann", "Lee"));
        let bob = handle(person(1, "Bob", "Ray"));
        ann.lock().add_tag(registry.intern("friend").expect("tag"));
        bob.lock().add_tag(registry.intern("work").expect("tag"));
        bob.lock().add_tag(registry.intern("friend").expect("tag"));

        let mut group = ContactGroup::new(UserId(1), "Mixed");
        group.add(ann.clone());
        group.add(bob.clone());

        let names = group.tags().iter().map(|t| t.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["friend".to_string(), "work".to_string()]);

        // recomputed after member changes
        ann.lock().remove_tag("friend");
        bob.lock().remove_tag("friend");
        assert_eq!(group.tags().len(), 1);
    }

    #[test]
    fn remove_tag_and_delete_cascade() {
        let registry = TagRegistry::new();
        let ann = handle(person(1, "Ann", "Lee"));
        let bob = handle(person(1, "Bob", "Ray"));
        let mut inner = ContactGroup::new(UserId(1), "Inner");
        inner.add(bob.clone());
        let mut outer = ContactGroup::new(UserId(1), "Outer");
        outer.add(ann.clone());
        outer.add(GroupHandle::new(inner));

        outer.add_tag(&registry.intern("temp").expect("tag"));
        outer.remove_tag("temp");
        assert!(outer.tags().is_empty());

        outer.delete();
        assert!(!ann.is_active());
        assert!(!bob.is_active());
    }

    #[test]
    fn removing_non_member_is_noop() {
        let ann = handle(person(1, "Ann", "Lee"));
        let mut group = ContactGroup::new(UserId(1), "Solo");
        group.add(ann.clone());
        assert!(!group.remove(Uuid::new_v4()));
        assert!(group.contains(ann.id()));
        assert!(group.remove(ann.id()));
        assert!(group.is_empty());
    }

    #[test]
    fn details_render_nested_blocks() {
        let ann = handle(person(1, "Ann", "Lee"));
        let mut inner = ContactGroup::new(UserId(1), "Inner");
        inner.add(handle(person(1, "Bob", "Ray")));
        let mut outer = ContactGroup::new(UserId(1), "Outer");
        outer.add(ann);
        outer.add(GroupHandle::new(inner));

        let details = outer.details();
        assert!(details.starts_with("Group: Outer\n------------------------\nName: Ann Lee"));
        assert!(details.contains("Group: Inner"));
        assert!(details.contains("Name: Bob Ray"));
    }

    #[test]
    fn contacts_are_collected_once_and_nesting_is_detected() {
        let ann = handle(person(1, "Ann", "Lee"));
        let mut inner = ContactGroup::new(UserId(1), "Inner");
        inner.add(ann.clone());
        let inner = GroupHandle::new(inner);

        let mut outer = ContactGroup::new(UserId(1), "Outer");
        outer.add(ann.clone());
        outer.add(inner.clone());

        assert_eq!(outer.contacts().len(), 1);
        assert!(outer.contains_group(inner.id()));
        assert!(!inner.lock().contains_group(outer.id()));
    }
}
