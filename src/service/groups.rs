use crate::contact::ContactHandle;
use crate::errors::{AppError, AppResult};
use crate::group::{ContactGroup, GroupHandle, GroupMember};
use crate::models::Requester;
use crate::observer::ObserverHub;
use crate::policy;
use crate::store::{ContactStore, GroupStore};
use crate::tags::{normalize_tag_name, Tag, TagRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Group lifecycle and the bulk operations that cascade to members.
///
/// Cascades are not transactional. Each member step is idempotent, so a
/// partially applied cascade can simply be retried.
#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupStore>,
    contacts: Arc<dyn ContactStore>,
    registry: Arc<TagRegistry>,
    observers: Arc<ObserverHub>,
}

impl GroupService {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        contacts: Arc<dyn ContactStore>,
        registry: Arc<TagRegistry>,
        observers: Arc<ObserverHub>,
    ) -> Self {
        Self {
            groups,
            contacts,
            registry,
            observers,
        }
    }

    pub fn create_group(&self, requester: &Requester, name: &str, member_ids: &[Uuid]) -> AppResult<GroupHandle> {
        let name = policy::validate_group_name(name)?;
        let mut seen = HashSet::new();
        let mut group = ContactGroup::new(requester.user_id, name);
        for member_id in member_ids {
            if !seen.insert(*member_id) {
                return Err(duplicate(*member_id));
            }
            group.add(self.resolve_member(requester, *member_id)?);
        }

        let group = GroupHandle::new(group);
        self.groups.save(&group)?;
        tracing::info!(
            group_id = %group.id(),
            owner_id = %group.owner_id(),
            members = member_ids.len(),
            "group created"
        );
        Ok(group)
    }

    pub fn groups_for(&self, requester: &Requester) -> AppResult<Vec<GroupHandle>> {
        if requester.is_admin() {
            self.groups.find_all()
        } else {
            self.groups.find_by_owner(requester.user_id)
        }
    }

    /// Missing groups are `NotFound`; other owners' groups are `AccessDenied`.
    pub fn group(&self, requester: &Requester, group_id: Uuid) -> AppResult<GroupHandle> {
        let group = self
            .groups
            .find_by_id(group_id)?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", group_id)))?;
        policy::ensure_owner_or_admin(requester, group.owner_id(), "access this group")?;
        Ok(group)
    }

    pub fn group_details(&self, requester: &Requester, group_id: Uuid) -> AppResult<String> {
        Ok(self.group(requester, group_id)?.lock().details())
    }

    pub fn rename_group(&self, requester: &Requester, group_id: Uuid, name: &str) -> AppResult<GroupHandle> {
        let name = policy::validate_group_name(name)?;
        let group = self.group(requester, group_id)?;
        group.lock().rename(name);
        self.groups.save(&group)?;
        Ok(group)
    }

    pub fn add_member(&self, requester: &Requester, group_id: Uuid, member_id: Uuid) -> AppResult<()> {
        let group = self.group(requester, group_id)?;
        if group.lock().contains(member_id) {
            return Err(duplicate(member_id));
        }
        let member = self.resolve_member(requester, member_id)?;
        if let GroupMember::Group(nested) = &member {
            if nested.id() == group_id || nested.lock().contains_group(group_id) {
                return Err(AppError::Validation(
                    "A group cannot be nested inside itself".to_string(),
                ));
            }
        }

        group.lock().add(member);
        self.groups.save(&group)?;
        tracing::info!(group_id = %group_id, member_id = %member_id, "group member added");
        Ok(())
    }

    /// Removing something that is not a direct member does nothing.
    pub fn remove_member(&self, requester: &Requester, group_id: Uuid, member_id: Uuid) -> AppResult<bool> {
        let group = self.group(requester, group_id)?;
        let removed = group.lock().remove(member_id);
        if removed {
            self.groups.save(&group)?;
        }
        Ok(removed)
    }

    /// Tags every contact reachable from the group, nested groups included.
    pub fn add_tag_to_group(&self, requester: &Requester, group_id: Uuid, tag_name: &str) -> AppResult<Tag> {
        policy::validate_tag_name(tag_name)?;
        let group = self.group(requester, group_id)?;
        let tag = self.registry.intern(tag_name)?;

        let members = {
            let group = group.lock();
            group.add_tag(&tag);
            group.contacts()
        };
        let members = self.persist_stored(members)?;
        tracing::info!(group_id = %group_id, tag = %tag, contacts = members.len(), "group tagged");
        for contact in &members {
            self.observers.notify_tagged(&contact.snapshot(), &tag);
        }
        Ok(tag)
    }

    /// Observers hear about the contacts that actually carried the tag.
    pub fn remove_tag_from_group(&self, requester: &Requester, group_id: Uuid, tag_name: &str) -> AppResult<()> {
        let group = self.group(requester, group_id)?;
        let name = normalize_tag_name(tag_name);

        let (tagged, tag) = {
            let group = group.lock();
            let tag = group.tags().into_iter().find(|tag| tag.name() == name);
            let tagged = group
                .contacts()
                .into_iter()
                .filter(|contact| contact.read(|c| c.has_tag(name)))
                .collect::<Vec<_>>();
            group.remove_tag(name);
            (tagged, tag)
        };
        let Some(tag) = tag else {
            return Ok(());
        };

        let tagged = self.persist_stored(tagged)?;
        tracing::info!(group_id = %group_id, tag = %tag, contacts = tagged.len(), "group untagged");
        for contact in &tagged {
            self.observers.notify_untagged(&contact.snapshot(), &tag);
        }
        Ok(())
    }

    /// Soft-deletes every reachable contact, then drops the group record.
    /// Returns the number of contacts affected.
    pub fn delete_group(&self, requester: &Requester, group_id: Uuid) -> AppResult<usize> {
        let group = self.group(requester, group_id)?;
        let members = {
            let group = group.lock();
            group.delete();
            group.contacts()
        };
        let members = self.persist_stored(members)?;
        self.groups.delete(&group)?;
        tracing::info!(group_id = %group_id, contacts = members.len(), "group deleted");
        for contact in &members {
            self.observers.notify_deleted(&contact.snapshot());
        }
        Ok(members.len())
    }

    fn resolve_member(&self, requester: &Requester, member_id: Uuid) -> AppResult<GroupMember> {
        if let Some(contact) = self.contacts.find_by_id(member_id)? {
            policy::ensure_owner_or_admin(requester, contact.owner_id(), "group this contact")?;
            return Ok(GroupMember::Contact(contact));
        }
        if let Some(group) = self.groups.find_by_id(member_id)? {
            policy::ensure_owner_or_admin(requester, group.owner_id(), "nest this group")?;
            return Ok(GroupMember::Group(group));
        }
        Err(AppError::NotFound(format!("No contact or group with id {}", member_id)))
    }

    /// Drops contact members that are no longer in the contact store from
    /// every group. Returns how many memberships were removed.
    pub fn prune_missing_contacts(&self) -> AppResult<usize> {
        let mut removed = 0usize;
        for group in self.groups.find_all()? {
            let contact_ids = group
                .lock()
                .members()
                .iter()
                .filter_map(|member| match member {
                    GroupMember::Contact(contact) => Some(contact.id()),
                    GroupMember::Group(_) => None,
                })
                .collect::<Vec<_>>();

            let mut changed = false;
            for contact_id in contact_ids {
                if self.contacts.find_by_id(contact_id)?.is_none() && group.lock().remove(contact_id) {
                    changed = true;
                    removed += 1;
                }
            }
            if changed {
                self.groups.save(&group)?;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "stale group memberships pruned");
        }
        Ok(removed)
    }

    /// Saves the cascaded contacts the store still holds and returns them.
    /// Hard-deleted contacts are skipped so a cascade never brings them back.
    fn persist_stored(&self, contacts: Vec<ContactHandle>) -> AppResult<Vec<ContactHandle>> {
        let mut stored = Vec::with_capacity(contacts.len());
        for contact in contacts {
            if self.contacts.find_by_id(contact.id())?.is_some() {
                self.contacts.save(&contact)?;
                stored.push(contact);
            }
        }
        Ok(stored)
    }
}

fn duplicate(member_id: Uuid) -> AppError {
    AppError::DuplicateMembership(format!("{} is already a member of this group", member_id))
}
