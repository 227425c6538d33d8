pub mod command;
pub mod contact;
pub mod display;
pub mod errors;
pub mod group;
pub mod memento;
pub mod models;
pub mod observer;
pub mod policy;
pub mod predicate;
pub mod query;
pub mod service;
pub mod session;
pub mod settings;
pub mod store;
pub mod tags;

pub use crate::command::{Command, CommandInvoker, ContactAction, HistoryOutcome};
pub use crate::contact::{Contact, ContactHandle, ContactKind};
pub use crate::errors::{AppError, AppResult};
pub use crate::group::{ContactGroup, GroupHandle, GroupMember};
pub use crate::models::{
    AppSettings, ContactSortOrder, ContactSummary, CreateOrganizationPayload, CreatePersonPayload, EmailAddress,
    GroupSummary, PhoneNumber, Requester, Role, UserId,
};
pub use crate::observer::{AuditLogObserver, ContactObserver, ObserverHub};
pub use crate::predicate::ContactPredicate;
pub use crate::tags::{Tag, TagRegistry};

use crate::display::DisplayOptions;
use crate::query::sort_contacts;
use crate::service::{ContactService, GroupService};
use crate::session::SessionManager;
use crate::settings::SettingsStore;
use crate::store::{ContactStore, GroupStore, InMemoryContactStore, InMemoryGroupStore};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the JSON file logger. `RUST_LOG` overrides `filter` when set.
pub fn init_tracing(log_dir: &Path, filter: &str) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "contacts.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}

/// Everything the presentation layer needs, wired together. Calls are scoped
/// by a session token obtained from [`ContactBook::login`].
pub struct ContactBook {
    settings: SettingsStore,
    registry: Arc<TagRegistry>,
    observers: Arc<ObserverHub>,
    contact_store: Arc<dyn ContactStore>,
    contacts: ContactService,
    groups: GroupService,
    sessions: SessionManager,
}

impl ContactBook {
    pub fn new(settings: AppSettings) -> Self {
        Self::with_stores(
            SettingsStore::in_memory(settings),
            Arc::new(InMemoryContactStore::new()),
            Arc::new(InMemoryGroupStore::new()),
        )
    }

    pub fn open(settings_path: &Path) -> AppResult<Self> {
        Ok(Self::with_stores(
            SettingsStore::open(settings_path)?,
            Arc::new(InMemoryContactStore::new()),
            Arc::new(InMemoryGroupStore::new()),
        ))
    }

    pub fn with_stores(
        settings: SettingsStore,
        contact_store: Arc<dyn ContactStore>,
        group_store: Arc<dyn GroupStore>,
    ) -> Self {
        let registry = Arc::new(TagRegistry::new());
        let observers = Arc::new(ObserverHub::new());
        let contacts = ContactService::new(Arc::clone(&contact_store), Arc::clone(&registry), Arc::clone(&observers));
        let groups = GroupService::new(
            group_store,
            Arc::clone(&contact_store),
            Arc::clone(&registry),
            Arc::clone(&observers),
        );
        Self {
            settings,
            registry,
            observers,
            contact_store,
            contacts,
            groups,
            sessions: SessionManager::new(),
        }
    }

    pub fn settings(&self) -> AppSettings {
        self.settings.get()
    }

    /// Applies to sessions opened afterwards.
    pub fn update_settings(&self, patch: serde_json::Value) -> AppResult<AppSettings> {
        self.settings.update(patch)
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn register_observer(&self, observer: Arc<dyn ContactObserver>) {
        self.observers.register(observer);
    }

    pub fn login(&self, requester: Requester) -> String {
        self.sessions.open_session(requester, self.settings.get().max_undo_depth)
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.close_session(token)
    }

    pub fn requester(&self, token: &str) -> AppResult<Requester> {
        self.sessions.requester(token)
    }

    pub fn create_person(&self, token: &str, payload: CreatePersonPayload) -> AppResult<ContactSummary> {
        let requester = self.sessions.requester(token)?;
        Ok(self.contacts.create_person(&requester, payload)?.read(Contact::summary))
    }

    pub fn create_organization(&self, token: &str, payload: CreateOrganizationPayload) -> AppResult<ContactSummary> {
        let requester = self.sessions.requester(token)?;
        Ok(self.contacts.create_organization(&requester, payload)?.read(Contact::summary))
    }

    /// Counts as an access of the contact.
    pub fn fetch(&self, token: &str, contact_id: Uuid) -> AppResult<ContactSummary> {
        let requester = self.sessions.requester(token)?;
        Ok(self.contacts.query().fetch_one(&requester, contact_id)?.read(Contact::summary))
    }

    /// Detail text formatted with the configured display options. Counts as an access.
    pub fn details(&self, token: &str, contact_id: Uuid) -> AppResult<String> {
        let requester = self.sessions.requester(token)?;
        let details = self.contacts.query().fetch_one(&requester, contact_id)?.read(Contact::details);
        Ok(self.render(&details))
    }

    /// Visible active contacts in the configured default order.
    pub fn list(&self, token: &str) -> AppResult<Vec<ContactSummary>> {
        self.search(token, None)
    }

    pub fn list_with_inactive(&self, token: &str) -> AppResult<Vec<ContactSummary>> {
        let requester = self.sessions.requester(token)?;
        let visible = self.contacts.query().list_visible_with(&requester, true)?;
        Ok(summaries(sort_contacts(visible, self.settings.get().default_sort)))
    }

    pub fn search(&self, token: &str, predicate: Option<&ContactPredicate>) -> AppResult<Vec<ContactSummary>> {
        self.search_sorted(token, predicate, self.settings.get().default_sort)
    }

    pub fn search_sorted(
        &self,
        token: &str,
        predicate: Option<&ContactPredicate>,
        order: ContactSortOrder,
    ) -> AppResult<Vec<ContactSummary>> {
        let requester = self.sessions.requester(token)?;
        let hits = self.contacts.query().search_sorted(&requester, predicate, order)?;
        Ok(summaries(hits))
    }

    pub fn edit(&self, token: &str, contact_id: Uuid, action: impl ContactAction + 'static) -> AppResult<ContactSummary> {
        let requester = self.sessions.requester(token)?;
        let contact = self
            .sessions
            .with_history(token, |history| self.contacts.edit(&requester, history, contact_id, action))??;
        Ok(contact.read(Contact::summary))
    }

    pub fn undo(&self, token: &str) -> AppResult<HistoryOutcome> {
        let outcome = self.sessions.with_history(token, CommandInvoker::undo)?;
        self.persist_outcome(&outcome)?;
        Ok(outcome)
    }

    pub fn redo(&self, token: &str) -> AppResult<HistoryOutcome> {
        let outcome = self.sessions.with_history(token, CommandInvoker::redo)??;
        self.persist_outcome(&outcome)?;
        Ok(outcome)
    }

    /// Undoable command labels, most recent first.
    pub fn history(&self, token: &str) -> AppResult<Vec<String>> {
        self.sessions.with_history(token, |history| history.undo_labels())
    }

    pub fn tag(&self, token: &str, contact_id: Uuid, tag_name: &str) -> AppResult<Tag> {
        let requester = self.sessions.requester(token)?;
        self.sessions
            .with_history(token, |history| self.contacts.tag_contact(&requester, history, contact_id, tag_name))?
    }

    pub fn untag(&self, token: &str, contact_id: Uuid, tag_name: &str) -> AppResult<bool> {
        let requester = self.sessions.requester(token)?;
        self.sessions
            .with_history(token, |history| self.contacts.untag_contact(&requester, history, contact_id, tag_name))?
    }

    pub fn delete(&self, token: &str, contact_id: Uuid) -> AppResult<()> {
        let requester = self.sessions.requester(token)?;
        self.contacts.delete_contact(&requester, contact_id)
    }

    pub fn hard_delete(&self, token: &str, contact_id: Uuid) -> AppResult<()> {
        let requester = self.sessions.requester(token)?;
        self.contacts.hard_delete_contact(&requester, contact_id)?;
        self.groups.prune_missing_contacts()?;
        Ok(())
    }

    pub fn delete_all_for_owner(&self, token: &str, owner_id: UserId) -> AppResult<usize> {
        let requester = self.sessions.requester(token)?;
        let removed = self.contacts.delete_all_for_owner(&requester, owner_id)?;
        self.groups.prune_missing_contacts()?;
        Ok(removed)
    }

    pub fn create_group(&self, token: &str, name: &str, member_ids: &[Uuid]) -> AppResult<GroupSummary> {
        let requester = self.sessions.requester(token)?;
        Ok(self.groups.create_group(&requester, name, member_ids)?.lock().summary())
    }

    pub fn groups(&self, token: &str) -> AppResult<Vec<GroupSummary>> {
        let requester = self.sessions.requester(token)?;
        Ok(self
            .groups
            .groups_for(&requester)?
            .iter()
            .map(|group| group.lock().summary())
            .collect())
    }

    pub fn group_details(&self, token: &str, group_id: Uuid) -> AppResult<String> {
        let requester = self.sessions.requester(token)?;
        let details = self.groups.group_details(&requester, group_id)?;
        Ok(self.render(&details))
    }

    pub fn rename_group(&self, token: &str, group_id: Uuid, name: &str) -> AppResult<GroupSummary> {
        let requester = self.sessions.requester(token)?;
        Ok(self.groups.rename_group(&requester, group_id, name)?.lock().summary())
    }

    pub fn add_group_member(&self, token: &str, group_id: Uuid, member_id: Uuid) -> AppResult<()> {
        let requester = self.sessions.requester(token)?;
        self.groups.add_member(&requester, group_id, member_id)
    }

    pub fn remove_group_member(&self, token: &str, group_id: Uuid, member_id: Uuid) -> AppResult<bool> {
        let requester = self.sessions.requester(token)?;
        self.groups.remove_member(&requester, group_id, member_id)
    }

    pub fn tag_group(&self, token: &str, group_id: Uuid, tag_name: &str) -> AppResult<Tag> {
        let requester = self.sessions.requester(token)?;
        self.groups.add_tag_to_group(&requester, group_id, tag_name)
    }

    pub fn untag_group(&self, token: &str, group_id: Uuid, tag_name: &str) -> AppResult<()> {
        let requester = self.sessions.requester(token)?;
        self.groups.remove_tag_from_group(&requester, group_id, tag_name)
    }

    pub fn delete_group(&self, token: &str, group_id: Uuid) -> AppResult<usize> {
        let requester = self.sessions.requester(token)?;
        self.groups.delete_group(&requester, group_id)
    }

    fn render(&self, details: &str) -> String {
        let options = DisplayOptions::from_settings(&self.settings.get());
        display::render(details, &options).content
    }

    fn persist_outcome(&self, outcome: &HistoryOutcome) -> AppResult<()> {
        if let HistoryOutcome::Applied { contact_id, .. } = outcome {
            if let Some(contact) = self.contact_store.find_by_id(*contact_id)? {
                self.contact_store.save(&contact)?;
            }
        }
        Ok(())
    }
}

fn summaries(contacts: Vec<ContactHandle>) -> Vec<ContactSummary> {
    contacts.iter().map(|contact| contact.read(Contact::summary)).collect()
}
