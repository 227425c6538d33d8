use crate::contact::{Contact, ContactHandle, ContactKind};
use crate::errors::{AppError, AppResult};
use crate::memento::ContactMemento;
use crate::models::{EmailAddress, PhoneNumber};
use crate::policy;
use crate::tags::Tag;
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// One mutation of a single contact.
///
/// Implementations should validate before mutating. [`Command::execute`]
/// still rolls the contact back if `apply` fails halfway.
pub trait ContactAction: Send {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()>;

    fn label(&self) -> String {
        "edit contact".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SetFirstName(pub String);

impl ContactAction for SetFirstName {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_first_name(&self.0)
    }

    fn label(&self) -> String {
        "set first name".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SetLastName(pub String);

impl ContactAction for SetLastName {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_last_name(&self.0)
    }

    fn label(&self) -> String {
        "set last name".to_string()
    }
}

/// Renames either variant. A person's name is split at the first space into
/// first and last name.
#[derive(Debug, Clone)]
pub struct UpdateName(pub String);

impl ContactAction for UpdateName {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        let full = policy::require_non_blank(&self.0, "Name")?;
        match &mut contact.kind {
            ContactKind::Person {
                first_name,
                last_name,
            } => {
                let (first, last) = match full.split_once(char::is_whitespace) {
                    Some((first, last)) => (first.to_string(), last.trim().to_string()),
                    None => (full.clone(), String::new()),
                };
                *first_name = first;
                *last_name = last;
            }
            ContactKind::Organization { name, .. } => *name = full,
        }
        Ok(())
    }

    fn label(&self) -> String {
        "update name".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SetOrganizationName(pub String);

impl ContactAction for SetOrganizationName {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_organization_name(&self.0)
    }

    fn label(&self) -> String {
        "set organization name".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SetDepartment(pub Option<String>);

impl ContactAction for SetDepartment {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_department(self.0.as_deref())
    }

    fn label(&self) -> String {
        "set department".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SetWebsite(pub Option<String>);

impl ContactAction for SetWebsite {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_website(self.0.as_deref())
    }

    fn label(&self) -> String {
        "set website".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ReplacePhoneNumbers(pub Vec<PhoneNumber>);

impl ContactAction for ReplacePhoneNumbers {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_phone_numbers(self.0.clone())
    }

    fn label(&self) -> String {
        "replace phone numbers".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceEmailAddresses(pub Vec<EmailAddress>);

impl ContactAction for ReplaceEmailAddresses {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_email_addresses(self.0.clone())
    }

    fn label(&self) -> String {
        "replace email addresses".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct AddTag(pub Tag);

impl ContactAction for AddTag {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.add_tag(self.0.clone());
        Ok(())
    }

    fn label(&self) -> String {
        format!("add tag '{}'", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RemoveTag(pub String);

impl ContactAction for RemoveTag {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.remove_tag(&self.0);
        Ok(())
    }

    fn label(&self) -> String {
        format!("remove tag '{}'", self.0.trim())
    }
}

#[derive(Debug, Clone)]
pub struct SetActive(pub bool);

impl ContactAction for SetActive {
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        contact.set_active(self.0);
        Ok(())
    }

    fn label(&self) -> String {
        if self.0 {
            "restore contact".to_string()
        } else {
            "deactivate contact".to_string()
        }
    }
}

/// Adapts a closure into an action.
pub struct FnAction<F> {
    label: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: FnMut(&mut Contact) -> AppResult<()> + Send,
{
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self {
            label: label.into(),
            f,
        }
    }
}

impl<F> ContactAction for FnAction<F>
where
    F: FnMut(&mut Contact) -> AppResult<()> + Send,
{
    fn apply(&mut self, contact: &mut Contact) -> AppResult<()> {
        (self.f)(contact)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Executed,
    Undone,
}

/// A reversible edit of one contact.
///
/// The "before" memento is taken at construction; the "after" memento is
/// taken the first time the action succeeds and is what redo restores, so
/// the action itself runs at most once.
pub struct Command {
    label: String,
    target: ContactHandle,
    before: ContactMemento,
    after: Option<ContactMemento>,
    action: Box<dyn ContactAction>,
    state: CommandState,
}

impl Command {
    pub fn new(target: ContactHandle, action: impl ContactAction + 'static) -> Self {
        Self::from_boxed(target, Box::new(action))
    }

    pub fn from_boxed(target: ContactHandle, action: Box<dyn ContactAction>) -> Self {
        let before = target.read(ContactMemento::capture);
        Self {
            label: action.label(),
            target,
            before,
            after: None,
            action,
            state: CommandState::Pending,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn contact_id(&self) -> Uuid {
        self.target.id()
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn execute(&mut self) -> AppResult<()> {
        match self.state {
            CommandState::Pending => {
                let mut contact = self.target.lock();
                let checkpoint = ContactMemento::capture(&contact);
                if let Err(error) = self.action.apply(&mut contact) {
                    checkpoint.restore(&mut contact);
                    return Err(error);
                }
                self.after = Some(ContactMemento::capture(&contact));
                self.state = CommandState::Executed;
                Ok(())
            }
            CommandState::Undone => {
                let Some(after) = &self.after else {
                    return Err(AppError::Internal(format!(
                        "command '{}' has no recorded result to redo",
                        self.label
                    )));
                };
                after.restore(&mut self.target.lock());
                self.state = CommandState::Executed;
                Ok(())
            }
            CommandState::Executed => Err(AppError::Internal(format!(
                "command '{}' is already applied",
                self.label
            ))),
        }
    }

    /// Restores the "before" state. A pending command stays pending.
    pub fn undo(&mut self) {
        self.before.restore(&mut self.target.lock());
        if self.state == CommandState::Executed {
            self.state = CommandState::Undone;
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("label", &self.label)
            .field("contact_id", &self.target.id())
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    Applied { label: String, contact_id: Uuid },
    Empty,
}

impl HistoryOutcome {
    fn applied(command: &Command) -> Self {
        Self::Applied {
            label: command.label().to_string(),
            contact_id: command.contact_id(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Undo/redo history for one editing session.
#[derive(Debug, Default)]
pub struct CommandInvoker {
    undo_stack: VecDeque<Command>,
    redo_stack: Vec<Command>,
    max_depth: Option<usize>,
}

impl CommandInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the undo history; the oldest entries are forgotten first.
    pub fn with_max_depth(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    pub fn execute_command(&mut self, mut command: Command) -> AppResult<()> {
        command.execute()?;
        tracing::debug!(contact_id = %command.contact_id(), label = %command.label(), "command executed");
        self.undo_stack.push_back(command);
        self.redo_stack.clear();
        if let Some(max_depth) = self.max_depth {
            while self.undo_stack.len() > max_depth {
                self.undo_stack.pop_front();
            }
        }
        Ok(())
    }

    pub fn undo(&mut self) -> HistoryOutcome {
        let Some(mut command) = self.undo_stack.pop_back() else {
            tracing::debug!("nothing to undo");
            return HistoryOutcome::Empty;
        };
        command.undo();
        let outcome = HistoryOutcome::applied(&command);
        self.redo_stack.push(command);
        outcome
    }

    /// A command whose redo fails is dropped from history.
    pub fn redo(&mut self) -> AppResult<HistoryOutcome> {
        let Some(mut command) = self.redo_stack.pop() else {
            tracing::debug!("nothing to redo");
            return Ok(HistoryOutcome::Empty);
        };
        command.execute()?;
        let outcome = HistoryOutcome::applied(&command);
        self.undo_stack.push_back(command);
        Ok(outcome)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Labels from most recent to oldest.
    pub fn undo_labels(&self) -> Vec<String> {
        self.undo_stack
            .iter()
            .rev()
            .map(|command| command.label().to_string())
            .collect()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::tests::{organization, person};
    use crate::tags::TagRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ann() -> ContactHandle {
        ContactHandle::new(person(1, "Ann", "Lee"))
    }

    #[test]
    fn undo_then_redo_round_trips_state() {
        let contact = ann();
        let original = contact.snapshot();
        let mut command = Command::new(contact.clone(), UpdateName("Anna Lee".to_string()));

        command.execute().expect("execute");
        let edited = contact.snapshot();
        assert_eq!(edited.display_name(), "Anna Lee");

        command.undo();
        assert_eq!(command.state(), CommandState::Undone);
        assert_eq!(contact.snapshot(), original);

        command.execute().expect("redo");
        assert_eq!(contact.snapshot(), edited);
        assert_eq!(command.state(), CommandState::Executed);
    }

    #[test]
    fn redo_does_not_rerun_the_action() {
        let contact = ann();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut invoker = CommandInvoker::new();

        let action = FnAction::new("counted rename", move |contact: &mut Contact| {
            counter.fetch_add(1, Ordering::SeqCst);
            contact.set_last_name("Park")
        });
        invoker
            .execute_command(Command::new(contact.clone(), action))
            .expect("execute");
        invoker.undo();
        invoker.redo().expect("redo");

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(contact.display_name(), "Ann Park");
    }

    #[test]
    fn new_command_clears_redo_history() {
        let contact = ann();
        let mut invoker = CommandInvoker::new();
        invoker
            .execute_command(Command::new(contact.clone(), SetFirstName("Anna".to_string())))
            .expect("first");
        invoker.undo();
        assert!(invoker.can_redo());

        invoker
            .execute_command(Command::new(contact.clone(), SetLastName("Kim".to_string())))
            .expect("second");
        assert_eq!(invoker.redo().expect("redo"), HistoryOutcome::Empty);
        assert_eq!(contact.display_name(), "Ann Kim");
    }

    #[test]
    fn redo_is_noop_after_two_executions() {
        let contact = ann();
        let mut invoker = CommandInvoker::new();
        invoker
            .execute_command(Command::new(contact.clone(), SetFirstName("Anna".to_string())))
            .expect("c1");
        invoker
            .execute_command(Command::new(contact.clone(), SetLastName("Kim".to_string())))
            .expect("c2");
        assert_eq!(invoker.undo_depth(), 2);
        assert!(invoker.redo().expect("redo").is_empty());
        assert_eq!(contact.display_name(), "Anna Kim");
    }

    #[test]
    fn failed_action_leaves_contact_and_history_untouched() {
        let contact = ann();
        let before = contact.snapshot();
        let mut invoker = CommandInvoker::new();

        let result = invoker.execute_command(Command::new(contact.clone(), SetFirstName("  ".to_string())));
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(contact.snapshot(), before);
        assert!(!invoker.can_undo());
        assert!(!invoker.can_redo());
    }

    #[test]
    fn partially_applied_action_is_rolled_back() {
        let contact = ann();
        let before = contact.snapshot();
        let action = FnAction::new("half edit", |contact: &mut Contact| {
            contact.set_first_name("Partial")?;
            contact.set_email_addresses(vec![EmailAddress::new("Work", "broken")])
        });
        let mut command = Command::new(contact.clone(), action);

        assert!(command.execute().is_err());
        assert_eq!(command.state(), CommandState::Pending);
        assert_eq!(contact.snapshot(), before);
    }

    #[test]
    fn executing_twice_is_rejected() {
        let contact = ann();
        let mut command = Command::new(contact, SetActive(false));
        command.execute().expect("execute");
        assert!(matches!(command.execute(), Err(AppError::Internal(_))));
    }

    #[test]
    fn undo_on_empty_history_is_reported() {
        let mut invoker = CommandInvoker::new();
        assert_eq!(invoker.undo(), HistoryOutcome::Empty);
        assert_eq!(invoker.redo().expect("redo"), HistoryOutcome::Empty);
    }

    #[test]
    fn history_depth_is_capped() {
        let contact = ann();
        let mut invoker = CommandInvoker::with_max_depth(Some(2));
        for name in ["A", "B", "C"] {
            invoker
                .execute_command(Command::new(contact.clone(), SetFirstName(name.to_string())))
                .expect("execute");
        }
        assert_eq!(invoker.undo_depth(), 2);
        invoker.undo();
        invoker.undo();
        assert!(invoker.undo().is_empty());
        assert_eq!(contact.display_name(), "A Lee");
    }

    #[test]
    fn update_name_handles_both_variants() {
        let person_handle = ann();
        let mut rename = Command::new(person_handle.clone(), UpdateName("Cher".to_string()));
        rename.execute().expect("rename person");
        assert_eq!(person_handle.display_name(), "Cher");

        let org = ContactHandle::new(organization(1, "Acme", Some("Sales")));
        let mut rename = Command::new(org.clone(), UpdateName("Globex".to_string()));
        rename.execute().expect("rename org");
        assert_eq!(org.display_name(), "Globex (Sales)");
    }

    #[test]
    fn tag_commands_are_reversible() {
        let registry = TagRegistry::new();
        let contact = ann();
        let mut invoker = CommandInvoker::new();
        let friend = registry.intern("friend").expect("tag");

        invoker
            .execute_command(Command::new(contact.clone(), AddTag(friend)))
            .expect("tag");
        assert!(contact.read(|c| c.has_tag("friend")));
        assert_eq!(invoker.undo_labels(), vec!["add tag 'friend'".to_string()]);

        invoker.undo();
        assert!(!contact.read(|c| c.has_tag("friend")));
        invoker.redo().expect("redo");
        assert!(contact.read(|c| c.has_tag("friend")));
    }
}
