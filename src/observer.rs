use crate::contact::Contact;
use crate::errors::AppResult;
use crate::tags::Tag;
use std::sync::{Arc, PoisonError, RwLock};

/// Side-channel listener for contact lifecycle events.
///
/// Observers receive a snapshot taken after the change; no contact lock is
/// held while they run.
pub trait ContactObserver: Send + Sync {
    fn name(&self) -> &str {
        "observer"
    }

    fn on_contact_deleted(&self, contact: &Contact) -> AppResult<()>;

    fn on_contact_tagged(&self, _contact: &Contact, _tag: &Tag) -> AppResult<()> {
        Ok(())
    }

    fn on_contact_untagged(&self, _contact: &Contact, _tag: &Tag) -> AppResult<()> {
        Ok(())
    }
}

/// Fans events out to every registered observer. Observer failures are
/// logged and never reach the caller.
#[derive(Default)]
pub struct ObserverHub {
    observers: RwLock<Vec<Arc<dyn ContactObserver>>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn ContactObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_deleted(&self, contact: &Contact) {
        self.each("deleted", contact, |observer| observer.on_contact_deleted(contact));
    }

    pub fn notify_tagged(&self, contact: &Contact, tag: &Tag) {
        self.each("tagged", contact, |observer| observer.on_contact_tagged(contact, tag));
    }

    pub fn notify_untagged(&self, contact: &Contact, tag: &Tag) {
        self.each("untagged", contact, |observer| observer.on_contact_untagged(contact, tag));
    }

    fn each<F>(&self, event: &str, contact: &Contact, notify: F)
    where
        F: Fn(&dyn ContactObserver) -> AppResult<()>,
    {
        // clone the list so observers may register others without deadlocking
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            if let Err(error) = notify(observer.as_ref()) {
                tracing::warn!(
                    observer = observer.name(),
                    event,
                    contact_id = %contact.id(),
                    error = %error,
                    "contact observer failed"
                );
            }
        }
    }
}

/// Writes every event to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditLogObserver;

impl ContactObserver for AuditLogObserver {
    fn name(&self) -> &str {
        "audit-log"
    }

    fn on_contact_deleted(&self, contact: &Contact) -> AppResult<()> {
        tracing::info!(
            target: "audit",
            contact_id = %contact.id(),
            owner_id = %contact.owner_id(),
            active = contact.is_active(),
            "contact deleted"
        );
        Ok(())
    }

    fn on_contact_tagged(&self, contact: &Contact, tag: &Tag) -> AppResult<()> {
        tracing::info!(target: "audit", contact_id = %contact.id(), tag = %tag, "contact tagged");
        Ok(())
    }

    fn on_contact_untagged(&self, contact: &Contact, tag: &Tag) -> AppResult<()> {
        tracing::info!(target: "audit", contact_id = %contact.id(), tag = %tag, "contact untagged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::tests::person;
    use crate::errors::AppError;
    use crate::tags::TagRegistry;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ContactObserver for Recorder {
        fn on_contact_deleted(&self, contact: &Contact) -> AppResult<()> {
            self.events
                .lock()
                .expect("events")
                .push(format!("deleted {}", contact.display_name()));
            Ok(())
        }

        fn on_contact_tagged(&self, contact: &Contact, tag: &Tag) -> AppResult<()> {
            self.events
                .lock()
                .expect("events")
                .push(format!("tagged {} {}", contact.display_name(), tag));
            Ok(())
        }
    }

    struct Failing;

    impl ContactObserver for Failing {
        fn on_contact_deleted(&self, _contact: &Contact) -> AppResult<()> {
            Err(AppError::Internal("observer offline".to_string()))
        }
    }

    #[test]
    fn failures_do_not_stop_other_observers() {
        let hub = ObserverHub::new();
        let recorder = Arc::new(Recorder::default());
        hub.register(Arc::new(Failing));
        hub.register(recorder.clone());
        hub.register(Arc::new(AuditLogObserver));
        assert_eq!(hub.len(), 3);

        let ann = person(1, "Ann", "Lee");
        hub.notify_deleted(&ann);
        let tag = TagRegistry::new().intern("friend").expect("tag");
        hub.notify_tagged(&ann, &tag);
        hub.notify_untagged(&ann, &tag);

        let events = recorder.events.lock().expect("events").clone();
        assert_eq!(events, vec!["deleted Ann Lee", "tagged Ann Lee friend"]);
    }

    #[test]
    fn empty_hub_is_a_noop() {
        let hub = ObserverHub::new();
        assert!(hub.is_empty());
        hub.notify_deleted(&person(1, "Ann", "Lee"));
    }
}
