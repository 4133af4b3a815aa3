//! Typed publish/subscribe bus shared by the session and authorization components.
//!
//! Handlers for one event name run synchronously, in subscription order. A
//! failing or panicking handler is logged and never stops its siblings.
//! Unsubscribing is idempotent and safe from inside a handler.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;

use crate::authorization::AuthorizationSnapshot;
use crate::sync::lock;

/// An event that can travel over an [`EventBus`].
pub trait BusEvent: Clone + fmt::Debug + Send + Sync + 'static {
    type Name: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn name(&self) -> Self::Name;
}

/// Failure reported by a bus handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Callback type for handling dispatched events.
pub type EventHandler<E> = Arc<dyn Fn(&E) -> Result<(), HandlerError> + Send + Sync>;

struct HandlerEntry<E: BusEvent> {
    id: u64,
    active: Arc<AtomicBool>,
    handler: EventHandler<E>,
}

struct Registry<E: BusEvent> {
    next_id: u64,
    handlers: HashMap<E::Name, Vec<HandlerEntry<E>>>,
}

impl<E: BusEvent> Registry<E> {
    fn remove(&mut self, name: E::Name, id: u64) {
        if let Some(entries) = self.handlers.get_mut(&name) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                self.handlers.remove(&name);
            }
        }
    }
}

/// Owned, cloneable publish/subscribe handle.
///
/// Clones share the same registry, so a bus constructed once at startup can be
/// handed to every consumer.
pub struct EventBus<E: BusEvent> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.registry);
        f.debug_struct("EventBus")
            .field("event_names", &registry.handlers.len())
            .finish()
    }
}

impl<E: BusEvent> EventBus<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                handlers: HashMap::new(),
            })),
        }
    }

    /// Registers `handler` for `name` and returns the handle that removes it.
    pub fn on<F>(&self, name: E::Name, handler: F) -> Subscription
    where
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.entry(name).or_default().push(HandlerEntry {
                id,
                active: Arc::clone(&active),
                handler: Arc::new(handler),
            });
            id
        };

        let registry: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription {
            active,
            detach: Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    lock(&registry).remove(name, id);
                }
            }),
        }
    }

    /// Dispatches `event` to every handler currently registered for its name.
    pub fn emit(&self, event: E) {
        let name = event.name();
        let entries = {
            let registry = lock(&self.registry);
            registry
                .handlers
                .get(&name)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| (Arc::clone(&entry.active), Arc::clone(&entry.handler)))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        tracing::debug!(event = ?name, handlers = entries.len(), "dispatching event");

        for (position, (active, handler)) in entries.iter().enumerate() {
            // Removed by an earlier sibling during this dispatch.
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(event = ?name, position, reason = %error, "event handler failed");
                }
                Err(_) => {
                    tracing::error!(event = ?name, position, "event handler panicked");
                }
            }
        }
    }

    /// Number of live handlers for `name`.
    pub fn subscriber_count(&self, name: E::Name) -> usize {
        lock(&self.registry)
            .handlers
            .get(&name)
            .map_or(0, Vec::len)
    }
}

/// Handle returned by [`EventBus::on`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    active: Arc<AtomicBool>,
    detach: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Removes the handler. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            (self.detach)();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Names of the authentication transitions carried by the [`AuthEventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEventName {
    LoginSuccess,
    Logout,
    SessionExpired,
    RegisterSuccess,
    PermissionsReady,
}

impl AuthEventName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::Logout => "LOGOUT",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::RegisterSuccess => "REGISTER_SUCCESS",
            Self::PermissionsReady => "PERMISSIONS_READY",
        }
    }
}

impl fmt::Display for AuthEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication transitions shared between producers and consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    LoginSuccess,
    Logout,
    SessionExpired,
    RegisterSuccess,
    /// Carries the snapshot that was just applied.
    PermissionsReady(Arc<AuthorizationSnapshot>),
}

impl BusEvent for AuthEvent {
    type Name = AuthEventName;

    fn name(&self) -> AuthEventName {
        match self {
            Self::LoginSuccess => AuthEventName::LoginSuccess,
            Self::Logout => AuthEventName::Logout,
            Self::SessionExpired => AuthEventName::SessionExpired,
            Self::RegisterSuccess => AuthEventName::RegisterSuccess,
            Self::PermissionsReady(_) => AuthEventName::PermissionsReady,
        }
    }
}

/// UI-level signals that are not authentication transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiEvent {
    /// An auth modal was dismissed by an unauthenticated visitor.
    NavigateHome,
    /// The rendering layer tore down a modal.
    ModalClosed,
}

impl BusEvent for UiEvent {
    type Name = UiEvent;

    fn name(&self) -> UiEvent {
        *self
    }
}

pub type AuthEventBus = EventBus<AuthEvent>;
pub type UiEventBus = EventBus<UiEvent>;
