//! Named store events and their subscribers.
//!
//! Events are queued while a mutation runs and delivered once it completes,
//! so listeners always observe post-index, post-link state.

use crate::{arena::Handle, change::ChangeSet};
use std::{fmt, str::FromStr, sync::Arc};

///
/// EventKind
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    Add,
    Remove,
    Change,
    ChangeField(String),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Change => write!(f, "change"),
            Self::ChangeField(field) => write!(f, "change:{field}"),
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            "change" => Ok(Self::Change),
            other => match other.strip_prefix("change:") {
                Some(field) if !field.is_empty() => Ok(Self::ChangeField(field.to_string())),
                _ => Err(format!("unknown event name '{other}'")),
            },
        }
    }
}

///
/// Event
///

#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub collection: String,
    pub handle: Handle,

    /// Populated for `change` and `change:<field>`.
    pub changes: Option<ChangeSet>,
}

///
/// EventScope
///
/// Where a subscriber listens: every collection, one collection, or one
/// record. Events bubble from record to collection to store.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EventScope {
    Store,
    Collection(String),
    Record(String, Handle),
}

impl EventScope {
    fn covers(&self, event: &Event) -> bool {
        match self {
            Self::Store => true,
            Self::Collection(name) => *name == event.collection,
            Self::Record(name, handle) => *name == event.collection && *handle == event.handle,
        }
    }
}

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

///
/// SubscriptionId
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    scope: EventScope,
    kind: EventKind,
    listener: Listener,
}

///
/// EventBus
///

#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    queue: Vec<Event>,
    next_id: u64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        scope: EventScope,
        kind: EventKind,
        listener: Listener,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription {
            id,
            scope,
            kind,
            listener,
        });

        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let len = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);

        self.subscriptions.len() != len
    }

    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub(crate) fn queue(&mut self, event: Event) {
        if self.has_subscribers() {
            self.queue.push(event);
        }
    }

    /// Take queued events together with the listeners each one reaches.
    pub(crate) fn drain(&mut self) -> Vec<(Event, Vec<Listener>)> {
        let queued = std::mem::take(&mut self.queue);

        queued
            .into_iter()
            .map(|event| {
                let listeners = self
                    .subscriptions
                    .iter()
                    .filter(|s| s.kind == event.kind && s.scope.covers(&event))
                    .map(|s| Arc::clone(&s.listener))
                    .collect();
                (event, listeners)
            })
            .collect()
    }
}

/// Deliver drained events in order.
pub(crate) fn deliver(batch: Vec<(Event, Vec<Listener>)>) {
    for (event, listeners) in batch {
        for listener in listeners {
            listener(&event);
        }
    }
}

///
/// TESTS
///
