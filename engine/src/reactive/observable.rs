//! Synchronous, multi-subscriber push streams.
//!
//! An [`Observable`] is a list of callbacks kept in subscription order. A call
//! to [`Observable::notify`] runs every callback that is subscribed at that
//! moment, synchronously, before returning. Nothing is buffered: a subscriber
//! only ever sees values notified after it subscribed.
//!
//! # Re-entrancy
//!
//! Callbacks may subscribe or unsubscribe (on the same observable or any
//! other) while a notification is in flight. Delivery iterates over a snapshot
//! of the subscriber list and skips entries removed mid-iteration, so a
//! surviving subscriber is invoked exactly once and a subscriber added during
//! the notification does not see the value being delivered.
//!
//! # Failure isolation
//!
//! Each callback runs under [`isolate`]. A panicking subscriber is logged and
//! skipped; the remaining subscribers still receive the value.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use actwin_engine::reactive::Observable;
//!
//! let numbers = Observable::<i32>::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let sink = Rc::clone(&seen);
//! let subscription = numbers.subscribe(move |n| sink.borrow_mut().push(*n));
//!
//! numbers.notify(&1);
//! subscription.unsubscribe();
//! numbers.notify(&2);
//!
//! assert_eq!(*seen.borrow(), vec![1]);
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::error;

/// A shared subscriber callback.
///
/// [`Observable::unsubscribe`] matches callbacks by pointer identity, so keep
/// a clone of the `Rc` if you intend to remove a callback that way.
pub type Callback<T> = Rc<dyn Fn(&T)>;

struct Entry<T> {
    id: u64,
    callback: Callback<T>,
}

struct Inner<T> {
    subscribers: RefCell<Vec<Entry<T>>>,
    next_id: Cell<u64>,
    /// Subscriptions this observable holds on its sources (derived observables only).
    upstream: RefCell<Vec<Subscription>>,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            upstream: RefCell::new(Vec::new()),
        }
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.subscribers.borrow().iter().any(|entry| entry.id == id)
    }

    /// Removes one subscriber. A derived observable whose last subscriber
    /// leaves also lets go of its sources.
    fn remove(&self, id: u64) -> bool {
        let (removed, now_empty) = {
            let mut subscribers = self.subscribers.borrow_mut();
            let before = subscribers.len();
            subscribers.retain(|entry| entry.id != id);
            (subscribers.len() < before, subscribers.is_empty())
        };

        if removed && now_empty {
            self.detach_upstream();
        }

        removed
    }

    fn detach_upstream(&self) {
        let upstream = std::mem::take(&mut *self.upstream.borrow_mut());
        for subscription in upstream {
            subscription.unsubscribe();
        }
    }
}

/// A typed, synchronous push stream.
///
/// Cloning an `Observable` yields another handle to the same subscriber list.
pub struct Observable<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .field("upstream", &self.inner.upstream.borrow().len())
            .finish()
    }
}

impl<T: 'static> Observable<T> {
    /// Creates an observable with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner::new()),
        }
    }

    /// Appends `callback` to the subscriber list.
    ///
    /// The returned [`Subscription`] removes exactly this callback.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe_callback(Rc::new(callback))
    }

    /// Like [`subscribe`](Self::subscribe), for a callback the caller keeps a
    /// handle to (so it can later be passed to [`unsubscribe`](Self::unsubscribe)).
    pub fn subscribe_callback(&self, callback: Callback<T>) -> Subscription {
        let id = self.inner.allocate_id();
        self.insert(id, callback)
    }

    /// Subscribes `callback` for a single notification.
    ///
    /// The callback is removed before it runs, so it is never invoked twice
    /// even if it notifies this observable again.
    pub fn first(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.allocate_id();
        let source = Rc::downgrade(&self.inner);
        let fired = Cell::new(false);

        self.insert(
            id,
            Rc::new(move |value: &T| {
                if fired.replace(true) {
                    return;
                }
                if let Some(inner) = source.upgrade() {
                    inner.remove(id);
                }
                callback(value);
            }),
        )
    }

    fn insert(&self, id: u64, callback: Callback<T>) -> Subscription {
        self.inner
            .subscribers
            .borrow_mut()
            .push(Entry { id, callback });

        let source = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = source.upgrade() {
                inner.remove(id);
            }
        })
    }

    /// Delivers `value` to every current subscriber, in subscription order.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|entry| (entry.id, Rc::clone(&entry.callback)))
            .collect();

        for (id, callback) in snapshot {
            if !self.inner.is_subscribed(id) {
                continue;
            }
            isolate("observable subscriber", || callback(value));
        }
    }

    /// Removes the first remaining subscription whose callback is `callback`
    /// (pointer identity).
    ///
    /// Returns `true` if a subscriber was removed. A [`Subscription`] token for
    /// the same entry becomes a no-op afterwards.
    pub fn unsubscribe(&self, callback: &Callback<T>) -> bool {
        let id = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .find(|entry| std::ptr::addr_eq(Rc::as_ptr(&entry.callback), Rc::as_ptr(callback)))
            .map(|entry| entry.id);

        id.is_some_and(|id| self.inner.remove(id))
    }

    /// Number of currently subscribed callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Drops every subscriber and, for derived observables, detaches from the
    /// sources.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.inner.subscribers.borrow_mut());
        drop(drained);
        self.inner.detach_upstream();
    }

    /// Records a subscription on a source that this (derived) observable owns.
    pub(super) fn adopt_upstream(&self, subscription: Subscription) {
        self.inner.upstream.borrow_mut().push(subscription);
    }

    /// Releases every source subscription held by this observable.
    pub(super) fn detach_upstream(&self) {
        self.inner.detach_upstream();
    }
}

/// Capability token for one subscriber's membership.
///
/// [`unsubscribe`](Self::unsubscribe) is idempotent. Dropping the token does
/// not unsubscribe.
pub struct Subscription {
    teardown: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    /// Wraps an arbitrary teardown action.
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: RefCell::new(Some(Box::new(teardown))),
        }
    }

    /// A token that is already unsubscribed.
    #[must_use]
    pub fn closed() -> Self {
        Self {
            teardown: RefCell::new(None),
        }
    }

    /// Revokes the membership. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether this token has been used.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.teardown.borrow().is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Runs `f`, containing any panic it raises.
///
/// Returns `false` if `f` panicked. The panic is logged with `context` so
/// the failing callback can be located.
pub fn isolate<F: FnOnce()>(context: &'static str, f: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                context,
                panic = %panic_message(payload.as_ref()),
                "Callback panicked, continuing delivery"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
