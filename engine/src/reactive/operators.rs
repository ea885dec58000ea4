//! Value-returning combinators over [`Observable`].
//!
//! Every operator wraps its source instead of mutating it: the result is a
//! new observable fed by a subscription on the source. That subscription is
//! owned by the derived observable and released when the derived observable's
//! last subscriber unsubscribes (or, for [`Observable::take_while`], when the
//! predicate first fails).

use std::cell::Cell;

use super::observable::Observable;

impl<T: 'static> Observable<T> {
    /// Forwards only the values for which `predicate` returns `true`.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Observable<T> {
        let derived = Observable::new();
        let forward = derived.clone();

        let upstream = self.subscribe(move |value| {
            if predicate(value) {
                forward.notify(value);
            }
        });
        derived.adopt_upstream(upstream);

        derived
    }

    /// Forwards `f(value)` for every source value.
    pub fn map<U: 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Observable<U> {
        let derived = Observable::new();
        let forward = derived.clone();

        let upstream = self.subscribe(move |value| forward.notify(&f(value)));
        derived.adopt_upstream(upstream);

        derived
    }

    /// Forwards values while `predicate` holds.
    ///
    /// The first failing value is not forwarded; it also detaches the derived
    /// observable from the source for good.
    pub fn take_while(&self, predicate: impl Fn(&T) -> bool + 'static) -> Observable<T> {
        let derived = Observable::new();
        let forward = derived.clone();
        let done = Cell::new(false);

        let upstream = self.subscribe(move |value| {
            if done.get() {
                return;
            }
            if predicate(value) {
                forward.notify(value);
            } else {
                done.set(true);
                forward.detach_upstream();
            }
        });
        derived.adopt_upstream(upstream);

        derived
    }
}

/// Re-emits every value notified by any of `sources`, in the order the
/// sources notify.
///
/// Unsubscribing the merged observable's last subscriber unsubscribes it
/// from all inputs.
pub fn merge<'a, T: 'static>(sources: impl IntoIterator<Item = &'a Observable<T>>) -> Observable<T> {
    let merged = Observable::new();

    for source in sources {
        let forward = merged.clone();
        merged.adopt_upstream(source.subscribe(move |value| forward.notify(value)));
    }

    merged
}
