//! Push based streams.
//!
//! A [`Stream`] is a lazily started, multicast source of values. Values are
//! delivered synchronously, inside the call that emits them, to every
//! listener attached at that moment.
//!
//! A stream built with a producer ([`Stream::create`] and every operator)
//! starts its producer when the first listener attaches and stops it when the
//! last listener detaches or when the stream errors or completes. A stopped
//! stream starts again on the next subscription.
//!
//! ```rust
//! use illuminati::stream::{subject, Event};
//!
//! let (tx, clicks) = subject::<()>();
//! let count = clicks.fold(0, |n, ()| n + 1);
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(vec![]));
//! let _sub = count.subscribe({
//!     let seen = seen.clone();
//!     move |ev| {
//!         if let Event::Next(n) = ev {
//!             seen.borrow_mut().push(n);
//!         }
//!     }
//! });
//! tx.next(());
//! tx.next(());
//! assert_eq!(*seen.borrow(), vec![0, 1, 2]);
//! ```
use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use crate::error::Error;

mod bridge;
mod operators;

pub use bridge::AsyncStream;

/// One delivery from a stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Event<T> {
    Next(T),
    Error(Error),
    Complete,
}

impl<T> Event<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Next(_))
    }
}

type ListenerFn<T> = Rc<dyn Fn(Event<T>)>;
type Producer<T> = Rc<dyn Fn(Emitter<T>) -> Guard>;

struct Entry<T> {
    id: u64,
    active: Rc<Cell<bool>>,
    listener: ListenerFn<T>,
}

struct Inner<T> {
    listeners: RefCell<Vec<Entry<T>>>,
    /// `None` for subjects, which are driven by a [`Sender`].
    producer: Option<Producer<T>>,
    running: Cell<bool>,
    /// Bumped every time the producer stops, so a stale [`Emitter`] from a
    /// previous run can't deliver into the current one.
    epoch: Cell<u64>,
    guard: RefCell<Option<Guard>>,
    memory: Option<RefCell<Option<T>>>,
    next_id: Cell<u64>,
}

impl<T: Clone + 'static> Inner<T> {
    fn new(producer: Option<Producer<T>>, remember: bool) -> Rc<Self> {
        Rc::new(Inner {
            listeners: Default::default(),
            producer,
            running: Cell::new(false),
            epoch: Cell::new(0),
            guard: Default::default(),
            memory: remember.then(Default::default),
            next_id: Cell::new(0),
        })
    }

    fn deliver(&self, event: Event<T>) {
        match event {
            Event::Next(t) => {
                if let Some(memory) = self.memory.as_ref() {
                    *memory.borrow_mut() = Some(t.clone());
                }
                // Listeners may subscribe or unsubscribe while we deliver,
                // so iterate over a snapshot and skip detached entries.
                let snapshot = self
                    .listeners
                    .borrow()
                    .iter()
                    .map(|entry| (entry.active.clone(), entry.listener.clone()))
                    .collect::<Vec<_>>();
                for (active, listener) in snapshot {
                    if active.get() {
                        listener(Event::Next(t.clone()));
                    }
                }
            }
            terminal => {
                let entries = std::mem::take(&mut *self.listeners.borrow_mut());
                for entry in entries.iter() {
                    entry.active.set(false);
                }
                self.stop();
                for entry in entries.into_iter() {
                    (entry.listener)(terminal.clone());
                }
            }
        }
    }

    fn stop(&self) {
        self.running.set(false);
        self.epoch.set(self.epoch.get() + 1);
        if self.producer.is_some() {
            if let Some(memory) = self.memory.as_ref() {
                memory.borrow_mut().take();
            }
        }
        let guard = self.guard.borrow_mut().take();
        drop(guard);
    }

    fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

trait Detach {
    fn detach(&self, id: u64);
}

impl<T: Clone + 'static> Detach for Inner<T> {
    fn detach(&self, id: u64) {
        let removed = {
            let mut listeners = self.listeners.borrow_mut();
            let index = listeners.iter().position(|entry| entry.id == id);
            index.map(|i| listeners.remove(i))
        };
        if let Some(entry) = removed {
            entry.active.set(false);
            if self.producer.is_some() && self.running.get() && self.listener_count() == 0 {
                self.stop();
            }
        }
    }
}

/// A live attachment of a listener to a stream.
///
/// Dropping the subscription detaches the listener. A detached listener is
/// never called again, even if it was detached in the middle of a delivery.
#[must_use = "dropping a Subscription detaches its listener"]
pub struct Subscription {
    id: u64,
    active: Rc<Cell<bool>>,
    /// Keeps the stream (and through its guard, its upstreams) alive while
    /// subscribed.
    stream: Option<Rc<dyn Detach>>,
}

impl Subscription {
    /// Detach the listener now.
    pub fn unsubscribe(self) {}

    /// Whether the listener can still receive events.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.set(false);
        if let Some(stream) = self.stream.take() {
            stream.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

/// Resources held by a running producer, released when it stops.
#[derive(Default)]
pub struct Guard {
    subscriptions: Vec<Subscription>,
    on_stop: Option<Box<dyn FnOnce()>>,
}

impl Guard {
    /// A guard that releases nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// A guard that runs `f` when the producer stops.
    pub fn on_stop(f: impl FnOnce() + 'static) -> Self {
        Guard {
            subscriptions: vec![],
            on_stop: Some(Box::new(f)),
        }
    }
}

impl From<Subscription> for Guard {
    fn from(sub: Subscription) -> Self {
        Guard {
            subscriptions: vec![sub],
            on_stop: None,
        }
    }
}

impl From<Vec<Subscription>> for Guard {
    fn from(subscriptions: Vec<Subscription>) -> Self {
        Guard {
            subscriptions,
            on_stop: None,
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.subscriptions.clear();
        if let Some(f) = self.on_stop.take() {
            f();
        }
    }
}

/// The handle a producer emits through.
///
/// Emissions from an emitter whose run has ended are ignored.
pub struct Emitter<T> {
    inner: Weak<Inner<T>>,
    epoch: u64,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Emitter {
            inner: self.inner.clone(),
            epoch: self.epoch,
        }
    }
}

impl<T: Clone + 'static> Emitter<T> {
    fn emit(&self, event: Event<T>) {
        if let Some(inner) = self.inner.upgrade() {
            if inner.running.get() && inner.epoch.get() == self.epoch {
                inner.deliver(event);
            }
        }
    }

    pub fn next(&self, t: T) {
        self.emit(Event::Next(t));
    }

    pub fn error(&self, err: Error) {
        self.emit(Event::Error(err));
    }

    pub fn complete(&self) {
        self.emit(Event::Complete);
    }

    /// Whether this emitter's run is still live.
    pub fn is_open(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.running.get() && inner.epoch.get() == self.epoch)
            .unwrap_or(false)
    }
}

/// The imperative side of a [`subject`].
pub struct Sender<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Sender<T> {
    pub fn next(&self, t: T) {
        self.inner.deliver(Event::Next(t));
    }

    pub fn error(&self, err: Error) {
        self.inner.deliver(Event::Error(err));
    }

    pub fn complete(&self) {
        self.inner.deliver(Event::Complete);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }
}

/// Create a stream driven by a [`Sender`].
pub fn subject<T: Clone + 'static>() -> (Sender<T>, Stream<T>) {
    let inner = Inner::new(None, false);
    (
        Sender {
            inner: inner.clone(),
        },
        Stream { inner },
    )
}

/// Create a stream driven by a [`Sender`] that replays its latest value to
/// new listeners.
pub fn remembering_subject<T: Clone + 'static>() -> (Sender<T>, Stream<T>) {
    let inner = Inner::new(None, true);
    (
        Sender {
            inner: inner.clone(),
        },
        Stream { inner },
    )
}

/// A lazily started, multicast, push based stream of `T`.
pub struct Stream<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Stream {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(&format!("Stream<{}>", std::any::type_name::<T>()))
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("running", &self.inner.running.get())
            .finish()
    }
}

impl<T: Clone + 'static> Stream<T> {
    fn with_producer(remember: bool, producer: impl Fn(Emitter<T>) -> Guard + 'static) -> Self {
        Stream {
            inner: Inner::new(Some(Rc::new(producer)), remember),
        }
    }

    /// Create a stream from a producer.
    ///
    /// The producer runs each time the stream starts. The returned [`Guard`]
    /// is dropped when the stream stops.
    pub fn create(producer: impl Fn(Emitter<T>) -> Guard + 'static) -> Self {
        Self::with_producer(false, producer)
    }

    /// A stream that emits `t` and completes.
    pub fn of(t: T) -> Self {
        Self::create(move |out| {
            out.next(t.clone());
            out.complete();
            Guard::none()
        })
    }

    /// A stream that emits every item and completes.
    pub fn from_iter(items: impl IntoIterator<Item = T>) -> Self {
        let items = items.into_iter().collect::<Vec<_>>();
        Self::create(move |out| {
            for item in items.iter() {
                out.next(item.clone());
            }
            out.complete();
            Guard::none()
        })
    }

    /// A stream that completes without emitting.
    pub fn empty() -> Self {
        Self::create(|out| {
            out.complete();
            Guard::none()
        })
    }

    /// A stream that never emits.
    pub fn never() -> Self {
        Self::create(|_| Guard::none())
    }

    /// A stream that errors immediately.
    pub fn fail(err: Error) -> Self {
        Self::create(move |out| {
            out.error(err.clone());
            Guard::none()
        })
    }

    /// Attach a listener.
    pub fn subscribe(&self, listener: impl Fn(Event<T>) + 'static) -> Subscription {
        let inner = &self.inner;
        let id = inner.next_id.get();
        inner.next_id.set(id + 1);
        let active = Rc::new(Cell::new(true));
        let listener: ListenerFn<T> = Rc::new(listener);
        inner.listeners.borrow_mut().push(Entry {
            id,
            active: active.clone(),
            listener: listener.clone(),
        });
        let subscription = Subscription {
            id,
            active: active.clone(),
            stream: Some(inner.clone() as Rc<dyn Detach>),
        };

        if let Some(producer) = inner.producer.clone() {
            if !inner.running.get() {
                inner.running.set(true);
                let epoch = inner.epoch.get();
                let guard = producer(Emitter {
                    inner: Rc::downgrade(inner),
                    epoch,
                });
                if inner.running.get() && inner.epoch.get() == epoch {
                    *inner.guard.borrow_mut() = Some(guard);
                }
                return subscription;
            }
        }

        let remembered = inner
            .memory
            .as_ref()
            .and_then(|memory| memory.borrow().clone());
        if let Some(t) = remembered {
            if active.get() {
                listener(Event::Next(t));
            }
        }
        subscription
    }

    /// Attach a listener that only cares about values.
    pub fn for_each(&self, f: impl Fn(T) + 'static) -> Subscription {
        self.subscribe(move |ev| {
            if let Event::Next(t) = ev {
                f(t);
            }
        })
    }

    /// Whether the producer of this stream is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    pub(crate) fn record<T: Clone + 'static>(st: &Stream<T>) -> (Rc<RefCell<Vec<Event<T>>>>, Subscription) {
        let events = Rc::new(RefCell::new(vec![]));
        let sub = st.subscribe({
            let events = events.clone();
            move |ev| events.borrow_mut().push(ev)
        });
        (events, sub)
    }

    #[test]
    fn of_emits_then_completes() {
        let (events, _sub) = record(&Stream::of(3));
        assert_eq!(*events.borrow(), vec![Event::Next(3), Event::Complete]);
    }

    #[test]
    fn producer_is_lazy_and_restartable() {
        let starts = Rc::new(Cell::new(0));
        let stops = Rc::new(Cell::new(0));
        let st = Stream::<u32>::create({
            let starts = starts.clone();
            let stops = stops.clone();
            move |_out| {
                starts.set(starts.get() + 1);
                let stops = stops.clone();
                Guard::on_stop(move || stops.set(stops.get() + 1))
            }
        });
        assert_eq!(starts.get(), 0);
        let a = st.subscribe(|_| {});
        let b = st.subscribe(|_| {});
        assert_eq!(starts.get(), 1, "multicast shares one producer run");
        drop(a);
        assert_eq!(stops.get(), 0);
        drop(b);
        assert_eq!(stops.get(), 1);
        let _c = st.subscribe(|_| {});
        assert_eq!(starts.get(), 2);
    }

    #[test]
    fn subject_delivers_synchronously_to_all() {
        let (tx, rx) = subject::<&'static str>();
        let (a, _sa) = record(&rx);
        let (b, _sb) = record(&rx);
        tx.next("hello");
        assert_eq!(*a.borrow(), vec![Event::Next("hello")]);
        assert_eq!(*b.borrow(), vec![Event::Next("hello")]);
    }

    #[test]
    fn detached_listener_is_not_called_mid_delivery() {
        let (tx, rx) = subject::<u8>();
        let second: Rc<RefCell<Option<Subscription>>> = Default::default();
        let calls = Rc::new(Cell::new(0));
        let _first = rx.subscribe({
            let second = second.clone();
            move |_| {
                second.borrow_mut().take();
            }
        });
        *second.borrow_mut() = Some(rx.subscribe({
            let calls = calls.clone();
            move |_| calls.set(calls.get() + 1)
        }));
        tx.next(1);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn remembering_subject_replays_latest() {
        let (tx, rx) = remembering_subject::<u8>();
        tx.next(1);
        tx.next(2);
        let (events, _sub) = record(&rx);
        assert_eq!(*events.borrow(), vec![Event::Next(2)]);
    }

    #[test]
    fn complete_detaches_everyone() {
        let (tx, rx) = subject::<u8>();
        let (events, sub) = record(&rx);
        tx.complete();
        tx.next(1);
        assert!(!sub.is_active());
        assert_eq!(*events.borrow(), vec![Event::Complete]);
    }
}
