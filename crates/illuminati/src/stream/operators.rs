//! Stream combinators.
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use super::{Emitter, Event, Guard, Stream};

impl<T: Clone + 'static> Stream<T> {
    /// Derive a stream whose values are computed from this one's.
    ///
    /// `make` runs every time the derived stream starts, receives the
    /// derived stream's emitter (so it may emit starting values) and returns
    /// the per-run handler for upstream values.
    fn operate<U, F, N>(&self, remember: bool, make: F) -> Stream<U>
    where
        U: Clone + 'static,
        F: Fn(&Emitter<U>) -> N + 'static,
        N: Fn(&Emitter<U>, T) + 'static,
    {
        let source = self.clone();
        Stream::with_producer(remember, move |out: Emitter<U>| {
            let on_next = make(&out);
            if !out.is_open() {
                return Guard::none();
            }
            Guard::from(source.subscribe(move |ev| match ev {
                Event::Next(t) => on_next(&out, t),
                Event::Error(err) => out.error(err),
                Event::Complete => out.complete(),
            }))
        })
    }

    pub fn map<U: Clone + 'static>(&self, f: impl Fn(T) -> U + 'static) -> Stream<U> {
        let f = Rc::new(f);
        self.operate(false, move |_| {
            let f = f.clone();
            move |out: &Emitter<U>, t| out.next(f(t))
        })
    }

    /// Replace every value with a clone of `u`.
    pub fn map_to<U: Clone + 'static>(&self, u: U) -> Stream<U> {
        self.map(move |_| u.clone())
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        let predicate = Rc::new(predicate);
        self.operate(false, move |_| {
            let predicate = predicate.clone();
            move |out: &Emitter<T>, t| {
                if predicate(&t) {
                    out.next(t);
                }
            }
        })
    }

    /// Accumulate values, starting by emitting `seed`.
    ///
    /// The result remembers its latest value.
    pub fn fold<A: Clone + 'static>(&self, seed: A, f: impl Fn(&A, T) -> A + 'static) -> Stream<A> {
        let f = Rc::new(f);
        self.operate(true, move |out: &Emitter<A>| {
            out.next(seed.clone());
            let acc = RefCell::new(seed.clone());
            let f = f.clone();
            move |out: &Emitter<A>, t| {
                let next = f(&acc.borrow(), t);
                *acc.borrow_mut() = next.clone();
                out.next(next);
            }
        })
    }

    /// Emit the first `n` values, then complete.
    pub fn take(&self, n: usize) -> Stream<T> {
        self.operate(false, move |out: &Emitter<T>| {
            if n == 0 {
                out.complete();
            }
            let taken = Cell::new(0);
            move |out: &Emitter<T>, t| {
                if taken.get() < n {
                    taken.set(taken.get() + 1);
                    out.next(t);
                    if taken.get() == n {
                        out.complete();
                    }
                }
            }
        })
    }

    /// Skip the first `n` values.
    pub fn drop(&self, n: usize) -> Stream<T> {
        self.operate(false, move |_| {
            let dropped = Cell::new(0);
            move |out: &Emitter<T>, t| {
                if dropped.get() < n {
                    dropped.set(dropped.get() + 1);
                } else {
                    out.next(t);
                }
            }
        })
    }

    /// Skip values considered equal to the previous one by `eq`.
    pub fn drop_repeats_by(&self, eq: impl Fn(&T, &T) -> bool + 'static) -> Stream<T> {
        let eq = Rc::new(eq);
        self.operate(false, move |_| {
            let eq = eq.clone();
            let last: RefCell<Option<T>> = RefCell::new(None);
            move |out: &Emitter<T>, t| {
                let repeated = last.borrow().as_ref().map(|prev| eq(prev, &t)).unwrap_or(false);
                if !repeated {
                    *last.borrow_mut() = Some(t.clone());
                    out.next(t);
                }
            }
        })
    }

    /// Emit `t` first, then every value of this stream.
    ///
    /// The result remembers its latest value.
    pub fn start_with(&self, t: T) -> Stream<T> {
        self.operate(true, move |out: &Emitter<T>| {
            out.next(t.clone());
            |out: &Emitter<T>, t| out.next(t)
        })
    }

    /// A stream that replays its latest value to listeners that attach while
    /// it runs.
    pub fn remember(&self) -> Stream<T> {
        self.operate(true, |_| |out: &Emitter<T>, t| out.next(t))
    }

    pub fn merge(&self, other: &Stream<T>) -> Stream<T> {
        Stream::merge_all(vec![self.clone(), other.clone()])
    }

    /// Interleave the values of all streams.
    ///
    /// Completes once every merged stream has completed.
    pub fn merge_all(streams: impl IntoIterator<Item = Stream<T>>) -> Stream<T> {
        let streams = streams.into_iter().collect::<Vec<_>>();
        Stream::create(move |out| {
            let remaining = Rc::new(Cell::new(streams.len()));
            if streams.is_empty() {
                out.complete();
                return Guard::none();
            }
            let mut subscriptions = vec![];
            for stream in streams.iter() {
                if !out.is_open() {
                    break;
                }
                let out = out.clone();
                let remaining = remaining.clone();
                subscriptions.push(stream.subscribe(move |ev| match ev {
                    Event::Next(t) => out.next(t),
                    Event::Error(err) => out.error(err),
                    Event::Complete => {
                        remaining.set(remaining.get().saturating_sub(1));
                        if remaining.get() == 0 {
                            out.complete();
                        }
                    }
                }));
            }
            Guard::from(subscriptions)
        })
    }
}

impl<T: Clone + PartialEq + 'static> Stream<T> {
    /// Skip values equal to the previous one.
    pub fn drop_repeats(&self) -> Stream<T> {
        self.drop_repeats_by(|a, b| a == b)
    }
}
