//! Awaiting stream values from async code.
use std::{future::Future, pin::Pin};

use futures_lite::StreamExt;

use super::{Event, Stream, Subscription};
use crate::error::Error;

/// A [`futures_lite::Stream`] view of a [`Stream`].
///
/// Values are buffered in an unbounded channel from the moment the
/// `AsyncStream` is created. Dropping it unsubscribes.
pub struct AsyncStream<T> {
    rx: Pin<Box<async_channel::Receiver<Result<T, Error>>>>,
    _subscription: Subscription,
}

impl<T> futures_lite::Stream for AsyncStream<T> {
    type Item = Result<T, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        futures_lite::Stream::poll_next(self.get_mut().rx.as_mut(), cx)
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Subscribe and expose the values as an async stream.
    pub fn into_async(self) -> AsyncStream<T> {
        let (tx, rx) = async_channel::unbounded();
        let subscription = self.subscribe(move |ev| match ev {
            Event::Next(t) => {
                let _ = tx.try_send(Ok(t));
            }
            Event::Error(err) => {
                let _ = tx.try_send(Err(err));
                tx.close();
            }
            Event::Complete => {
                tx.close();
            }
        });
        AsyncStream {
            rx: Box::pin(rx),
            _subscription: subscription,
        }
    }

    /// Wait for the next value emitted after this call.
    ///
    /// Resolves to `None` if the stream errors or completes first.
    pub fn next_value(&self) -> impl Future<Output = Option<T>> + 'static {
        let mut values = self.take(1).into_async();
        async move { values.next().await.and_then(Result::ok) }
    }
}

#[cfg(test)]
mod test {
    use futures_lite::{future::block_on, StreamExt};

    use crate::stream::{subject, Stream};

    #[test]
    fn next_value_resolves_after_emission() {
        let (tx, rx) = subject::<u32>();
        let next = rx.next_value();
        tx.next(7);
        tx.next(8);
        assert_eq!(block_on(next), Some(7));
    }

    #[test]
    fn async_stream_ends_on_complete() {
        let values = Stream::from_iter(vec!["a", "b"]).into_async();
        let collected = block_on(values.map(|r| r.unwrap()).collect::<Vec<_>>());
        assert_eq!(collected, vec!["a", "b"]);
    }
}
