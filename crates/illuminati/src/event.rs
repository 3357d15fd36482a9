//! Page wide event delegation as streams.
use crate::stream::Stream;

/// A page that can deliver its events as streams.
pub trait EventSource {
    type Event: Clone + 'static;

    /// Every `event_name` event whose target matches `selector`.
    ///
    /// Each call returns a fresh stream. Subscribing installs a page level
    /// listener and unsubscribing removes it. An invalid selector yields a
    /// stream that errors.
    fn select_events(&self, selector: &str, event_name: &str) -> Stream<Self::Event>;

    /// Clicks on elements matching `selector`.
    fn clicks(&self, selector: &str) -> Stream<Self::Event> {
        self.select_events(selector, "click")
    }
}
