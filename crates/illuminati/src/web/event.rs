//! Delegated DOM event listeners feeding streams.
use wasm_bindgen::{prelude::Closure, JsCast, JsValue};

use crate::{
    error::{Error, Result},
    str::Str,
    stream::Emitter,
};

/// A listener registered on one target that forwards events whose target
/// element matches a selector. Dropping it removes the listener.
pub struct EventListener {
    /// The DOM that the event listener is registered upon.
    target: web_sys::EventTarget,
    /// The name of the event being listened for.
    event_name: Str,
    /// The callback registered that will be invoked when the event occurs.
    callback: Closure<dyn FnMut(JsValue)>,
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if let Err(err) = self.target.remove_event_listener_with_callback(
            self.event_name.as_str(),
            self.callback.as_ref().unchecked_ref(),
        ) {
            log::error!("could not remove '{}' listener: {err:?}", self.event_name);
        }
        log::trace!("dropping listener for {} on target {:?}", self.event_name, self.target);
    }
}

impl EventListener {
    pub fn delegate(
        target: impl AsRef<web_sys::EventTarget>,
        event_name: Str,
        selector: Str,
        out: Emitter<web_sys::Event>,
    ) -> Result<Self> {
        let callback = Closure::wrap(Box::new(move |val: JsValue| {
            // UNCHECKED: event callbacks are always called with an `Event`.
            let ev: web_sys::Event = val.unchecked_into();
            let matched = ev
                .target()
                .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
                .map(|el| el.matches(selector.as_str()).unwrap_or(false))
                .unwrap_or(false);
            if matched {
                out.next(ev);
            }
        }) as Box<dyn FnMut(JsValue)>);

        let target = target.as_ref().clone();
        target
            .add_event_listener_with_callback(event_name.as_str(), callback.as_ref().unchecked_ref())
            .map_err(|err| Error::page("add_event_listener", format!("{err:?}")))?;
        log::trace!("installed '{event_name}' listener");

        Ok(Self {
            target,
            event_name,
            callback,
        })
    }
}
