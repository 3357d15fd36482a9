//! The browser page, through web-sys.
use std::{cell::RefCell, future::Future, rc::Rc, task::Waker};

use wasm_bindgen::{prelude::Closure, JsCast, JsValue, UnwrapThrowExt};

use crate::{
    engine::Engine,
    error::{Error, Result},
    event::EventSource,
    page::{Document, Page},
    str::Str,
    stream::{Guard, Stream},
};

pub mod event;

use event::EventListener;

thread_local! {
    pub static WINDOW: web_sys::Window = web_sys::window().unwrap_throw();
    pub static DOCUMENT: web_sys::Document = WINDOW.with(|w| w.document().unwrap_throw());
}

/// Return the DOM [`web_sys::Window`].
/// #### Panics
/// Panics when the window cannot be returned.
pub fn window() -> web_sys::Window {
    WINDOW.with(|w| w.clone())
}

/// Return the document JsDom object [`web_sys::Document`]
/// #### Panics
/// Panics on non-wasm32 or when the document cannot be returned.
pub fn document() -> web_sys::Document {
    DOCUMENT.with(|d| d.clone())
}

fn js_error(operation: &'static str) -> impl Fn(JsValue) -> Error {
    move |err| Error::page(operation, format!("{err:?}"))
}

fn element<'a>(node: &'a web_sys::Node, operation: &'static str) -> Result<&'a web_sys::Element> {
    node.dyn_ref::<web_sys::Element>()
        .ok_or_else(|| Error::page(operation, "not an element"))
}

/// The browser's document.
#[derive(Clone, Default)]
pub struct WebPage;

impl WebPage {
    pub fn new() -> Self {
        WebPage
    }
}

impl Page for WebPage {
    type Node = web_sys::Node;

    fn create_element(&self, tag: &str) -> Result<web_sys::Node> {
        let el = document()
            .create_element(tag)
            .map_err(js_error("create_element"))?;
        Ok(el.into())
    }

    fn create_text(&self, text: &str) -> Result<web_sys::Node> {
        Ok(document().create_text_node(text).into())
    }

    fn set_text(&self, node: &web_sys::Node, text: &str) -> Result<()> {
        node.set_text_content(Some(text));
        Ok(())
    }

    fn insert(
        &self,
        parent: &web_sys::Node,
        child: &web_sys::Node,
        before: Option<&web_sys::Node>,
    ) -> Result<()> {
        if before == Some(child) {
            return Ok(());
        }
        parent
            .insert_before(child, before)
            .map_err(js_error("insert"))?;
        Ok(())
    }

    fn remove(&self, parent: &web_sys::Node, child: &web_sys::Node) -> Result<()> {
        parent.remove_child(child).map_err(js_error("remove"))?;
        Ok(())
    }

    fn set_attribute(&self, node: &web_sys::Node, name: &str, value: &str) -> Result<()> {
        element(node, "set_attribute")?
            .set_attribute(name, value)
            .map_err(js_error("set_attribute"))
    }

    fn remove_attribute(&self, node: &web_sys::Node, name: &str) -> Result<()> {
        element(node, "remove_attribute")?
            .remove_attribute(name)
            .map_err(js_error("remove_attribute"))
    }
}

impl Document for WebPage {
    fn query_selector(&self, selector: &str) -> Result<Option<web_sys::Node>> {
        let found = document()
            .query_selector(selector)
            .map_err(|_| Error::Selector {
                selector: Str::copied(selector),
            })?;
        Ok(found.map(Into::into))
    }

    fn clear(&self, node: &web_sys::Node) -> Result<()> {
        node.set_text_content(None);
        Ok(())
    }
}

impl EventSource for WebPage {
    type Event = web_sys::Event;

    fn select_events(&self, selector: &str, event_name: &str) -> Stream<web_sys::Event> {
        if document().query_selector(selector).is_err() {
            return Stream::fail(Error::Selector {
                selector: Str::copied(selector),
            });
        }
        let selector = Str::copied(selector);
        let event_name = Str::copied(event_name);
        Stream::create(move |out| {
            match EventListener::delegate(&document(), event_name.clone(), selector.clone(), out) {
                Ok(listener) => Guard::on_stop(move || drop(listener)),
                Err(err) => {
                    log::error!("{err}");
                    Guard::none()
                }
            }
        })
    }
}

fn req_animation_frame(f: &Closure<dyn FnMut(JsValue)>) -> Result<()> {
    WINDOW.with(|w| {
        w.request_animation_frame(f.as_ref().unchecked_ref())
            .map(|_| ())
            .map_err(js_error("request_animation_frame"))
    })
}

#[derive(Clone, Default)]
#[allow(clippy::type_complexity)]
pub struct NextFrame {
    closure: Rc<RefCell<Option<Closure<dyn FnMut(JsValue)>>>>,
    ts: Rc<RefCell<Option<f64>>>,
    waker: Rc<RefCell<Option<Waker>>>,
}

/// Resolves with the timestamp of the next animation frame.
pub fn request_animation_frame() -> Result<NextFrame> {
    let frame = NextFrame::default();

    *frame.closure.borrow_mut() = Some(Closure::wrap(Box::new({
        let frame = frame.clone();
        move |ts_val: JsValue| {
            *frame.ts.borrow_mut() = Some(ts_val.as_f64().unwrap_or(0.0));
            if let Some(waker) = frame.waker.borrow_mut().take() {
                waker.wake();
            }
        }
    }) as Box<dyn FnMut(JsValue)>));

    if let Some(closure) = frame.closure.borrow().as_ref() {
        req_animation_frame(closure)?;
    }
    Ok(frame)
}

impl Future for NextFrame {
    type Output = f64;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        if let Some(ts) = self.ts.borrow_mut().take() {
            std::task::Poll::Ready(ts)
        } else {
            *self.waker.borrow_mut() = Some(cx.waker().clone());
            std::task::Poll::Pending
        }
    }
}

/// Flush `engine` once per animation frame, for engines configured with
/// [`Schedule::NextFrame`](crate::config::Schedule::NextFrame).
pub fn run_frames<P: Page>(engine: &Engine<P>) {
    let engine = engine.clone();
    wasm_bindgen_futures::spawn_local(async move {
        loop {
            match request_animation_frame() {
                Ok(frame) => {
                    frame.await;
                }
                Err(err) => {
                    engine.config().error_handler.handle(&err);
                    return;
                }
            }
            engine.flush();
        }
    });
}

/// Reconcile `tree` into the element matching `selector` and keep it running.
pub fn mount(
    engine: &Engine<WebPage>,
    selector: &str,
    tree: impl Into<crate::tree::TreeNode>,
) -> Result<()> {
    let mount = crate::engine::attach(engine, selector, tree)?;
    log::info!("mounted {} at {selector}", mount.root());
    if engine.config().schedule == crate::config::Schedule::NextFrame {
        run_frames(engine);
    }
    Ok(())
}
