//! The demo apps.
//!
//! Each app is a function from an event source to a tree, so the same app
//! runs against the in-memory page and the browser.
use illuminati::prelude::*;

/// Reads the `id` of the element an event was raised on.
pub trait TargetId {
    fn target_id(&self) -> Option<String>;
}

impl TargetId for MemEvent {
    fn target_id(&self) -> Option<String> {
        self.target
            .as_element()
            .and_then(|el| el.attribute("id"))
            .map(|id| id.to_string())
    }
}

#[cfg(feature = "web")]
impl TargetId for web_sys::Event {
    fn target_id(&self) -> Option<String> {
        use wasm_bindgen::JsCast;

        self.target()
            .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
            .map(|el| el.id())
    }
}

pub fn hello_world() -> ElementNode {
    h("h1", [], "Hello, World!")
}

pub fn counter<E: EventSource>(events: &E) -> ElementNode {
    let count = Stream::merge_all([
        events.clicks(".inc").map_to(1),
        events.clicks(".dec").map_to(-1),
    ])
    .fold(0, |count, x| count + x);

    h(
        "div",
        [],
        (
            h("div", [], count),
            h("button", [class("dec")], "-"),
            h("button", [class("inc")], "+"),
        ),
    )
}

pub fn toggle_visibility<E: EventSource>(events: &E) -> ElementNode {
    let shown = events.clicks(".toggle").fold(false, |shown, _| !shown);

    h(
        "div",
        [],
        (
            h("button", [class("toggle")], "toggle"),
            h("div", [visible(shown)], "content"),
        ),
    )
}

pub fn dynamic_attribute<E: EventSource>(events: &E) -> ElementNode {
    let container_class = events
        .clicks(".pressme")
        .fold(false, |highlighted, _| !highlighted)
        .map(|highlighted| cx(["container", if highlighted { "highlighted" } else { "" }]));

    h(
        "div",
        [class(container_class)],
        h("button", [class("pressme")], "Press Me"),
    )
}

pub fn two_elements<E: EventSource>(events: &E) -> ElementNode {
    let one = events.clicks(".one").fold(true, |shown, _| !shown);
    let two = events.clicks(".two").fold(true, |shown, _| !shown);

    h(
        "div",
        [],
        (
            h(
                "p",
                [],
                (
                    "Toggle one twice, it comes back in its place.",
                    h("br", [], ()),
                    h("a", [attr(Attribute::Href, "#two-elements")], "Related issue"),
                ),
            ),
            h("button", [class("one")], "toggle one"),
            h("button", [class("two")], "toggle two"),
            h(
                "div",
                [class("content")],
                (
                    h("div", [visible(one)], "1. one"),
                    h("div", [visible(two)], "2. two"),
                ),
            ),
        ),
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub text: String,
}

fn numbered(texts: &[u32]) -> Vec<Item> {
    texts
        .iter()
        .map(|n| Item {
            text: n.to_string(),
        })
        .collect()
}

pub fn dynamic_collection<E: EventSource>(events: &E) -> ElementNode {
    let items = Stream::merge_all([
        events.clicks(".b-123").map_to(numbered(&[1, 2, 3])),
        events.clicks(".b-32").map_to(numbered(&[3, 2])),
        events.clicks(".b-54321").map_to(numbered(&[5, 4, 3, 2, 1])),
    ])
    .start_with(numbered(&[1, 2, 3]));

    let summary = items.map(|items| {
        items
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    });

    h(
        "div",
        [],
        (
            h("button", [class("b-123")], "1, 2, 3"),
            h("button", [class("b-32")], "3, 2"),
            h("button", [class("b-54321")], "5, 4, 3, 2, 1"),
            summary,
            h(
                "ul",
                [],
                collection(
                    items,
                    |item: &Item| item.text.clone(),
                    |item: Stream<Item>| h("li", [], item.map(|item| item.text)),
                ),
            ),
        ),
    )
}

/// A list of `len` items where clicking one selects it.
pub fn change_one_of<E>(events: &E, len: usize) -> ElementNode
where
    E: EventSource,
    E::Event: TargetId,
{
    let selected = events
        .clicks(".item")
        .map(|ev| ev.target_id().unwrap_or_default());

    let list = (0..len)
        .map(|index| {
            let index = index.to_string();
            let item_class = selected
                .map({
                    let index = index.clone();
                    move |id| cx(["item", if id == index { "selected" } else { "" }])
                })
                .start_with("item".to_string());
            h("li", [class(item_class), id(index)], "select me")
        })
        .collect::<Vec<_>>();

    h("ul", [], list)
}

/// The apps by name, with the clicks the snapshot binary plays on each.
pub const DEMOS: &[(&str, &[&str])] = &[
    ("hello_world", &[]),
    ("counter", &[".inc", ".inc", ".dec"]),
    ("toggle_visibility", &[".toggle", ".toggle"]),
    ("dynamic_attribute", &[".pressme", ".pressme"]),
    ("two_elements", &["button.one", "button.one", "button.two"]),
    ("dynamic_collection", &[".b-32", ".b-54321", ".b-123"]),
    ("change_one_of_50000", &["#7", "#49999"]),
];

/// Build the app called `name`.
pub fn app<E>(name: &str, events: &E) -> Option<ElementNode>
where
    E: EventSource,
    E::Event: TargetId,
{
    Some(match name {
        "hello_world" => hello_world(),
        "counter" => counter(events),
        "toggle_visibility" => toggle_visibility(events),
        "dynamic_attribute" => dynamic_attribute(events),
        "two_elements" => two_elements(events),
        "dynamic_collection" => dynamic_collection(events),
        "change_one_of_50000" => change_one_of(events, 50_000),
        _ => return None,
    })
}
