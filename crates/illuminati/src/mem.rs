//! An in-memory page.
//!
//! `MemPage` keeps its nodes in memory, renders them as HTML, records every
//! mutation the engine makes and raises synthetic events. It is what the
//! tests and the snapshot binary run against.
use std::rc::Rc;

use serde::Serialize;
use snafu::OptionExt;

use crate::{
    error::{Error, MissingTargetSnafu, Result},
    event::EventSource,
    page::{Document, Page},
    shared::{Shared, WeakShared},
    str::Str,
    stream::{Guard, Stream},
};

mod selector;

pub use selector::Selector;

type Siblings = Vec<MemNode>;
type ParentLink = Shared<Option<WeakShared<Siblings>>>;

#[derive(Clone)]
pub struct MemText {
    pub text: Shared<Str>,
    parent: ParentLink,
}

#[derive(Clone)]
pub struct MemElement {
    pub name: Str,
    pub attributes: Shared<Vec<(Str, Str)>>,
    pub children: Shared<Siblings>,
    parent: ParentLink,
}

impl MemElement {
    fn new(name: &str) -> Self {
        MemElement {
            name: Str::copied(name),
            attributes: Default::default(),
            children: Default::default(),
            parent: Default::default(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<Str> {
        self.attributes
            .get()
            .iter()
            .find_map(|(k, v)| (k == name).then(|| v.clone()))
    }
}

/// A node of a [`MemPage`]. Equality is identity.
#[derive(Clone)]
pub enum MemNode {
    Element(MemElement),
    Text(MemText),
}

impl PartialEq for MemNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MemNode::Element(a), MemNode::Element(b)) => a.children.ptr_eq(&b.children),
            (MemNode::Text(a), MemNode::Text(b)) => a.text.ptr_eq(&b.text),
            _ => false,
        }
    }
}

impl std::fmt::Debug for MemNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemNode::Element(el) => write!(f, "<{}>", el.name),
            MemNode::Text(t) => write!(f, "{:?}", t.text.get().as_str()),
        }
    }
}

fn tag_is_voidable(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "command"
            | "keygen"
            | "source"
    )
}

fn escape(s: &str, quotes: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !quotes => out.push_str("&lt;"),
            '>' if !quotes => out.push_str("&gt;"),
            '"' if quotes => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

impl MemNode {
    fn parent_link(&self) -> &ParentLink {
        match self {
            MemNode::Element(el) => &el.parent,
            MemNode::Text(t) => &t.parent,
        }
    }

    pub fn as_element(&self) -> Option<&MemElement> {
        match self {
            MemNode::Element(el) => Some(el),
            MemNode::Text(_) => None,
        }
    }

    /// The node's text content, including all descendants.
    pub fn text(&self) -> String {
        match self {
            MemNode::Text(t) => t.text.get().to_string(),
            MemNode::Element(el) => el.children.get().iter().map(MemNode::text).collect(),
        }
    }

    pub fn html_string(&self) -> String {
        match self {
            MemNode::Text(t) => escape(t.text.get().as_str(), false),
            MemNode::Element(el) => {
                let atts = el
                    .attributes
                    .get()
                    .iter()
                    .map(|(k, v)| format!(r#" {}="{}""#, k, escape(v, true)))
                    .collect::<String>();
                let kids = el.inner_html();
                if kids.is_empty() && tag_is_voidable(&el.name) {
                    format!("<{}{} />", el.name, atts)
                } else {
                    format!("<{}{}>{}</{}>", el.name, atts, kids, el.name)
                }
            }
        }
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        match self {
            MemNode::Text(_) => false,
            MemNode::Element(el) => {
                let attributes = el.attributes.get();
                selector.matches(&el.name, |name| {
                    attributes
                        .iter()
                        .find_map(|(k, v)| (k == name).then_some(v.as_str()))
                })
            }
        }
    }

    fn descendants(&self, out: &mut Vec<MemNode>) {
        out.push(self.clone());
        if let MemNode::Element(el) = self {
            for child in el.children.get().iter() {
                child.descendants(out);
            }
        }
    }

    /// Every node at or below this one, in document order.
    pub fn walk(&self) -> Vec<MemNode> {
        let mut out = vec![];
        self.descendants(&mut out);
        out
    }

    fn detach(&self) {
        let link = self.parent_link().set(None);
        if let Some(siblings) = link.and_then(|weak| weak.upgrade()) {
            siblings.get_mut().retain(|sibling| sibling != self);
        }
    }
}

impl MemElement {
    pub fn inner_html(&self) -> String {
        self.children
            .get()
            .iter()
            .map(MemNode::html_string)
            .collect()
    }
}

/// One page mutation, as recorded by [`MemPage::journal`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    CreateElement { tag: Str },
    CreateText { text: Str },
    SetText { text: Str },
    Insert { parent: Str, child: Str, before: Option<Str> },
    Remove { parent: Str, child: Str },
    SetAttribute { node: Str, name: Str, value: Str },
    RemoveAttribute { node: Str, name: Str },
}

impl Mutation {
    pub fn is_attribute_write(&self) -> bool {
        matches!(
            self,
            Mutation::SetAttribute { .. } | Mutation::RemoveAttribute { .. }
        )
    }
}

fn label(node: &MemNode) -> Str {
    match node {
        MemNode::Element(el) => el.name.clone(),
        MemNode::Text(_) => "#text".into(),
    }
}

/// A synthetic event raised by [`MemPage::dispatch`].
#[derive(Clone, Debug)]
pub struct MemEvent {
    pub name: Str,
    pub target: MemNode,
}

struct Handler {
    id: u64,
    name: Str,
    selector: Selector,
    sink: Rc<dyn Fn(MemEvent)>,
}

/// An in-memory page with a `<body>` root.
#[derive(Clone)]
pub struct MemPage {
    body: MemNode,
    journal: Shared<Vec<Mutation>>,
    handlers: Shared<Vec<Handler>>,
    next_handler: Shared<u64>,
}

impl Default for MemPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemPage {
    pub fn new() -> Self {
        MemPage {
            body: MemNode::Element(MemElement::new("body")),
            journal: Default::default(),
            handlers: Default::default(),
            next_handler: Default::default(),
        }
    }

    /// A page whose body holds `<div id="{id}"></div>`, the usual target of
    /// [`attach`](crate::engine::attach).
    pub fn with_target(id: &str) -> Result<Self> {
        let page = Self::new();
        let div = page.create_element("div")?;
        page.set_attribute(&div, "id", id)?;
        page.insert(&page.body, &div, None)?;
        page.clear_journal();
        Ok(page)
    }

    pub fn body(&self) -> MemNode {
        self.body.clone()
    }

    /// The whole body as HTML.
    pub fn html_string(&self) -> String {
        self.body.html_string()
    }

    /// The HTML inside the first element matching `selector`.
    pub fn inner_html(&self, selector: &str) -> Result<String> {
        let node = self.require(selector)?;
        Ok(node
            .as_element()
            .map(MemElement::inner_html)
            .unwrap_or_default())
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<MemNode>> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .body
            .walk()
            .into_iter()
            .filter(|node| node.matches(&selector))
            .collect())
    }

    fn require(&self, selector: &str) -> Result<MemNode> {
        let found = Document::query_selector(self, selector)?;
        found.context(MissingTargetSnafu {
            selector: Str::copied(selector),
        })
    }

    pub fn journal(&self) -> Vec<Mutation> {
        self.journal.get().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.get_mut().clear();
    }

    fn record(&self, mutation: Mutation) {
        log::trace!("{mutation:?}");
        self.journal.get_mut().push(mutation);
    }

    /// Raise `event_name` on `target`, delivering it to every listener whose
    /// selector matches the target.
    pub fn dispatch(&self, target: &MemNode, event_name: &str) {
        let sinks = self
            .handlers
            .get()
            .iter()
            .filter(|handler| handler.name == event_name && target.matches(&handler.selector))
            .map(|handler| handler.sink.clone())
            .collect::<Vec<_>>();
        log::trace!("dispatching '{event_name}' on {target:?} to {} listeners", sinks.len());
        for sink in sinks {
            sink(MemEvent {
                name: Str::copied(event_name),
                target: target.clone(),
            });
        }
    }

    /// Click the first element matching `selector`.
    pub fn click(&self, selector: &str) -> Result<()> {
        let target = self.require(selector)?;
        self.dispatch(&target, "click");
        Ok(())
    }

    /// The number of installed event listeners.
    pub fn listener_count(&self) -> usize {
        self.handlers.get().len()
    }
}

fn element<'a>(node: &'a MemNode, operation: &'static str) -> Result<&'a MemElement> {
    node.as_element()
        .ok_or_else(|| Error::page(operation, "not an element"))
}

impl Page for MemPage {
    type Node = MemNode;

    fn create_element(&self, tag: &str) -> Result<MemNode> {
        self.record(Mutation::CreateElement {
            tag: Str::copied(tag),
        });
        Ok(MemNode::Element(MemElement::new(tag)))
    }

    fn create_text(&self, text: &str) -> Result<MemNode> {
        self.record(Mutation::CreateText {
            text: Str::copied(text),
        });
        Ok(MemNode::Text(MemText {
            text: Shared::new(Str::copied(text)),
            parent: Default::default(),
        }))
    }

    fn set_text(&self, node: &MemNode, text: &str) -> Result<()> {
        match node {
            MemNode::Text(t) => {
                self.record(Mutation::SetText {
                    text: Str::copied(text),
                });
                t.text.set(Str::copied(text));
                Ok(())
            }
            MemNode::Element(_) => Err(Error::page("set_text", "not a text node")),
        }
    }

    fn insert(&self, parent: &MemNode, child: &MemNode, before: Option<&MemNode>) -> Result<()> {
        let el = element(parent, "insert")?;
        if before == Some(child) {
            return Ok(());
        }
        if let Some(before) = before {
            if !el.children.get().contains(before) {
                return Err(Error::page("insert", "reference node is not a child"));
            }
        }
        self.record(Mutation::Insert {
            parent: label(parent),
            child: label(child),
            before: before.map(label),
        });
        child.detach();
        {
            let mut children = el.children.get_mut();
            let index = before
                .and_then(|before| children.iter().position(|c| c == before))
                .unwrap_or(children.len());
            children.insert(index, child.clone());
        }
        child.parent_link().set(Some(el.children.downgrade()));
        Ok(())
    }

    fn remove(&self, parent: &MemNode, child: &MemNode) -> Result<()> {
        let el = element(parent, "remove")?;
        let index = el.children.get().iter().position(|c| c == child);
        let index = index.ok_or_else(|| Error::page("remove", "not a child"))?;
        self.record(Mutation::Remove {
            parent: label(parent),
            child: label(child),
        });
        el.children.get_mut().remove(index);
        child.parent_link().set(None);
        Ok(())
    }

    fn set_attribute(&self, node: &MemNode, name: &str, value: &str) -> Result<()> {
        let el = element(node, "set_attribute")?;
        self.record(Mutation::SetAttribute {
            node: label(node),
            name: Str::copied(name),
            value: Str::copied(value),
        });
        let mut attributes = el.attributes.get_mut();
        if let Some((_, v)) = attributes.iter_mut().find(|(k, _)| k == name) {
            *v = Str::copied(value);
        } else {
            attributes.push((Str::copied(name), Str::copied(value)));
        }
        Ok(())
    }

    fn remove_attribute(&self, node: &MemNode, name: &str) -> Result<()> {
        let el = element(node, "remove_attribute")?;
        self.record(Mutation::RemoveAttribute {
            node: label(node),
            name: Str::copied(name),
        });
        el.attributes.get_mut().retain(|(k, _)| k != name);
        Ok(())
    }
}

impl Document for MemPage {
    fn query_selector(&self, selector: &str) -> Result<Option<MemNode>> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .body
            .walk()
            .into_iter()
            .find(|node| node.matches(&selector)))
    }

    fn clear(&self, node: &MemNode) -> Result<()> {
        let children = element(node, "clear")?.children.get().clone();
        for child in children.iter() {
            self.remove(node, child)?;
        }
        Ok(())
    }
}

impl EventSource for MemPage {
    type Event = MemEvent;

    fn select_events(&self, selector: &str, event_name: &str) -> Stream<MemEvent> {
        let selector = match Selector::parse(selector) {
            Ok(selector) => selector,
            Err(err) => return Stream::fail(err),
        };
        let name = Str::copied(event_name);
        let handlers = self.handlers.clone();
        let next_handler = self.next_handler.clone();
        Stream::create(move |out| {
            let id = {
                let mut next = next_handler.get_mut();
                *next += 1;
                *next
            };
            handlers.get_mut().push(Handler {
                id,
                name: name.clone(),
                selector: selector.clone(),
                sink: Rc::new(move |ev| out.next(ev)),
            });
            log::trace!("installed '{name}' listener {id}");
            let handlers = handlers.clone();
            Guard::on_stop(move || handlers.get_mut().retain(|handler| handler.id != id))
        })
    }
}
