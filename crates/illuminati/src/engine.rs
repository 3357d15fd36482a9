//! Keeping a page in sync with a tree.
//!
//! The [`Engine`] turns a [`TreeNode`] into page nodes and keeps them up to
//! date as the tree's streams emit. Every node of the tree gets a record in
//! the engine's arena, addressed by [`NodeId`], holding its page node(s), its
//! subscriptions and a FIFO queue of pending operations.
//!
//! Stream listeners never touch the page. They push an operation onto their
//! node's queue and the engine drains queues in order, either right away
//! ([`Schedule::Immediate`]) or on [`Engine::flush`]
//! ([`Schedule::NextFrame`]). An emission that happens while the engine is
//! draining is queued behind the work already pending for its node, so a
//! node's operations are always applied in the order they were emitted.
//!
//! ```rust
//! use illuminati::{prelude::*, stream::subject};
//!
//! let page = MemPage::with_target("app").unwrap();
//! let engine = Engine::new(page.clone(), Config::default());
//!
//! let (tx, text) = subject::<String>();
//! let tree = h("p", [], text.start_with("hello".into()));
//! let _mount = attach(&engine, "#app", tree).unwrap();
//! assert_eq!(page.inner_html("#app").unwrap(), "<p>hello</p>");
//!
//! tx.next("goodbye".into());
//! assert_eq!(page.inner_html("#app").unwrap(), "<p>goodbye</p>");
//! ```
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::{Rc, Weak},
};

use rustc_hash::FxHashMap;
use snafu::OptionExt;

use crate::{
    attribute::Attribute,
    config::{Config, Schedule},
    error::{Error, MissingKeyedItemSnafu, MissingTargetSnafu, Result},
    page::{Document, Page},
    str::Str,
    stream::{Event, Subscription},
    tree::{AnyItem, Child, CollectionNode, ElementNode, ItemFeed, Key, TextNode, TreeNode},
    watch::{Change, Watch},
};

mod diff;

/// Identifies one mounted node within an [`Engine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a mounted node is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Nothing on the page, e.g. an element whose visibility is `false`.
    Absent,
    /// Being built, not yet on the page.
    Mounting,
    Present,
    /// Applying an operation.
    Updating,
    /// Torn down. Nothing will touch the page on its behalf again.
    Removed,
}

/// A unit of work for one node.
enum Op {
    Visible(bool),
    Text(Str),
    /// Index into the element's attributes, and the new value.
    Attribute(usize, Str),
    Items(Vec<(Key, AnyItem)>),
    Fail(Error),
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Visible(v) => write!(f, "visible({v})"),
            Op::Text(t) => write!(f, "text({t:?})"),
            Op::Attribute(i, v) => write!(f, "attribute({i}, {v:?})"),
            Op::Items(items) => {
                let keys = items.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>();
                write!(f, "items([{}])", keys.join(", "))
            }
            Op::Fail(err) => write!(f, "fail({err})"),
        }
    }
}

#[derive(Clone)]
struct Item {
    id: NodeId,
    feed: Rc<dyn ItemFeed>,
}

enum Kind<P: Page> {
    Text {
        node: Option<P::Node>,
        text: Watch<Str>,
    },
    Element {
        tree: ElementNode,
        node: Option<P::Node>,
        visible: Watch<bool>,
        attributes: Vec<(Attribute, Watch<Str>)>,
    },
    Collection {
        tree: CollectionNode,
        keys: Vec<Key>,
        items: FxHashMap<Key, Item>,
    },
}

struct MountedNode<P: Page> {
    parent: Option<NodeId>,
    /// The page node this node's page nodes are inserted into.
    container: P::Node,
    state: NodeState,
    kind: Kind<P>,
    /// Element children or collection items, in page order.
    children: Vec<NodeId>,
    ops: VecDeque<Op>,
    queued: bool,
    /// Set once an operation failed. A dead node ignores its streams but keeps
    /// its page nodes until torn down.
    dead: bool,
    /// The subscription deciding whether and what this node shows.
    driver: Option<Subscription>,
    /// Attribute subscriptions of a present element.
    content: Vec<Subscription>,
}

struct EngineInner<P: Page> {
    page: P,
    config: Config,
    nodes: RefCell<FxHashMap<NodeId, MountedNode<P>>>,
    run_queue: RefCell<VecDeque<NodeId>>,
    draining: Cell<bool>,
    next_id: Cell<u64>,
}

/// Reconciles trees onto a page.
///
/// `Engine` is a cheap handle, clones share the same arena.
pub struct Engine<P: Page> {
    inner: Rc<EngineInner<P>>,
}

impl<P: Page> Clone for Engine<P> {
    fn clone(&self) -> Self {
        Engine {
            inner: self.inner.clone(),
        }
    }
}

/// A reconciled tree. See [`Engine::reconcile`].
///
/// Dropping a `Mount` leaves the tree live, call [`Mount::unmount`] to tear
/// it down.
pub struct Mount<P: Page> {
    engine: Engine<P>,
    root: NodeId,
}

impl<P: Page> Mount<P> {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn state(&self) -> NodeState {
        self.engine.state(self.root)
    }

    /// Remove the tree's page nodes and drop every subscription it holds.
    pub fn unmount(self) {
        log::debug!("unmounting {}", self.root);
        self.engine.batch(|| self.engine.teardown(self.root, true));
    }
}

/// Find the element matching `selector`, clear it and reconcile `tree` into
/// it.
pub fn attach<P: Document>(
    engine: &Engine<P>,
    selector: &str,
    tree: impl Into<TreeNode>,
) -> Result<Mount<P>> {
    let page = engine.page();
    let target = page
        .query_selector(selector)?
        .context(MissingTargetSnafu {
            selector: Str::copied(selector),
        })?;
    page.clear(&target)?;
    engine.reconcile(&target, tree)
}

impl<P: Page> Engine<P> {
    pub fn new(page: P, config: Config) -> Self {
        Engine {
            inner: Rc::new(EngineInner {
                page,
                config,
                nodes: Default::default(),
                run_queue: Default::default(),
                draining: Cell::new(false),
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn page(&self) -> &P {
        &self.inner.page
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Build `tree` and append it to `target`.
    ///
    /// The initial render happens before this returns. Stream errors met
    /// while rendering go to the error handler and stop only the node they
    /// drive. If a page operation fails nothing is left on the page and the
    /// error is returned.
    pub fn reconcile(&self, target: &P::Node, tree: impl Into<TreeNode>) -> Result<Mount<P>> {
        let tree = tree.into();
        let root = self.batch(|| {
            let root = self.spawn(None, target.clone(), Child::Node(tree));
            match self.run_child(root) {
                Ok(()) => Ok(root),
                Err(err) => {
                    self.teardown(root, true);
                    Err(err)
                }
            }
        })?;
        log::debug!("mounted {root}");
        Ok(Mount {
            engine: self.clone(),
            root,
        })
    }

    /// Apply every queued operation.
    pub fn flush(&self) {
        self.drain();
    }

    /// The number of nodes with operations waiting to be applied.
    pub fn pending(&self) -> usize {
        self.inner
            .nodes
            .borrow()
            .values()
            .filter(|node| !node.ops.is_empty())
            .count()
    }

    /// The number of live records in the arena.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    pub fn state(&self, id: NodeId) -> NodeState {
        self.inner
            .nodes
            .borrow()
            .get(&id)
            .map(|node| node.state)
            .unwrap_or(NodeState::Removed)
    }

    fn report(&self, err: &Error) {
        self.inner.config.error_handler.handle(err);
    }

    fn next_id(&self) -> NodeId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        NodeId(id)
    }

    /// Run `f` with draining held off, then drain if this was the outermost
    /// batch.
    fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let outer = !self.inner.draining.replace(true);
        let result = f();
        if outer {
            self.inner.draining.set(false);
            if self.inner.config.schedule == Schedule::Immediate {
                self.drain();
            }
        }
        result
    }

    fn drain(&self) {
        if self.inner.draining.replace(true) {
            return;
        }
        loop {
            let next = self.inner.run_queue.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };
            if let Err(err) = self.run_node(id) {
                self.report(&err);
                self.kill(id);
            }
        }
        self.inner.draining.set(false);
    }

    fn enqueue(&self, id: NodeId, op: Op) {
        let mut nodes = self.inner.nodes.borrow_mut();
        match nodes.get_mut(&id) {
            None => log::warn!("ignoring {op:?} for removed node {id}"),
            Some(node) if node.dead => log::trace!("ignoring {op:?} for dead node {id}"),
            Some(node) => {
                log::trace!("queue {id} {op:?}");
                node.ops.push_back(op);
                if !node.queued {
                    node.queued = true;
                    self.inner.run_queue.borrow_mut().push_back(id);
                }
            }
        }
    }

    fn push(&self, id: NodeId, op: Op) {
        self.enqueue(id, op);
        if self.inner.config.schedule == Schedule::Immediate {
            self.drain();
        }
    }

    /// A stream listener that turns values into operations on `id`.
    fn listener<T: 'static>(
        &self,
        id: NodeId,
        to_op: impl Fn(T) -> Op + 'static,
    ) -> impl Fn(Event<T>) + 'static {
        let engine: Weak<EngineInner<P>> = Rc::downgrade(&self.inner);
        move |ev| {
            let Some(inner) = engine.upgrade() else {
                return;
            };
            let op = match ev {
                Event::Next(t) => to_op(t),
                Event::Error(err) => Op::Fail(err),
                Event::Complete => return,
            };
            Engine { inner }.push(id, op);
        }
    }

    /// Create the record for `child` and subscribe to what drives it.
    fn spawn(&self, parent: Option<NodeId>, container: P::Node, child: Child) -> NodeId {
        let id = self.next_id();
        let kind = match &child {
            Child::Text(_) | Child::Node(TreeNode::Text(_)) => Kind::Text {
                node: None,
                text: Watch::new(),
            },
            Child::Node(TreeNode::Element(tree)) => Kind::Element {
                tree: tree.clone(),
                node: None,
                visible: Watch::new(),
                attributes: vec![],
            },
            Child::Node(TreeNode::Collection(tree)) => Kind::Collection {
                tree: tree.clone(),
                keys: vec![],
                items: Default::default(),
            },
        };
        self.inner.nodes.borrow_mut().insert(
            id,
            MountedNode {
                parent,
                container,
                state: NodeState::Absent,
                kind,
                children: vec![],
                ops: Default::default(),
                queued: false,
                dead: false,
                driver: None,
                content: vec![],
            },
        );

        let driver = match child {
            Child::Text(stream) => {
                Some(stream.subscribe(self.listener(id, |t: TextNode| Op::Text(t.text))))
            }
            Child::Node(TreeNode::Text(t)) => {
                self.enqueue(id, Op::Text(t.text));
                None
            }
            Child::Node(TreeNode::Element(tree)) => match tree.visible {
                Some(visible) => Some(visible.subscribe(self.listener(id, Op::Visible))),
                None => {
                    self.enqueue(id, Op::Visible(true));
                    None
                }
            },
            Child::Node(TreeNode::Collection(tree)) => {
                Some(tree.items.subscribe(self.listener(id, Op::Items)))
            }
        };
        if let Some(node) = self.inner.nodes.borrow_mut().get_mut(&id) {
            node.driver = driver;
        }
        id
    }

    /// Apply every queued operation of `id`.
    fn run_node(&self, id: NodeId) -> Result<()> {
        loop {
            let op = {
                let mut nodes = self.inner.nodes.borrow_mut();
                match nodes.get_mut(&id) {
                    Some(node) if !node.dead => {
                        let op = node.ops.pop_front();
                        if op.is_none() {
                            node.queued = false;
                        } else if node.state == NodeState::Present {
                            node.state = NodeState::Updating;
                        }
                        op
                    }
                    _ => None,
                }
            };
            let Some(op) = op else {
                return Ok(());
            };
            log::trace!("apply {id} {op:?}");
            let result = self.apply(id, op);
            self.set_state_if(id, NodeState::Updating, NodeState::Present);
            result?;
        }
    }

    /// Apply the first operations of a freshly spawned node.
    ///
    /// Any failure other than a page error is reported and kills `id`, leaving
    /// its siblings to build. Page errors are returned.
    fn run_child(&self, id: NodeId) -> Result<()> {
        match self.run_node(id) {
            Err(err) if !err.is_page_error() => {
                self.report(&err);
                self.kill(id);
                Ok(())
            }
            result => result,
        }
    }

    fn set_state(&self, id: NodeId, state: NodeState) {
        if let Some(node) = self.inner.nodes.borrow_mut().get_mut(&id) {
            node.state = state;
        }
    }

    fn set_state_if(&self, id: NodeId, from: NodeState, to: NodeState) {
        if let Some(node) = self.inner.nodes.borrow_mut().get_mut(&id) {
            if node.state == from {
                node.state = to;
            }
        }
    }

    fn apply(&self, id: NodeId, op: Op) -> Result<()> {
        match op {
            Op::Fail(err) => Err(err),
            Op::Text(text) => self.apply_text(id, text),
            Op::Visible(visible) => self.apply_visible(id, visible),
            Op::Attribute(index, value) => self.apply_attribute(id, index, value),
            Op::Items(items) => self.apply_items(id, items),
        }
    }

    fn apply_text(&self, id: NodeId, text: Str) -> Result<()> {
        let (change, container, existing) = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let Some(record) = nodes.get_mut(&id) else {
                return Ok(());
            };
            let Kind::Text { node, text: watch } = &mut record.kind else {
                log::warn!("text for non-text node {id}");
                return Ok(());
            };
            (watch.observe(text), record.container.clone(), node.clone())
        };
        match change {
            None => Ok(()),
            Some(Change::Mount(text)) => {
                let created = self.inner.page.create_text(&text).and_then(|node| {
                    let anchor = self.anchor(id);
                    self.inner.page.insert(&container, &node, anchor.as_ref())?;
                    Ok(node)
                });
                let mut nodes = self.inner.nodes.borrow_mut();
                let Some(record) = nodes.get_mut(&id) else {
                    return Ok(());
                };
                let Kind::Text { node, text: watch } = &mut record.kind else {
                    return Ok(());
                };
                match created {
                    Ok(created) => {
                        *node = Some(created);
                        record.state = NodeState::Present;
                        Ok(())
                    }
                    Err(err) => {
                        watch.reset();
                        Err(err)
                    }
                }
            }
            Some(Change::Update(text)) => match existing {
                Some(node) => self.inner.page.set_text(&node, &text),
                None => Ok(()),
            },
        }
    }

    fn apply_visible(&self, id: NodeId, visible: bool) -> Result<()> {
        let change = {
            let mut nodes = self.inner.nodes.borrow_mut();
            match nodes.get_mut(&id).map(|record| &mut record.kind) {
                Some(Kind::Element { visible: watch, .. }) => watch.observe(visible),
                _ => return Ok(()),
            }
        };
        match change {
            None => Ok(()),
            Some(Change::Mount(false)) => {
                log::debug!("{id} starts absent");
                Ok(())
            }
            Some(Change::Mount(true)) | Some(Change::Update(true)) => self.build(id),
            Some(Change::Update(false)) => {
                log::debug!("hiding {id}");
                self.unbuild(id, true);
                Ok(())
            }
        }
    }

    /// Create the element of `id` with its attributes and children, then
    /// insert it.
    fn build(&self, id: NodeId) -> Result<()> {
        let (tree, container) = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let Some(record) = nodes.get_mut(&id) else {
                return Ok(());
            };
            let Kind::Element { tree, .. } = &record.kind else {
                return Ok(());
            };
            let tree = tree.clone();
            record.state = NodeState::Mounting;
            (tree, record.container.clone())
        };
        log::debug!("mounting <{}> {id}", tree.tag);
        let result = self.build_detached(id, &tree).and_then(|element| {
            let anchor = self.anchor(id);
            self.inner
                .page
                .insert(&container, &element, anchor.as_ref())
        });
        match result {
            Ok(()) => {
                self.set_state(id, NodeState::Present);
                Ok(())
            }
            Err(err) => {
                self.unbuild(id, false);
                if let Some(Kind::Element { visible, .. }) = self
                    .inner
                    .nodes
                    .borrow_mut()
                    .get_mut(&id)
                    .map(|record| &mut record.kind)
                {
                    visible.reset();
                }
                Err(err)
            }
        }
    }

    fn build_detached(&self, id: NodeId, tree: &ElementNode) -> Result<P::Node> {
        let element = self.inner.page.create_element(&tree.tag)?;
        if let Some(record) = self.inner.nodes.borrow_mut().get_mut(&id) {
            if let Kind::Element {
                node, attributes, ..
            } = &mut record.kind
            {
                *node = Some(element.clone());
                *attributes = tree
                    .attributes
                    .iter()
                    .map(|(attribute, _)| (*attribute, Watch::new()))
                    .collect();
            }
        }

        let content = tree
            .attributes
            .iter()
            .enumerate()
            .map(|(index, (_, value))| {
                value
                    .effective()
                    .subscribe(self.listener(id, move |v| Op::Attribute(index, v)))
            })
            .collect::<Vec<_>>();
        // attribute values available right away belong to the build
        let initial = {
            let mut nodes = self.inner.nodes.borrow_mut();
            match nodes.get_mut(&id) {
                Some(record) => {
                    record.content = content;
                    let (initial, rest): (VecDeque<Op>, VecDeque<Op>) = record
                        .ops
                        .drain(..)
                        .partition(|op| matches!(op, Op::Attribute(..)));
                    record.ops = rest;
                    initial
                }
                None => VecDeque::new(),
            }
        };
        for op in initial {
            self.apply(id, op)?;
        }

        let children = tree
            .children
            .iter()
            .cloned()
            .map(|child| self.spawn(Some(id), element.clone(), child))
            .collect::<Vec<_>>();
        if let Some(record) = self.inner.nodes.borrow_mut().get_mut(&id) {
            record.children = children.clone();
        }
        for child in children {
            self.run_child(child)?;
        }
        Ok(element)
    }

    /// Drop the element of `id` with its children and attribute
    /// subscriptions, removing it from the page if `detach`.
    fn unbuild(&self, id: NodeId, detach: bool) {
        let (children, content, element, container) = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let Some(record) = nodes.get_mut(&id) else {
                return;
            };
            record.state = NodeState::Absent;
            let element = match &mut record.kind {
                Kind::Element { node, .. } => node.take(),
                _ => None,
            };
            (
                std::mem::take(&mut record.children),
                std::mem::take(&mut record.content),
                element,
                record.container.clone(),
            )
        };
        drop(content);
        for child in children {
            self.teardown(child, false);
        }
        if let (true, Some(element)) = (detach, element) {
            if let Err(err) = self.inner.page.remove(&container, &element) {
                self.report(&err);
            }
        }
    }

    fn apply_attribute(&self, id: NodeId, index: usize, value: Str) -> Result<()> {
        let (change, element, attribute) = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let Some(Kind::Element {
                node, attributes, ..
            }) = nodes.get_mut(&id).map(|record| &mut record.kind)
            else {
                return Ok(());
            };
            let Some(element) = node.clone() else {
                log::warn!("ignoring attribute for absent element {id}");
                return Ok(());
            };
            let Some((attribute, watch)) = attributes.get_mut(index) else {
                return Ok(());
            };
            (watch.observe(value), element, *attribute)
        };
        let name = attribute.as_str();
        match change {
            None => Ok(()),
            Some(Change::Mount(value)) if value.is_empty() => Ok(()),
            Some(Change::Update(value)) if value.is_empty() => {
                self.inner.page.remove_attribute(&element, name)
            }
            Some(change) => {
                let value = change.into_value();
                self.inner.page.set_attribute(&element, name, &value)
            }
        }
    }

    fn apply_items(&self, id: NodeId, items: Vec<(Key, AnyItem)>) -> Result<()> {
        let (render, old_keys, old_items, container) = {
            let nodes = self.inner.nodes.borrow();
            let Some(record) = nodes.get(&id) else {
                return Ok(());
            };
            let Kind::Collection { tree, keys, items } = &record.kind else {
                return Ok(());
            };
            (
                tree.render.clone(),
                keys.clone(),
                items.clone(),
                record.container.clone(),
            )
        };
        let new_keys = items.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>();
        let ordering = self.inner.config.ordering;
        let diff = diff::diff_keys(&old_keys, &new_keys, ordering)?;

        for key in diff.removed.iter() {
            let item = old_items
                .get(key)
                .context(MissingKeyedItemSnafu { key: key.clone() })?;
            self.forget_item(id, key);
            self.teardown(item.id, true);
            item.feed.close();
        }

        for (key, value) in items.iter() {
            if let Some(item) = old_items.get(key) {
                item.feed.send(value.clone())?;
            }
        }

        if diff.is_noop() {
            self.set_state(id, NodeState::Present);
            return Ok(());
        }
        log::debug!(
            "collection {id}: -{} +{} ~{}",
            diff.removed.len(),
            diff.added.len(),
            diff.moved.len()
        );

        let mut added = vec![];
        for (key, value) in items.iter() {
            if old_items.contains_key(key) {
                continue;
            }
            let (tree, feed) = render(value.clone())?;
            let item_id = self.spawn(Some(id), container.clone(), Child::Node(tree));
            added.push(item_id);
            let mut nodes = self.inner.nodes.borrow_mut();
            if let Some(record) = nodes.get_mut(&id) {
                record.children.push(item_id);
                if let Kind::Collection { keys, items, .. } = &mut record.kind {
                    keys.push(key.clone());
                    items.insert(
                        key.clone(),
                        Item {
                            id: item_id,
                            feed: Rc::from(feed),
                        },
                    );
                }
            }
        }

        let moved = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let Some(record) = nodes.get_mut(&id) else {
                return Ok(());
            };
            let Kind::Collection { keys, items, .. } = &mut record.kind else {
                return Ok(());
            };
            let mut children = vec![];
            for key in diff.order.iter() {
                let item = items
                    .get(key)
                    .context(MissingKeyedItemSnafu { key: key.clone() })?;
                children.push(item.id);
            }
            let moved = diff
                .moved
                .iter()
                .filter_map(|key| items.get(key).map(|item| item.id))
                .collect::<Vec<_>>();
            *keys = diff.order;
            record.children = children;
            moved
        };

        // later items are already in place when an item moves
        for item_id in moved.into_iter().rev() {
            let anchor = self.anchor(item_id);
            for node in self.page_nodes(item_id) {
                self.inner.page.insert(&container, &node, anchor.as_ref())?;
            }
        }

        for item_id in added {
            self.run_child(item_id)?;
        }
        self.set_state(id, NodeState::Present);
        Ok(())
    }

    fn forget_item(&self, id: NodeId, key: &Key) {
        let mut nodes = self.inner.nodes.borrow_mut();
        let Some(record) = nodes.get_mut(&id) else {
            return;
        };
        if let Kind::Collection { keys, items, .. } = &mut record.kind {
            if let Some(item) = items.remove(key) {
                record.children.retain(|child| *child != item.id);
            }
            keys.retain(|k| k != key);
        }
    }

    /// The first page node of `id`, if it has any on the page.
    fn first_page_node(nodes: &FxHashMap<NodeId, MountedNode<P>>, id: NodeId) -> Option<P::Node> {
        let record = nodes.get(&id)?;
        match &record.kind {
            Kind::Text { node, .. } | Kind::Element { node, .. } => node.clone(),
            Kind::Collection { .. } => record
                .children
                .iter()
                .find_map(|child| Self::first_page_node(nodes, *child)),
        }
    }

    /// Every page node of `id`, in page order.
    fn page_nodes(&self, id: NodeId) -> Vec<P::Node> {
        fn collect<P: Page>(
            nodes: &FxHashMap<NodeId, MountedNode<P>>,
            id: NodeId,
            out: &mut Vec<P::Node>,
        ) {
            let Some(record) = nodes.get(&id) else {
                return;
            };
            match &record.kind {
                Kind::Text { node, .. } | Kind::Element { node, .. } => {
                    out.extend(node.iter().cloned())
                }
                Kind::Collection { .. } => {
                    for child in record.children.iter() {
                        collect(nodes, *child, out);
                    }
                }
            }
        }
        let mut out = vec![];
        collect(&self.inner.nodes.borrow(), id, &mut out);
        out
    }

    /// The page node `id` must be inserted before, or `None` to append.
    ///
    /// That is the first page node among the following siblings of `id`,
    /// looking past the end of collections into their own siblings.
    fn anchor(&self, id: NodeId) -> Option<P::Node> {
        let nodes = self.inner.nodes.borrow();
        let mut id = id;
        loop {
            let parent_id = nodes.get(&id)?.parent?;
            let parent = nodes.get(&parent_id)?;
            if let (Kind::Element { .. }, NodeState::Mounting) = (&parent.kind, parent.state) {
                // children of an element being built are settled in order
                return None;
            }
            let index = parent.children.iter().position(|child| *child == id)?;
            let found = parent.children[index + 1..]
                .iter()
                .find_map(|sibling| Self::first_page_node(&nodes, *sibling));
            if found.is_some() {
                return found;
            }
            match parent.kind {
                Kind::Collection { .. } => id = parent_id,
                _ => return None,
            }
        }
    }

    /// Stop `id` and its descendants from reacting to their streams after a
    /// failure.
    fn kill(&self, id: NodeId) {
        let (driver, content, children) = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let Some(record) = nodes.get_mut(&id) else {
                return;
            };
            record.dead = true;
            record.ops.clear();
            (
                record.driver.take(),
                std::mem::take(&mut record.content),
                record.children.clone(),
            )
        };
        log::warn!("{id} failed and will no longer update");
        drop(driver);
        drop(content);
        for child in children {
            self.kill(child);
        }
    }

    /// Remove `id` from the arena, dropping its subscriptions and those of
    /// its descendants. Its page nodes are removed if `detach`.
    fn teardown(&self, id: NodeId, detach: bool) {
        let Some(record) = self.inner.nodes.borrow_mut().remove(&id) else {
            return;
        };
        let MountedNode {
            container,
            kind,
            children,
            driver,
            content,
            ..
        } = record;
        drop(driver);
        drop(content);
        let remove = |node: Option<P::Node>| {
            if let (true, Some(node)) = (detach, node) {
                if let Err(err) = self.inner.page.remove(&container, &node) {
                    self.report(&err);
                }
            }
        };
        match kind {
            Kind::Text { node, .. } => remove(node),
            Kind::Element { node, .. } => {
                for child in children {
                    self.teardown(child, false);
                }
                remove(node);
            }
            Kind::Collection { items, .. } => {
                for child in children {
                    self.teardown(child, detach);
                }
                for item in items.into_values() {
                    item.feed.close();
                }
            }
        }
        log::trace!("tore down {id}");
    }
}

#[cfg(all(test, feature = "mem"))]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        attribute::Attribute,
        config::{CollectionOrdering, Schedule},
        mem::{MemNode, MemPage, Mutation},
        stream::{subject, Stream},
        tree::{attr, class, collection, h, visible},
    };

    fn setup(config: Config) -> (MemPage, Engine<MemPage>) {
        let page = MemPage::with_target("app").unwrap();
        let engine = Engine::new(page.clone(), config);
        (page, engine)
    }

    fn html(page: &MemPage) -> String {
        page.inner_html("#app").unwrap()
    }

    fn count(page: &MemPage, f: impl Fn(&Mutation) -> bool) -> usize {
        page.journal().iter().filter(|m| f(m)).count()
    }

    #[test]
    fn static_tree_renders_immediately() {
        let (page, engine) = setup(Config::default());
        let tree = h(
            "div",
            [class("a"), attr(Attribute::Title, "t")],
            ("hello", h("br", [], ()), 1),
        );
        let mount = attach(&engine, "#app", tree).unwrap();
        assert_eq!(html(&page), r#"<div class="a" title="t">hello<br />1</div>"#);
        assert_eq!(mount.state(), NodeState::Present);
    }

    #[test]
    fn element_is_inserted_once_fully_built() {
        let (page, engine) = setup(Config::default());
        let _mount = attach(&engine, "#app", h("ul", [], (h("li", [], "a"), h("li", [], "b"))))
            .unwrap();
        let inserts = page
            .journal()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Insert { parent, child, .. } => Some(format!("{parent}>{child}")),
                _ => None,
            })
            .collect::<Vec<_>>();
        // children go into their detached parents before the root is attached
        assert_eq!(inserts, vec!["li>#text", "ul>li", "li>#text", "ul>li", "div>ul"]);
    }

    #[test]
    fn missing_target_fails_at_setup() {
        let (_page, engine) = setup(Config::default());
        let err = attach(&engine, "#nope", h("div", [], ())).err().unwrap();
        assert_eq!(
            err,
            Error::MissingTarget {
                selector: "#nope".into()
            }
        );
    }

    #[test]
    fn streamed_text_patches_in_place() {
        let (page, engine) = setup(Config::default());
        let (tx, rx) = subject::<String>();
        let _mount = attach(&engine, "#app", h("p", [], rx)).unwrap();
        assert_eq!(html(&page), "<p></p>");
        tx.next("a".into());
        tx.next("a".into());
        tx.next("b".into());
        assert_eq!(html(&page), "<p>b</p>");
        assert_eq!(count(&page, |m| matches!(m, Mutation::CreateText { .. })), 1);
        assert_eq!(count(&page, |m| matches!(m, Mutation::SetText { .. })), 1);
    }

    #[test]
    fn visibility_transitions_are_idempotent() {
        let (page, engine) = setup(Config::default());
        let (tx, shown) = subject::<bool>();
        let _mount = attach(
            &engine,
            "#app",
            h("div", [], (h("span", [visible(shown)], "content"), h("b", [], ()))),
        )
        .unwrap();
        page.clear_journal();
        let spans = |page: &MemPage| {
            count(page, |m| matches!(m, Mutation::CreateElement { tag } if tag == "span"))
        };

        tx.next(false);
        assert_eq!(html(&page), "<div><b></b></div>");
        tx.next(true);
        tx.next(true);
        assert_eq!(spans(&page), 1);
        // declared position is kept
        assert_eq!(html(&page), "<div><span>content</span><b></b></div>");
        tx.next(false);
        assert_eq!(html(&page), "<div><b></b></div>");
        tx.next(true);
        assert_eq!(spans(&page), 2);
        assert_eq!(count(&page, |m| matches!(m, Mutation::Remove { .. })), 1);
    }

    #[test]
    fn hiding_cancels_descendant_subscriptions() {
        let (page, engine) = setup(Config::default());
        let (shown_tx, shown) = subject::<bool>();
        let (text_tx, text) = subject::<String>();
        let _mount = attach(
            &engine,
            "#app",
            h("div", [visible(shown.start_with(true))], h("p", [], text)),
        )
        .unwrap();
        assert_eq!(text_tx.listener_count(), 1);
        shown_tx.next(false);
        assert_eq!(text_tx.listener_count(), 0);
        page.clear_journal();
        text_tx.next("ignored".into());
        assert!(page.journal().is_empty());
    }

    #[test]
    fn repeated_attribute_values_write_once() {
        let (page, engine) = setup(Config::default());
        let (tx, rx) = subject::<String>();
        let _mount = attach(&engine, "#app", h("div", [class(rx)], ())).unwrap();
        tx.next("x".into());
        tx.next("x".into());
        assert_eq!(count(&page, Mutation::is_attribute_write), 1);
        tx.next("".into());
        assert_eq!(html(&page), "<div></div>");
        tx.next("y".into());
        assert_eq!(html(&page), r#"<div class="y"></div>"#);
        assert_eq!(count(&page, Mutation::is_attribute_write), 3);
    }

    #[test]
    fn attribute_stream_wins_over_constant() {
        let (page, engine) = setup(Config::default());
        let el = h("div", [class("constant")], ()).with_attr_stream(
            Attribute::Class,
            Stream::of("streamed"),
        );
        let _mount = attach(&engine, "#app", el).unwrap();
        assert_eq!(html(&page), r#"<div class="streamed"></div>"#);
    }

    fn counter_item(item: Stream<(u32, &'static str)>) -> ElementNode {
        h("li", [], item.map(|(_, label)| label))
    }

    #[test]
    fn collection_add_remove_preserves_items() {
        let (page, engine) = setup(Config::default());
        let (tx, rx) = subject::<Vec<(u32, &'static str)>>();
        let _mount = attach(
            &engine,
            "#app",
            h("ul", [], collection(rx, |(k, _)| *k, counter_item)),
        )
        .unwrap();
        tx.next(vec![(1, "one"), (2, "two"), (3, "three")]);
        assert_eq!(html(&page), "<ul><li>one</li><li>two</li><li>three</li></ul>");
        let before = page.query_selector_all("li").unwrap();

        tx.next(vec![(3, "THREE"), (2, "two")]);
        assert_eq!(html(&page), "<ul><li>two</li><li>THREE</li></ul>");
        let after = page.query_selector_all("li").unwrap();
        assert_eq!(after[0], before[1]);
        assert_eq!(after[1], before[2]);

        tx.next(vec![(3, "THREE"), (2, "two"), (4, "four")]);
        assert_eq!(
            html(&page),
            "<ul><li>two</li><li>THREE</li><li>four</li></ul>"
        );
    }

    #[test]
    fn collection_reorders_with_minimal_moves() {
        let (page, engine) =
            setup(Config::default().with_ordering(CollectionOrdering::Reorder));
        let (tx, rx) = subject::<Vec<u32>>();
        let _mount = attach(
            &engine,
            "#app",
            h("ol", [], collection(rx, |n| *n, |n| h("li", [], n))),
        )
        .unwrap();
        tx.next(vec![1, 2, 3, 4]);
        page.clear_journal();
        tx.next(vec![4, 1, 2, 3]);
        assert_eq!(
            html(&page),
            "<ol><li>4</li><li>1</li><li>2</li><li>3</li></ol>"
        );
        assert_eq!(count(&page, |m| matches!(m, Mutation::Insert { .. })), 1);

        tx.next(vec![3, 5, 1]);
        assert_eq!(html(&page), "<ol><li>3</li><li>5</li><li>1</li></ol>");
    }

    #[test]
    fn collection_sits_between_siblings() {
        let (page, engine) = setup(Config::default());
        let (tx, rx) = subject::<Vec<u32>>();
        let _mount = attach(
            &engine,
            "#app",
            h(
                "div",
                [],
                ("start", collection(rx, |n| *n, |n| h("i", [], n)), "end"),
            ),
        )
        .unwrap();
        tx.next(vec![1]);
        tx.next(vec![1, 2]);
        assert_eq!(html(&page), "<div>start<i>1</i><i>2</i>end</div>");
        tx.next(vec![]);
        assert_eq!(html(&page), "<div>startend</div>");
    }

    #[test]
    fn retained_items_receive_new_values() {
        let (page, engine) = setup(Config::default());
        let (tx, rx) = subject::<Vec<(u32, u32)>>();
        let _mount = attach(
            &engine,
            "#app",
            h(
                "div",
                [],
                collection(rx, |(k, _)| *k, |item| h("p", [], item.map(|(_, v)| v))),
            ),
        )
        .unwrap();
        tx.next(vec![(1, 10), (2, 20)]);
        tx.next(vec![(1, 11), (2, 20)]);
        assert_eq!(html(&page), "<div><p>11</p><p>20</p></div>");
        assert_eq!(count(&page, |m| matches!(m, Mutation::CreateElement { .. })), 3);
    }

    #[test]
    fn duplicate_keys_stop_the_collection() {
        let errors = Rc::new(RefCell::new(vec![]));
        let (page, engine) = setup(Config::default().with_error_handler({
            let errors = errors.clone();
            move |err| errors.borrow_mut().push(err.clone())
        }));
        let (tx, rx) = subject::<Vec<u32>>();
        let (text_tx, text) = subject::<String>();
        let _mount = attach(
            &engine,
            "#app",
            h(
                "div",
                [],
                (collection(rx, |n| *n, |n| h("i", [], n)), h("p", [], text)),
            ),
        )
        .unwrap();
        tx.next(vec![1]);
        tx.next(vec![2, 2]);
        assert_eq!(*errors.borrow(), vec![Error::DuplicateKey { key: Key::from(2) }]);
        assert!(errors.borrow()[0].is_programming_error());
        assert_eq!(tx.listener_count(), 0);

        // siblings stay live
        text_tx.next("still here".into());
        assert_eq!(html(&page), "<div><i>1</i><p>still here</p></div>");
    }

    #[test]
    fn stream_errors_are_isolated() {
        let errors = Rc::new(RefCell::new(vec![]));
        let (page, engine) = setup(Config::default().with_error_handler({
            let errors = errors.clone();
            move |err| errors.borrow_mut().push(err.to_string())
        }));
        let (a_tx, a) = subject::<String>();
        let (b_tx, b) = subject::<String>();
        let _mount = attach(
            &engine,
            "#app",
            h("div", [], (h("p", [class(a)], ()), h("p", [], b))),
        )
        .unwrap();
        a_tx.next("ok".into());
        a_tx.error(Error::stream("boom"));
        a_tx.next("never".into());
        b_tx.next("live".into());
        assert_eq!(*errors.borrow(), vec!["stream error: boom".to_string()]);
        assert_eq!(html(&page), r#"<div><p class="ok"></p><p>live</p></div>"#);
    }

    #[test]
    fn failing_children_do_not_abort_the_build() {
        let errors = Rc::new(RefCell::new(vec![]));
        let (page, engine) = setup(Config::default().with_error_handler({
            let errors = errors.clone();
            move |err| errors.borrow_mut().push(err.to_string())
        }));
        let (tx, sibling) = subject::<String>();
        let (show_tx, shown) = subject::<bool>();
        let failing = || h("p", [], Stream::<String>::fail(Error::stream("boom")));
        let mount = attach(
            &engine,
            "#app",
            h(
                "div",
                [],
                (
                    failing(),
                    h("p", [], sibling.start_with("live".into())),
                    h("section", [visible(shown)], (failing(), h("b", [], "ok"))),
                ),
            ),
        )
        .unwrap();
        assert_eq!(mount.state(), NodeState::Present);
        assert_eq!(*errors.borrow(), vec!["stream error: boom".to_string()]);
        assert_eq!(html(&page), "<div><p></p><p>live</p></div>");

        tx.next("still live".into());
        show_tx.next(true);
        assert_eq!(errors.borrow().len(), 2);
        assert_eq!(
            html(&page),
            "<div><p></p><p>still live</p><section><p></p><b>ok</b></section></div>"
        );
        show_tx.next(false);
        assert_eq!(html(&page), "<div><p></p><p>still live</p></div>");
    }

    /// A page whose `create_element` fails for one tag.
    #[derive(Clone)]
    struct Refusing {
        page: MemPage,
        tag: &'static str,
    }

    impl Page for Refusing {
        type Node = MemNode;

        fn create_element(&self, tag: &str) -> Result<MemNode> {
            if tag == self.tag {
                return Err(Error::page("create_element", "refused"));
            }
            self.page.create_element(tag)
        }

        fn create_text(&self, text: &str) -> Result<MemNode> {
            self.page.create_text(text)
        }

        fn set_text(&self, node: &MemNode, text: &str) -> Result<()> {
            self.page.set_text(node, text)
        }

        fn insert(&self, parent: &MemNode, child: &MemNode, before: Option<&MemNode>) -> Result<()> {
            self.page.insert(parent, child, before)
        }

        fn remove(&self, parent: &MemNode, child: &MemNode) -> Result<()> {
            self.page.remove(parent, child)
        }

        fn set_attribute(&self, node: &MemNode, name: &str, value: &str) -> Result<()> {
            self.page.set_attribute(node, name, value)
        }

        fn remove_attribute(&self, node: &MemNode, name: &str) -> Result<()> {
            self.page.remove_attribute(node, name)
        }
    }

    impl Document for Refusing {
        fn query_selector(&self, selector: &str) -> Result<Option<MemNode>> {
            self.page.query_selector(selector)
        }

        fn clear(&self, node: &MemNode) -> Result<()> {
            self.page.clear(node)
        }
    }

    #[test]
    fn failed_build_leaves_nothing_behind() {
        let page = MemPage::with_target("app").unwrap();
        let engine = Engine::new(
            Refusing {
                page: page.clone(),
                tag: "aside",
            },
            Config::default(),
        );
        let (text_tx, text) = subject::<String>();
        let (class_tx, classes) = subject::<String>();
        let (items_tx, items) = subject::<Vec<u32>>();
        let err = attach(
            &engine,
            "#app",
            h(
                "div",
                [],
                (
                    h("p", [class(classes)], text),
                    h("ul", [], collection(items, |n| *n, |n| h("li", [], n))),
                    h("aside", [], ()),
                ),
            ),
        )
        .err()
        .unwrap();
        assert!(err.is_page_error());
        assert_eq!(html(&page), "");
        assert_eq!(engine.node_count(), 0);
        assert_eq!(text_tx.listener_count(), 0);
        assert_eq!(class_tx.listener_count(), 0);
        assert_eq!(items_tx.listener_count(), 0);
        assert_eq!(
            count(&page, |m| matches!(m, Mutation::Insert { child, .. } if child == "div")),
            0
        );
    }

    #[test]
    fn next_frame_defers_until_flush() {
        let (page, engine) = setup(Config::default().with_schedule(Schedule::NextFrame));
        let (tx, rx) = subject::<u32>();
        let _mount = attach(&engine, "#app", h("p", [], rx.start_with(0))).unwrap();
        assert_eq!(html(&page), "<p>0</p>");
        tx.next(1);
        tx.next(2);
        assert_eq!(engine.pending(), 1);
        assert_eq!(html(&page), "<p>0</p>");
        engine.flush();
        assert_eq!(engine.pending(), 0);
        assert_eq!(html(&page), "<p>2</p>");
        assert_eq!(count(&page, |m| matches!(m, Mutation::SetText { .. })), 2);
    }

    #[test]
    fn queued_ops_apply_in_emission_order() {
        let (page, engine) = setup(Config::default().with_schedule(Schedule::NextFrame));
        let (tx, shown) = subject::<bool>();
        let _mount = attach(
            &engine,
            "#app",
            h("div", [], h("span", [visible(shown)], "x")),
        )
        .unwrap();
        tx.next(true);
        tx.next(false);
        tx.next(true);
        engine.flush();
        assert_eq!(html(&page), "<div><span>x</span></div>");
        assert_eq!(
            count(&page, |m| matches!(m, Mutation::CreateElement { tag } if tag == "span")),
            2
        );
    }

    #[test]
    fn unmount_tears_everything_down() {
        let (page, engine) = setup(Config::default());
        let (tx, rx) = subject::<Vec<u32>>();
        let (text_tx, text) = subject::<String>();
        let mount = attach(
            &engine,
            "#app",
            h(
                "div",
                [],
                (
                    collection(rx, |n| *n, |n| h("i", [], n)),
                    h("p", [], text),
                ),
            ),
        )
        .unwrap();
        tx.next(vec![1, 2]);
        let root = mount.root();
        mount.unmount();
        assert_eq!(html(&page), "");
        assert_eq!(engine.node_count(), 0);
        assert_eq!(engine.state(root), NodeState::Removed);
        assert_eq!(tx.listener_count(), 0);
        assert_eq!(text_tx.listener_count(), 0);
    }

    #[test]
    fn removed_items_complete_their_streams() {
        let (_page, engine) = setup(Config::default());
        let completed = Rc::new(RefCell::new(0));
        let watchers = Rc::new(RefCell::new(vec![]));
        let (tx, rx) = subject::<Vec<u32>>();
        let render = {
            let completed = completed.clone();
            let watchers = watchers.clone();
            move |item: Stream<u32>| {
                let completed = completed.clone();
                watchers.borrow_mut().push(item.subscribe(move |ev| {
                    if let Event::Complete = ev {
                        *completed.borrow_mut() += 1;
                    }
                }));
                h("i", [], item)
            }
        };
        let _mount = attach(&engine, "#app", h("div", [], collection(rx, |n| *n, render))).unwrap();
        tx.next(vec![1, 2]);
        tx.next(vec![2]);
        assert_eq!(*completed.borrow(), 1);
        assert_eq!(watchers.borrow().len(), 2);
    }
}
