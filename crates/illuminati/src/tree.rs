//! Declarative descriptions of page content.
//!
//! A tree is a plain value. Building one performs no page interaction; the
//! [`Engine`](crate::engine::Engine) turns it into live page nodes.
//!
//! ```rust
//! use illuminati::{prelude::*, stream::subject};
//!
//! let (tx, count) = subject::<u32>();
//! let tree = h(
//!     "div",
//!     [class("counter")],
//!     (h("span", [], count.start_with(0)), h("button", [class("inc")], "+")),
//! );
//! assert_eq!(tree.children.len(), 2);
//! # drop(tx);
//! ```
use std::{any::Any, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    attribute::{AttrValue, Attribute, AttributeSet},
    error::{Error, Result},
    str::Str,
    stream::{remembering_subject, Sender, Stream},
};

/// Identifies one item of a collection across emissions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Num(i64),
    Str(Str),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Num(n) => write!(f, "{n}"),
            Key::Str(s) => write!(f, "{:?}", s.as_str()),
        }
    }
}

impl From<&'static str> for Key {
    fn from(s: &'static str) -> Self {
        Key::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}

impl From<Str> for Key {
    fn from(s: Str) -> Self {
        Key::Str(s)
    }
}

macro_rules! num_key {
    ($($t:ty),*) => {
        $(impl From<$t> for Key {
            fn from(n: $t) -> Self {
                Key::Num(n as i64)
            }
        })*
    };
}

num_key!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

/// A constant text leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextNode {
    pub text: Str,
}

impl TextNode {
    pub fn new(text: impl Into<Str>) -> Self {
        TextNode { text: text.into() }
    }
}

/// A child of an element.
#[derive(Clone, Debug)]
pub enum Child {
    Node(TreeNode),
    /// Text whose content changes over time.
    Text(Stream<TextNode>),
}

/// An element, its attributes and its children.
#[derive(Clone, Debug)]
pub struct ElementNode {
    pub tag: Str,
    pub attributes: AttributeSet,
    /// Whether the element exists on the page. `None` means always.
    pub visible: Option<Stream<bool>>,
    pub children: Vec<Child>,
}

impl ElementNode {
    pub fn new(tag: impl Into<Str>) -> Self {
        ElementNode {
            tag: tag.into(),
            attributes: AttributeSet::default(),
            visible: None,
            children: vec![],
        }
    }

    pub fn with_attr(mut self, attribute: Attribute, value: impl Into<Str>) -> Self {
        self.attributes.set(attribute, AttrValue::constant(value));
        self
    }

    pub fn with_attr_stream<S: Into<Str> + Clone + 'static>(
        mut self,
        attribute: Attribute,
        stream: Stream<S>,
    ) -> Self {
        self.attributes.set(attribute, AttrValue::stream(stream));
        self
    }

    pub fn with_class(self, class: impl Into<Str>) -> Self {
        self.with_attr(Attribute::Class, class)
    }

    pub fn with_id(self, id: impl Into<Str>) -> Self {
        self.with_attr(Attribute::Id, id)
    }

    /// Create the element while `visible` last emitted `true` and remove it
    /// while it last emitted `false`.
    pub fn visible_if(mut self, visible: Stream<bool>) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_child(mut self, child: impl Into<TreeNode>) -> Self {
        self.children.push(Child::Node(child.into()));
        self
    }

    pub fn with_children(mut self, children: impl Into<Children>) -> Self {
        self.children.extend(children.into().0);
        self
    }
}

/// A type erased collection item.
pub(crate) type AnyItem = Rc<dyn Any>;

/// Feeds later values of one item into the stream its subtree was rendered
/// from.
pub(crate) trait ItemFeed {
    fn send(&self, item: AnyItem) -> Result<()>;
    /// Complete the item's stream.
    fn close(&self);
}

impl<T: Clone + 'static> ItemFeed for Sender<T> {
    fn send(&self, item: AnyItem) -> Result<()> {
        self.next(downcast::<T>(item)?);
        Ok(())
    }

    fn close(&self) {
        self.complete();
    }
}

fn downcast<T: Clone + 'static>(item: AnyItem) -> Result<T> {
    item.downcast::<T>()
        .map(|t| T::clone(&t))
        .map_err(|_| Error::ItemType {
            expected: std::any::type_name::<T>(),
        })
}

type RenderFn = dyn Fn(AnyItem) -> Result<(TreeNode, Box<dyn ItemFeed>)>;

/// A keyed list whose membership changes over time.
#[derive(Clone)]
pub struct CollectionNode {
    pub(crate) items: Stream<Vec<(Key, AnyItem)>>,
    pub(crate) render: Rc<RenderFn>,
}

impl std::fmt::Debug for CollectionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionNode")
            .field("items", &self.items)
            .finish()
    }
}

impl CollectionNode {
    /// Every emission of `items` names the complete list. `key_of` gives each
    /// item its identity and `render_item` describes one item from a stream
    /// of that item's values, starting with its current one.
    pub fn new<T, K, N>(
        items: Stream<Vec<T>>,
        key_of: impl Fn(&T) -> K + 'static,
        render_item: impl Fn(Stream<T>) -> N + 'static,
    ) -> Self
    where
        T: Clone + 'static,
        K: Into<Key>,
        N: Into<TreeNode>,
    {
        let items: Stream<Vec<(Key, AnyItem)>> = items.map(move |items| {
            items
                .into_iter()
                .map(|item| (key_of(&item).into(), Rc::new(item) as AnyItem))
                .collect::<Vec<_>>()
        });
        let render = move |first: AnyItem| -> Result<(TreeNode, Box<dyn ItemFeed>)> {
            let first = downcast::<T>(first)?;
            let (tx, item) = remembering_subject::<T>();
            tx.next(first);
            let tree = render_item(item).into();
            let feed: Box<dyn ItemFeed> = Box::new(tx);
            Ok((tree, feed))
        };
        CollectionNode {
            items,
            render: Rc::new(render),
        }
    }
}

/// A declarative description of page content.
#[derive(Clone, Debug)]
pub enum TreeNode {
    Text(TextNode),
    Element(ElementNode),
    Collection(CollectionNode),
}

impl From<TextNode> for TreeNode {
    fn from(node: TextNode) -> Self {
        TreeNode::Text(node)
    }
}

impl From<ElementNode> for TreeNode {
    fn from(node: ElementNode) -> Self {
        TreeNode::Element(node)
    }
}

impl From<CollectionNode> for TreeNode {
    fn from(node: CollectionNode) -> Self {
        TreeNode::Collection(node)
    }
}

impl From<&'static str> for TreeNode {
    fn from(s: &'static str) -> Self {
        TreeNode::Text(TextNode::new(s))
    }
}

impl From<String> for TreeNode {
    fn from(s: String) -> Self {
        TreeNode::Text(TextNode::new(s))
    }
}

/// A flattened list of children.
///
/// Anything that converts into `Children` may be passed to [`h`]: trees,
/// strings, numbers, streams of those, and any nesting of tuples, arrays,
/// `Vec`s and `Option`s of them.
#[derive(Clone, Debug, Default)]
pub struct Children(pub Vec<Child>);

impl Children {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Child> for Children {
    fn from(child: Child) -> Self {
        Children(vec![child])
    }
}

impl From<TreeNode> for Children {
    fn from(node: TreeNode) -> Self {
        Child::Node(node).into()
    }
}

impl From<ElementNode> for Children {
    fn from(node: ElementNode) -> Self {
        TreeNode::from(node).into()
    }
}

impl From<TextNode> for Children {
    fn from(node: TextNode) -> Self {
        TreeNode::from(node).into()
    }
}

impl From<CollectionNode> for Children {
    fn from(node: CollectionNode) -> Self {
        TreeNode::from(node).into()
    }
}

impl From<Stream<TextNode>> for Children {
    fn from(stream: Stream<TextNode>) -> Self {
        Child::Text(stream).into()
    }
}

impl<'a> From<&'a str> for Children {
    fn from(s: &'a str) -> Self {
        TextNode::new(s.to_string()).into()
    }
}

impl<'a> From<&'a String> for Children {
    fn from(s: &'a String) -> Self {
        TextNode::new(s.clone()).into()
    }
}

macro_rules! text_children {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Children {
                fn from(t: $t) -> Self {
                    TextNode::new(t.to_string()).into()
                }
            }

            impl From<Stream<$t>> for Children {
                fn from(stream: Stream<$t>) -> Self {
                    stream.map(|t| TextNode::new(t.to_string())).into()
                }
            }
        )*
    };
}

text_children!(String, Str, char, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<Stream<&'static str>> for Children {
    fn from(stream: Stream<&'static str>) -> Self {
        stream.map(TextNode::new).into()
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::default()
    }
}

impl<T: Into<Children>> From<Option<T>> for Children {
    fn from(t: Option<T>) -> Self {
        t.map(Into::into).unwrap_or_default()
    }
}

impl<T: Into<Children>> From<Vec<T>> for Children {
    fn from(ts: Vec<T>) -> Self {
        Children(ts.into_iter().flat_map(|t| t.into().0).collect())
    }
}

impl<T: Into<Children>, const N: usize> From<[T; N]> for Children {
    fn from(ts: [T; N]) -> Self {
        Children(ts.into_iter().flat_map(|t| t.into().0).collect())
    }
}

macro_rules! tuple_children {
    ($($t:ident),+) => {
        impl<$($t: Into<Children>),+> From<($($t,)+)> for Children {
            #[allow(non_snake_case)]
            fn from(($($t,)+): ($($t,)+)) -> Self {
                let mut children = Children::default();
                $(children.0.extend($t.into().0);)+
                children
            }
        }
    };
}

tuple_children!(A);
tuple_children!(A, B);
tuple_children!(A, B, C);
tuple_children!(A, B, C, D);
tuple_children!(A, B, C, D, E);
tuple_children!(A, B, C, D, E, F);
tuple_children!(A, B, C, D, E, F, G);
tuple_children!(A, B, C, D, E, F, G, H);
tuple_children!(A, B, C, D, E, F, G, H, I);
tuple_children!(A, B, C, D, E, F, G, H, I, J);

/// One declared property of an element, for use with [`h`].
#[derive(Clone, Debug)]
pub enum Prop {
    Attr(Attribute, AttrValue),
    Visible(Stream<bool>),
}

pub fn attr(attribute: Attribute, value: impl Into<AttrValue>) -> Prop {
    Prop::Attr(attribute, value.into())
}

pub fn class(value: impl Into<AttrValue>) -> Prop {
    attr(Attribute::Class, value)
}

pub fn id(value: impl Into<AttrValue>) -> Prop {
    attr(Attribute::Id, value)
}

/// The element exists only while `visible` last emitted `true`.
pub fn visible(visible: Stream<bool>) -> Prop {
    Prop::Visible(visible)
}

/// Describe an element.
pub fn h(
    tag: impl Into<Str>,
    props: impl IntoIterator<Item = Prop>,
    children: impl Into<Children>,
) -> ElementNode {
    let mut element = ElementNode::new(tag);
    for prop in props {
        match prop {
            Prop::Attr(attribute, value) => element.attributes.set(attribute, value),
            Prop::Visible(stream) => element.visible = Some(stream),
        }
    }
    element.children = children.into().0;
    element
}

/// Describe a keyed collection. See [`CollectionNode::new`].
pub fn collection<T, K, N>(
    items: Stream<Vec<T>>,
    key_of: impl Fn(&T) -> K + 'static,
    render_item: impl Fn(Stream<T>) -> N + 'static,
) -> CollectionNode
where
    T: Clone + 'static,
    K: Into<Key>,
    N: Into<TreeNode>,
{
    CollectionNode::new(items, key_of, render_item)
}

/// Join the non-empty class names with single spaces.
///
/// ```rust
/// use illuminati::tree::cx;
///
/// let highlighted = false;
/// assert_eq!(cx(["container", if highlighted { "highlighted" } else { "" }]), "container");
/// ```
pub fn cx<S: AsRef<str>>(classes: impl IntoIterator<Item = S>) -> String {
    classes
        .into_iter()
        .filter_map(|class| {
            let class = class.as_ref().trim();
            (!class.is_empty()).then(|| class.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::subject;

    fn texts(children: &[Child]) -> Vec<String> {
        children
            .iter()
            .map(|child| match child {
                Child::Node(TreeNode::Text(t)) => t.text.to_string(),
                Child::Node(TreeNode::Element(e)) => format!("<{}>", e.tag),
                Child::Node(TreeNode::Collection(_)) => "collection".into(),
                Child::Text(_) => "stream".into(),
            })
            .collect()
    }

    #[test]
    fn children_flatten() {
        let (_tx, rx) = subject::<String>();
        let el = h(
            "div",
            [],
            (
                "a",
                vec![Some(1), None, Some(2)],
                (h("p", [], ()), [rx]),
                None::<&str>,
            ),
        );
        assert_eq!(texts(&el.children), vec!["a", "1", "2", "<p>", "stream"]);
    }

    #[test]
    fn props_populate_element() {
        let (_tx, shown) = subject::<bool>();
        let el = h(
            "button",
            [class("inc"), attr(Attribute::Type, "button"), visible(shown)],
            "+",
        );
        assert_eq!(el.attributes.len(), 2);
        assert!(el.visible.is_some());
        assert_eq!(
            el.attributes.get(Attribute::Class).unwrap().constant,
            Some(Str::from("inc"))
        );
    }

    #[test]
    fn builder_matches_h() {
        let el = ElementNode::new("div")
            .with_class("x")
            .with_id("y")
            .with_child(TextNode::new("hi"))
            .with_children(("a", 1));
        assert_eq!(el.attributes.len(), 2);
        assert_eq!(texts(&el.children), vec!["hi", "a", "1"]);
    }

    #[test]
    fn cx_joins_truthy() {
        assert_eq!(cx(["container", "", " highlighted "]), "container highlighted");
        assert_eq!(cx(Vec::<&str>::new()), "");
    }

    #[test]
    fn keys_display() {
        assert_eq!(Key::from(3).to_string(), "3");
        assert_eq!(Key::from("a").to_string(), "\"a\"");
        assert!(Key::from(1u8) == Key::Num(1));
    }

    #[test]
    fn wrong_item_type_is_reported() {
        let node = collection(Stream::<Vec<u8>>::never(), |n| *n, |n| h("li", [], n));
        let wrong: AnyItem = Rc::new("not a u8");
        match (node.render)(wrong) {
            Err(Error::ItemType { expected }) => assert_eq!(expected, "u8"),
            other => panic!("unexpected {:?}", other.map(|(tree, _)| tree)),
        }
    }
}
