//! Reactive page reconciliation.
//!
//! Illuminati keeps a page in sync with a declarative tree whose changing
//! parts are [`Stream`](stream::Stream)s.
//!
//! ## Trees
//!
//! A [`TreeNode`](tree::TreeNode) is text, an element or a keyed collection.
//! Elements carry attributes (constant, streamed or both), an optional
//! visibility stream and children. Text can be constant or streamed. A
//! collection renders one subtree per key and keeps each subtree alive for as
//! long as its key keeps being named.
//!
//! Trees are plain data. Build them with [`h`](tree::h) or the
//! [`ElementNode`](tree::ElementNode) builder methods.
//!
//! ## Streams
//!
//! The streams in [`stream`] are synchronous and multicast. They start their
//! producer when the first listener subscribes and stop it when the last one
//! leaves, so whatever the engine stops listening to stops doing work.
//!
//! ## Engine
//!
//! An [`Engine`] reconciles trees onto a [`Page`](page::Page). The in-memory
//! [`MemPage`](mem::MemPage) renders to HTML strings and is used in tests and
//! on the server. With the `web` feature, [`WebPage`](web::WebPage) drives
//! the browser's DOM.
//!
//! ```rust
//! use illuminati::{prelude::*, stream::subject};
//!
//! let page = MemPage::with_target("app").unwrap();
//! let engine = Engine::new(page.clone(), Config::default());
//!
//! let (tx, count) = subject::<u32>();
//! let clicks = page.clicks("button");
//! let _clicking = clicks.for_each(move |_| tx.next(1));
//!
//! let total = count.fold(0, |sum, n| sum + n);
//! let _mount = attach(&engine, "#app", h("button", [], total)).unwrap();
//! assert_eq!(page.inner_html("#app").unwrap(), "<button>0</button>");
//!
//! page.click("button").unwrap();
//! page.click("button").unwrap();
//! assert_eq!(page.inner_html("#app").unwrap(), "<button>2</button>");
//! ```
pub mod attribute;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
#[cfg(feature = "mem")]
pub mod mem;
pub mod page;
pub mod shared;
pub mod str;
pub mod stream;
pub mod tree;
pub mod watch;
#[cfg(feature = "web")]
pub mod web;

pub use engine::{attach, Engine, Mount};
pub use error::Error;
pub use str::Str;

pub mod prelude {
    pub use crate::attribute::{AttrValue, Attribute};
    pub use crate::config::{CollectionOrdering, Config, Schedule};
    pub use crate::engine::{attach, Engine, Mount, NodeId, NodeState};
    pub use crate::error::Error;
    pub use crate::event::EventSource;
    #[cfg(feature = "mem")]
    pub use crate::mem::{MemEvent, MemNode, MemPage};
    pub use crate::page::{Document, Page};
    pub use crate::str::Str;
    pub use crate::stream::{Event, Stream};
    pub use crate::tree::{
        attr, class, collection, cx, h, id, visible, Child, Children, CollectionNode,
        ElementNode, Key, Prop, TextNode, TreeNode,
    };
    #[cfg(feature = "web")]
    pub use crate::web::WebPage;
}
