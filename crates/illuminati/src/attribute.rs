//! The closed set of attributes an element may declare.
use crate::{str::Str, stream::Stream};

macro_rules! attributes {
    ($($(#[$meta:meta])* $variant:ident => $name:literal),* $(,)?) => {
        /// Every attribute illuminati knows how to keep in sync.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Attribute {
            $($(#[$meta])* $variant),*
        }

        impl Attribute {
            pub const ALL: &'static [Attribute] = &[$(Attribute::$variant),*];

            /// The attribute's name on the page.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Attribute::$variant => $name),*
                }
            }

            /// Look up an attribute by its page name.
            pub fn from_name(name: &str) -> Option<Attribute> {
                match name {
                    $($name => Some(Attribute::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

attributes! {
    Class => "class",
    Id => "id",
    Type => "type",
    Href => "href",
    Name => "name",
    Value => "value",
    Title => "title",
    Style => "style",
    Placeholder => "placeholder",
    For => "for",
    Src => "src",
    Alt => "alt",
    Role => "role",
    Target => "target",
    Rel => "rel",
    /// Boolean attributes are present when their value is non-empty.
    Disabled => "disabled",
    Checked => "checked",
    Hidden => "hidden",
    TabIndex => "tabindex",
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The declared representation of one attribute.
///
/// When both a constant and a stream are declared the stream wins.
#[derive(Clone, Default, Debug)]
pub struct AttrValue {
    pub constant: Option<Str>,
    pub stream: Option<Stream<Str>>,
}

impl AttrValue {
    pub fn constant(value: impl Into<Str>) -> Self {
        AttrValue {
            constant: Some(value.into()),
            stream: None,
        }
    }

    pub fn stream<S: Into<Str> + Clone + 'static>(stream: Stream<S>) -> Self {
        AttrValue {
            constant: None,
            stream: Some(stream.map(Into::into)),
        }
    }

    /// The stream of values the attribute takes.
    ///
    /// `stream || of(constant) || never`.
    pub fn effective(&self) -> Stream<Str> {
        match (&self.stream, &self.constant) {
            (Some(stream), _) => stream.clone(),
            (None, Some(constant)) => Stream::of(constant.clone()),
            (None, None) => Stream::never(),
        }
    }

    fn merge(&mut self, attribute: Attribute, other: AttrValue) {
        if other.constant.is_some() {
            self.constant = other.constant;
        }
        if other.stream.is_some() {
            self.stream = other.stream;
        }
        if self.constant.is_some() && self.stream.is_some() {
            log::debug!(
                "attribute '{attribute}' declared as both a constant and a stream, the stream wins"
            );
        }
    }
}

impl From<&'static str> for AttrValue {
    fn from(s: &'static str) -> Self {
        AttrValue::constant(s)
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::constant(s)
    }
}

impl From<Str> for AttrValue {
    fn from(s: Str) -> Self {
        AttrValue::constant(s)
    }
}

impl From<Stream<Str>> for AttrValue {
    fn from(st: Stream<Str>) -> Self {
        AttrValue {
            constant: None,
            stream: Some(st),
        }
    }
}

impl From<Stream<String>> for AttrValue {
    fn from(st: Stream<String>) -> Self {
        AttrValue::stream(st)
    }
}

impl From<Stream<&'static str>> for AttrValue {
    fn from(st: Stream<&'static str>) -> Self {
        AttrValue::stream(st)
    }
}

/// Attributes of one element, in declaration order, one slot per
/// [`Attribute`].
#[derive(Clone, Default, Debug)]
pub struct AttributeSet {
    slots: Vec<(Attribute, AttrValue)>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (part of) an attribute. Declaring the same attribute again
    /// fills in or replaces its constant and stream.
    pub fn set(&mut self, attribute: Attribute, value: impl Into<AttrValue>) {
        let value = value.into();
        if let Some((_, slot)) = self.slots.iter_mut().find(|(a, _)| *a == attribute) {
            slot.merge(attribute, value);
        } else {
            let mut slot = AttrValue::default();
            slot.merge(attribute, value);
            self.slots.push((attribute, slot));
        }
    }

    pub fn get(&self, attribute: Attribute) -> Option<&AttrValue> {
        self.slots
            .iter()
            .find_map(|(a, v)| (*a == attribute).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Attribute, AttrValue)> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
