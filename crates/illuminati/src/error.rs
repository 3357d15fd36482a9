//! Errors.
use snafu::Snafu;

use crate::{str::Str, tree::Key};

/// Everything that can go wrong while building or keeping a page in sync.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The insertion target could not be found at setup.
    #[snafu(display("cannot find element with selector `{selector}`"))]
    MissingTarget { selector: Str },

    /// A collection's diff named a key without a matching item.
    #[snafu(display("collection item for key {key} could not be found"))]
    MissingKeyedItem { key: Key },

    /// A collection emission named the same key twice.
    #[snafu(display("collection key {key} appears more than once in one emission"))]
    DuplicateKey { key: Key },

    /// An erased collection item was not of the collection's item type.
    #[snafu(display("collection item is not a '{expected}'"))]
    ItemType { expected: &'static str },

    /// A stream delivered an error event.
    #[snafu(display("stream error: {message}"))]
    Stream { message: Str },

    /// A page mutation primitive failed.
    #[snafu(display("page operation '{operation}' failed: {message}"))]
    Page {
        operation: &'static str,
        message: Str,
    },

    /// A selector string could not be parsed.
    #[snafu(display("invalid selector `{selector}`"))]
    Selector { selector: Str },

    /// A configuration document could not be read.
    #[snafu(display("invalid configuration: {message}"))]
    Config { message: Str },
}

impl Error {
    /// Create a stream error from anything displayable.
    pub fn stream(message: impl std::fmt::Display) -> Self {
        Error::Stream {
            message: message.to_string().into(),
        }
    }

    /// Create a page error for the given primitive.
    pub fn page(operation: &'static str, message: impl std::fmt::Display) -> Self {
        Error::Page {
            operation,
            message: message.to_string().into(),
        }
    }

    /// Errors raised by a page mutation primitive. A failed primitive aborts
    /// the element being built.
    pub fn is_page_error(&self) -> bool {
        matches!(self, Error::Page { .. })
    }

    /// Errors that are bugs in the declaring application rather than
    /// runtime conditions.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Error::MissingKeyedItem { .. } | Error::DuplicateKey { .. } | Error::ItemType { .. }
        )
    }
}

/// Errors compare by their rendered message.
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
