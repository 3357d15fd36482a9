//! String type wrapping [`Cow<'static, str>`].
use std::{borrow::Cow, ops::Deref};

/// A transparent wrapper around [`Cow<'static, str>`].
///
/// Tags, attribute values and text contents are all `Str`, so static
/// declarations never allocate.
#[repr(transparent)]
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Str {
    inner: Cow<'static, str>,
}

impl core::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

impl core::fmt::Debug for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        core::fmt::Debug::fmt(self.inner.as_ref(), f)
    }
}

impl From<&'static str> for Str {
    fn from(s: &'static str) -> Self {
        Str { inner: s.into() }
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str { inner: s.into() }
    }
}

impl<'a> From<&'a String> for Str {
    fn from(s: &'a String) -> Self {
        Str {
            inner: s.clone().into(),
        }
    }
}

impl From<Cow<'static, str>> for Str {
    fn from(inner: Cow<'static, str>) -> Self {
        Str { inner }
    }
}

impl<'a> From<&'a Str> for Str {
    fn from(s: &'a Str) -> Self {
        s.clone()
    }
}

impl Deref for Str {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for Str {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for Str {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Str {
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Copy a borrowed string into an owned `Str`.
    pub fn copied(s: &str) -> Self {
        Str {
            inner: Cow::Owned(s.to_owned()),
        }
    }
}
