//! Compound selectors: `tag`, `.class`, `#id` and combinations like
//! `button.inc#x`.
use std::str::FromStr;

use crate::{
    error::{Error, Result},
    str::Str,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    pub tag: Option<Str>,
    pub id: Option<Str>,
    pub classes: Vec<Str>,
}

impl Selector {
    pub fn parse(selector: &str) -> Result<Self> {
        let invalid = || Error::Selector {
            selector: Str::copied(selector),
        };
        let trimmed = selector.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(invalid());
        }

        let mut parsed = Selector::default();
        let mut rest = trimmed;
        let tag_len = rest.find(is_sigil).unwrap_or(rest.len());
        if tag_len > 0 {
            let tag = &rest[..tag_len];
            if tag != "*" {
                if !tag.chars().all(is_name_char) {
                    return Err(invalid());
                }
                parsed.tag = Some(Str::copied(&tag.to_ascii_lowercase()));
            }
            rest = &rest[tag_len..];
        }

        while let Some(sigil) = rest.chars().next() {
            let body = &rest[1..];
            let len = body.find(is_sigil).unwrap_or(body.len());
            let name = &body[..len];
            if name.is_empty() || !name.chars().all(is_name_char) {
                return Err(invalid());
            }
            match sigil {
                '.' => parsed.classes.push(Str::copied(name)),
                '#' if parsed.id.is_none() => parsed.id = Some(Str::copied(name)),
                _ => return Err(invalid()),
            }
            rest = &body[len..];
        }
        Ok(parsed)
    }

    /// Whether an element with the given tag and attribute lookup matches.
    pub fn matches<'a>(&self, tag: &str, attribute: impl Fn(&str) -> Option<&'a str>) -> bool {
        if let Some(want) = self.tag.as_ref() {
            if !want.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(want) = self.id.as_ref() {
            if attribute("id") != Some(want.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = attribute("class").unwrap_or_default();
            let has = |class: &Str| classes.split_whitespace().any(|c| c == class.as_str());
            if !self.classes.iter().all(has) {
                return false;
            }
        }
        true
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

fn is_sigil(c: char) -> bool {
    c == '.' || c == '#'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_compounds() {
        let sel = Selector::parse("button.inc.big#x").unwrap();
        assert_eq!(sel.tag, Some("button".into()));
        assert_eq!(sel.id, Some("x".into()));
        assert_eq!(sel.classes, vec![Str::from("inc"), Str::from("big")]);

        let sel: Selector = ".toggle".parse().unwrap();
        assert_eq!(sel.tag, None);
        assert_eq!(sel.classes, vec![Str::from("toggle")]);
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "div p", ".", "#a#b", "a..b", "di$v"] {
            assert!(Selector::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn matching() {
        let sel = Selector::parse("div.container").unwrap();
        let attrs = |class: &'static str| move |name: &str| (name == "class").then_some(class);
        assert!(sel.matches("div", attrs("container highlighted")));
        assert!(!sel.matches("div", attrs("highlighted")));
        assert!(!sel.matches("span", attrs("container")));
    }
}
