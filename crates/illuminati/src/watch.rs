//! First value mounts, later distinct values update, repeats do nothing.

/// What to do with an observed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change<T> {
    /// The first value ever observed.
    Mount(T),
    /// A value different from the previous one.
    Update(T),
}

impl<T> Change<T> {
    pub fn into_value(self) -> T {
        match self {
            Change::Mount(t) | Change::Update(t) => t,
        }
    }
}

/// Remembers the last observed value of something the engine keeps in sync
/// with the page.
#[derive(Clone, Debug)]
pub struct Watch<T> {
    last: Option<T>,
}

impl<T> Default for Watch<T> {
    fn default() -> Self {
        Watch { last: None }
    }
}

impl<T: PartialEq + Clone> Watch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `value`, returning the change to apply if there is one.
    pub fn observe(&mut self, value: T) -> Option<Change<T>> {
        match self.last.as_ref() {
            None => {
                self.last = Some(value.clone());
                Some(Change::Mount(value))
            }
            Some(last) if *last == value => None,
            Some(_) => {
                self.last = Some(value.clone());
                Some(Change::Update(value))
            }
        }
    }

    /// Forget everything observed, the next value mounts again.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mount_then_distinct_updates() {
        let mut watch = Watch::new();
        let changes = [false, true, true, false]
            .into_iter()
            .map(|v| watch.observe(v))
            .collect::<Vec<_>>();
        assert_eq!(
            changes,
            vec![
                Some(Change::Mount(false)),
                Some(Change::Update(true)),
                None,
                Some(Change::Update(false)),
            ]
        );
        assert_eq!(watch.observe(false), None);
    }

    #[test]
    fn reset_mounts_again() {
        let mut watch = Watch::new();
        assert_eq!(watch.observe("a"), Some(Change::Mount("a")));
        assert_eq!(watch.observe("a"), None);
        watch.reset();
        assert_eq!(watch.observe("a"), Some(Change::Mount("a")));
    }
}
