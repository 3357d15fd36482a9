//! Engine configuration.
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When queued operations are applied to the page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Right after the emission that queued them.
    #[default]
    Immediate,
    /// On the next call to [`Engine::flush`](crate::engine::Engine::flush).
    ///
    /// The web backend flushes once per animation frame.
    NextFrame,
}

/// How a collection's page nodes follow the order of its items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionOrdering {
    /// Only additions and removals touch the page. New items are appended
    /// after the existing ones and existing items never move.
    #[default]
    AddRemove,
    /// Page order always follows the latest emission. Moves are kept to a
    /// minimum.
    Reorder,
}

/// Receives errors the engine can't report to a caller.
#[derive(Clone)]
pub struct ErrorHandler(Rc<dyn Fn(&Error)>);

impl ErrorHandler {
    pub fn new(f: impl Fn(&Error) + 'static) -> Self {
        ErrorHandler(Rc::new(f))
    }

    pub fn handle(&self, err: &Error) {
        (self.0)(err)
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        ErrorHandler::new(|err| log::error!("{err}"))
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ErrorHandler")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule: Schedule,
    pub ordering: CollectionOrdering,
    #[serde(skip)]
    pub error_handler: ErrorHandler,
}

impl Config {
    /// Read a configuration from JSON. Missing fields take their defaults.
    ///
    /// ```rust
    /// use illuminati::config::{Config, Schedule};
    ///
    /// let config = Config::from_json(r#"{"schedule": "next_frame"}"#).unwrap();
    /// assert_eq!(config.schedule, Schedule::NextFrame);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config {
            message: e.to_string().into(),
        })
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_ordering(mut self, ordering: CollectionOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_error_handler(mut self, f: impl Fn(&Error) + 'static) -> Self {
        self.error_handler = ErrorHandler::new(f);
        self
    }
}
