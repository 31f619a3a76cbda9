// Option-string seam passed through to the foreign query calls.
use std::fmt::Display;

/// Anything that can render itself as the module's `Key=Value,...` option
/// string. Queries accept `None` to mean no options.
pub trait OptionString {
    fn option_string(&self) -> String;
}

/// Generic keyed option list. Setting a key that is already present replaces
/// the earlier entry, so chained builders stay last-write-wins.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    entries: Vec<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Display) -> Self {
        let entry = format!("{key}={value}");
        let prefix = format!("{key}=");
        match self.entries.iter().position(|e| e.starts_with(&prefix)) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OptionString for QueryOptions {
    fn option_string(&self) -> String {
        self.entries.join(",")
    }
}
