//! Macro tables and `$(KEY)` substitution.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use smol_str::SmolStr;

/// Ordered `KEY -> VALUE` table parsed from a `K1=V1,K2=V2` macro string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    entries: IndexMap<SmolStr, SmolStr>,
}

/// Result of substituting macros into one text value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted<'a> {
    pub text: Cow<'a, str>,
    /// Text holds a placeholder but no table is bound; callers must leave
    /// the original text untouched.
    pub cannot_proceed: bool,
}

impl MacroTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a macro string. Keys are trimmed, values are kept verbatim and
    /// pairs without `=` or with an empty key are dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut entries = IndexMap::new();
        for pair in text.split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            entries.insert(SmolStr::new(key), SmolStr::new(value));
        }
        Self { entries }
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries
            .insert(SmolStr::new(key.trim()), SmolStr::new(value));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(SmolStr::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replaces every `$(KEY)` in `text` with its value. Placeholders whose
    /// key is missing from a non-empty table are left in place.
    #[must_use]
    pub fn substitute<'a>(&self, text: &'a str) -> Substituted<'a> {
        if self.entries.is_empty() {
            return Substituted {
                text: Cow::Borrowed(text),
                cannot_proceed: text.contains('$'),
            };
        }
        if !(text.contains("$(") && text.contains(')')) {
            return Substituted {
                text: Cow::Borrowed(text),
                cannot_proceed: false,
            };
        }
        let mut out = text.to_string();
        for (key, value) in &self.entries {
            let placeholder = format!("$({key})");
            if out.contains(&placeholder) {
                out = out.replace(&placeholder, value);
            }
        }
        Substituted {
            text: Cow::Owned(out),
            cannot_proceed: false,
        }
    }

    /// Substitutes and falls back to the original text when substitution
    /// cannot proceed.
    #[must_use]
    pub fn expand<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let substituted = self.substitute(text);
        if substituted.cannot_proceed {
            Cow::Borrowed(text)
        } else {
            substituted.text
        }
    }
}

impl fmt::Display for MacroTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (key, value)) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
