// Global references: a normalized global name plus ordered string subscripts.
use std::fmt;

use serde::Serialize;

use crate::core::collate::is_canonical_number;
use crate::core::error::{Error, ErrorKind};

/// Adds the leading `^` when missing (`DPT` -> `^DPT`).
pub fn normalize_global_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with('^') {
        trimmed.to_string()
    } else {
        format!("^{trimmed}")
    }
}

fn validate_global_name(name: &str) -> Result<(), Error> {
    let body = name.strip_prefix('^').unwrap_or(name);
    let mut chars = body.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first == '%' || first.is_ascii_alphabetic()) && chars.all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid global name: {name}"))
            .with_hint("Global names are letters/digits, optionally starting with % (e.g. ^DPT)."))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct GlobalPath {
    global: String,
    subs: Vec<String>,
}

impl GlobalPath {
    pub fn new(global: &str) -> Result<Self, Error> {
        let global = normalize_global_name(global);
        validate_global_name(&global)?;
        Ok(Self {
            global,
            subs: Vec::new(),
        })
    }

    /// Builds a path from constants known to be well formed.
    pub(crate) fn from_parts<I, S>(global: &str, subs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            global: normalize_global_name(global),
            subs: subs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn global(&self) -> &str {
        &self.global
    }

    pub fn subscripts(&self) -> &[String] {
        &self.subs
    }

    pub fn depth(&self) -> usize {
        self.subs.len()
    }

    pub fn last(&self) -> Option<&str> {
        self.subs.last().map(String::as_str)
    }

    pub fn child(&self, sub: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.subs.push(sub.into());
        next
    }

    pub fn push(&mut self, sub: impl Into<String>) {
        self.subs.push(sub.into());
    }

    pub fn parent(&self) -> Option<Self> {
        if self.subs.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.subs.pop();
        Some(parent)
    }

    /// Same level, different final subscript.
    pub fn sibling(&self, sub: impl Into<String>) -> Option<Self> {
        self.parent().map(|parent| parent.child(sub))
    }
}

impl fmt::Display for GlobalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.global)?;
        if self.subs.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (idx, sub) in self.subs.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            if is_canonical_number(sub) {
                f.write_str(sub)?;
            } else {
                write!(f, "\"{}\"", sub.replace('"', "\"\""))?;
            }
        }
        f.write_str(")")
    }
}
