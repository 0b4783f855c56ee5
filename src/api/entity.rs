//! Purpose: Generic FileMan entity-file primitives shared by every resolver.
//! Exports: `EntityFile`, `EntityIds`, `Page`, `read_multi_line_field`, `read_optional`.
//! Role: Builds identifier paging and secondary-field reads on the store client.
//! Invariants: Paging is forward-only and lazy; the identifier set is never materialized.
//! Invariants: Identifiers are canonical numbers; the first non-numeric subscript ends a scan.
use serde::Serialize;

use crate::core::collate::is_canonical_number;
use crate::core::error::{Error, ErrorKind};
use crate::core::path::GlobalPath;
use crate::core::piece::decode_multi_line;
use crate::core::store::Store;
use crate::core::value::Value;

/// Location of a FileMan file: a global plus the subscripts above the entries
/// (`^DPT(ien,...)` has none, `^VA(200,ien,...)` has `200`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EntityFile {
    global: &'static str,
    file_subs: &'static [&'static str],
}

impl EntityFile {
    pub const fn new(global: &'static str, file_subs: &'static [&'static str]) -> Self {
        Self { global, file_subs }
    }

    pub fn base(&self) -> GlobalPath {
        GlobalPath::from_parts(self.global, self.file_subs.iter().copied())
    }

    pub fn entry(&self, ien: &str) -> GlobalPath {
        self.base().child(ien)
    }

    /// Entry zero node; an empty value counts as absent.
    pub fn zero_node<S: Store + ?Sized>(&self, store: &S, ien: &str) -> Result<Option<Value>, Error> {
        let value = store.read_value(&self.entry(ien).child("0"))?;
        Ok(value.filter(|value| !value.is_empty()))
    }

    /// Next identifier strictly after `ien`, or `None` at the end of the entries.
    pub fn next_after<S: Store + ?Sized>(&self, store: &S, ien: &str) -> Result<Option<String>, Error> {
        let next = store.next_sibling(&self.entry(ien))?;
        Ok(next.filter(|sub| is_canonical_number(sub)))
    }

    pub fn ids_after<'s, S: Store + ?Sized>(&self, store: &'s S, ien: &str) -> EntityIds<'s, S> {
        EntityIds {
            file: *self,
            store,
            cursor: ien.to_string(),
            done: false,
        }
    }

    /// Reads up to `limit` entries after `after`, skipping identifiers without a
    /// zero node, decoding each with `decode`.
    pub fn page<S, T, F>(&self, store: &S, after: &str, limit: usize, mut decode: F) -> Result<Page<T>, Error>
    where
        S: Store + ?Sized,
        F: FnMut(&str, &Value) -> T,
    {
        if limit == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("page size must be at least 1")
                .with_path(self.base()));
        }
        let mut items = Vec::new();
        let mut last = None;
        let mut exhausted = true;
        for ien in self.ids_after(store, after) {
            let ien = ien?;
            if items.len() == limit {
                exhausted = false;
                break;
            }
            if let Some(zero) = self.zero_node(store, &ien)? {
                items.push(decode(&ien, &zero));
            } else {
                tracing::debug!(file = %self.base(), ien = %ien, "entry has no zero node");
            }
            last = Some(ien);
        }
        Ok(Page {
            items,
            last,
            exhausted,
        })
    }
}

/// Lazy forward sequence of identifiers; one next-sibling call per step.
pub struct EntityIds<'s, S: ?Sized> {
    file: EntityFile,
    store: &'s S,
    cursor: String,
    done: bool,
}

impl<S: Store + ?Sized> Iterator for EntityIds<'_, S> {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.file.next_after(self.store, &self.cursor) {
            Ok(Some(ien)) => {
                self.cursor = ien.clone();
                Some(Ok(ien))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Last identifier examined; resume with it as the next `after`.
    pub last: Option<String>,
    /// True when the scan reached the end of the entries.
    pub exhausted: bool,
}

/// Best-effort read of a secondary node. Faults are logged and yield `None`.
pub fn read_optional<S: Store + ?Sized>(store: &S, path: &GlobalPath) -> Option<Value> {
    match store.read_value(path) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "secondary field unreadable; using default");
            None
        }
    }
}

/// Multi-line field at `field`: header at `(field,0)`, lines at `(field,n,0)`.
pub fn read_multi_line_field<S: Store + ?Sized>(store: &S, field: &GlobalPath) -> Vec<String> {
    let header = read_optional(store, &field.child("0")).map(|value| value.text().into_owned());
    decode_multi_line(header.as_deref(), |line_no| {
        let line = store.read_value(&field.child(line_no.to_string()).child("0"))?;
        Ok(line.map(|value| value.text().trim_end().to_string()))
    })
}
