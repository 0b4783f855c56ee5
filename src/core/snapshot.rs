// In-memory ordered store loaded from a JSON snapshot; immutable once built.
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::core::collate::Collated;
use crate::core::error::{Error, ErrorKind};
use crate::core::path::{GlobalPath, normalize_global_name};
use crate::core::store::{Store, StoreSource};
use crate::core::value::Value;

#[derive(Debug, Default)]
struct TreeNode {
    value: Option<Value>,
    children: BTreeMap<Collated, TreeNode>,
}

#[derive(Deserialize)]
struct SnapshotFile {
    nodes: Vec<SnapshotNode>,
}

#[derive(Deserialize)]
struct SnapshotNode {
    global: String,
    #[serde(default)]
    subs: Vec<SubscriptRepr>,
    value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubscriptRepr {
    Text(String),
    Number(serde_json::Number),
}

impl SubscriptRepr {
    fn into_string(self) -> String {
        match self {
            SubscriptRepr::Text(text) => text,
            SubscriptRepr::Number(number) => number.to_string(),
        }
    }
}

/// Snapshot-backed store. Clones share one tree and act as separate handles.
#[derive(Clone, Debug, Default)]
pub struct SnapshotStore {
    globals: Arc<BTreeMap<String, TreeNode>>,
}

impl SnapshotStore {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read(path).map_err(|err| {
            let (kind, message) = match err.kind() {
                std::io::ErrorKind::NotFound => (ErrorKind::Store, "store snapshot does not exist"),
                _ => (ErrorKind::Io, "failed to read store snapshot"),
            };
            Error::new(kind)
                .with_message(message)
                .with_hint("Pass --store <path> or set VISTASCOPE_STORE to a snapshot file.")
                .with_path(path.display())
                .with_source(err)
        })?;
        let file: SnapshotFile = serde_json::from_slice(&raw).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("store snapshot is not valid JSON")
                .with_path(path.display())
                .with_source(err)
        })?;
        let mut builder = Builder::default();
        for node in file.nodes {
            let subs = node.subs.into_iter().map(SubscriptRepr::into_string).collect();
            builder.insert(&node.global, subs, Value::from(node.value))?;
        }
        let store = builder.finish();
        tracing::debug!(path = %path.display(), globals = store.globals.len(), "snapshot loaded");
        Ok(store)
    }

    pub fn from_entries<'a, I>(entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>, &'a str)>,
    {
        let mut builder = Builder::default();
        for (global, subs, value) in entries {
            let subs = subs.into_iter().map(str::to_string).collect();
            builder.insert(global, subs, Value::from(value))?;
        }
        Ok(builder.finish())
    }

    fn locate(&self, global: &str, subs: &[String]) -> Option<&TreeNode> {
        let mut node = self.globals.get(global)?;
        for sub in subs {
            node = node.children.get(&Collated(sub.clone()))?;
        }
        Some(node)
    }
}

#[derive(Default)]
struct Builder {
    globals: BTreeMap<String, TreeNode>,
}

impl Builder {
    fn insert(&mut self, global: &str, subs: Vec<String>, value: Value) -> Result<(), Error> {
        let path = GlobalPath::new(global)?;
        if subs.iter().any(String::is_empty) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("empty subscript in snapshot node")
                .with_path(GlobalPath::from_parts(global, subs)));
        }
        let mut node = self.globals.entry(normalize_global_name(global)).or_default();
        for sub in &subs {
            node = node.children.entry(Collated(sub.clone())).or_default();
        }
        if node.value.is_some() {
            let mut full = path;
            for sub in subs {
                full.push(sub);
            }
            return Err(Error::new(ErrorKind::Usage)
                .with_message("duplicate node in snapshot")
                .with_path(full));
        }
        node.value = Some(value);
        Ok(())
    }

    fn finish(self) -> SnapshotStore {
        SnapshotStore {
            globals: Arc::new(self.globals),
        }
    }
}

impl Store for SnapshotStore {
    fn read_value(&self, path: &GlobalPath) -> Result<Option<Value>, Error> {
        Ok(self
            .locate(path.global(), path.subscripts())
            .and_then(|node| node.value.clone()))
    }

    fn first_child(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        Ok(self
            .locate(path.global(), path.subscripts())
            .and_then(|node| node.children.keys().next())
            .map(|key| key.as_str().to_string()))
    }

    fn next_sibling(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        let Some((start, parent)) = path.subscripts().split_last() else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("next sibling needs at least one subscript")
                .with_path(path));
        };
        let Some(parent) = self.locate(path.global(), parent) else {
            return Ok(None);
        };
        let next = if start.is_empty() {
            parent.children.keys().next()
        } else {
            parent
                .children
                .range((Bound::Excluded(Collated(start.clone())), Bound::Unbounded))
                .next()
                .map(|(key, _)| key)
        };
        Ok(next.map(|key| key.as_str().to_string()))
    }
}

impl StoreSource for SnapshotStore {
    type Handle = SnapshotStore;

    fn open(&self) -> Result<Self::Handle, Error> {
        Ok(self.clone())
    }
}
