// Allowlisted, bounded and redacting traversal over a read-only store.
use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::path::{GlobalPath, normalize_global_name};
use crate::core::store::Store;
use crate::core::value::{NO_VALUE, Value};

pub const DEFAULT_ALLOWLIST: [&str; 4] = ["^DIC", "^DPT", "^VA", "^XWB"];
pub const DEFAULT_SENSITIVE: [&str; 2] = ["^DPT", "^VA"];

/// Lazy ordered sequence of the subscripts directly below `parent`.
///
/// Each step is one next-sibling call; nothing is read ahead.
pub struct Children<'s, S: ?Sized> {
    store: &'s S,
    parent: GlobalPath,
    cursor: Option<String>,
    pending: Option<String>,
    done: bool,
}

impl<'s, S: Store + ?Sized> Children<'s, S> {
    pub fn new(store: &'s S, parent: GlobalPath) -> Self {
        Self {
            store,
            parent,
            cursor: None,
            pending: None,
            done: false,
        }
    }

    /// Restart strictly after `sub`.
    pub fn after(store: &'s S, parent: GlobalPath, sub: impl Into<String>) -> Self {
        Self {
            cursor: Some(sub.into()),
            ..Self::new(store, parent)
        }
    }

    /// Restart at `sub` itself when it exists, otherwise at the next one.
    pub fn starting_at(store: &'s S, parent: GlobalPath, sub: impl Into<String>) -> Self {
        Self {
            pending: Some(sub.into()),
            ..Self::new(store, parent)
        }
    }

    fn step(&mut self) -> Result<Option<String>, Error> {
        if let Some(first) = self.pending.take() {
            let exists = !first.is_empty() && self.store.data(&self.parent.child(first.as_str()))?.exists();
            self.cursor = Some(first.clone());
            if exists {
                return Ok(Some(first));
            }
        }
        let next = match &self.cursor {
            None => self.store.first_child(&self.parent)?,
            Some(cursor) => self.store.next_sibling(&self.parent.child(cursor.as_str()))?,
        };
        if let Some(sub) = &next {
            self.cursor = Some(sub.clone());
        }
        Ok(next)
    }
}

impl<S: Store + ?Sized> Iterator for Children<'_, S> {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(sub)) => Some(Ok(sub)),
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

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Policy {
    allowlist: BTreeSet<String>,
    sensitive: BTreeSet<String>,
}

impl Policy {
    pub fn new<A, B>(allowlist: A, sensitive: B) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        B: IntoIterator,
        B::Item: AsRef<str>,
    {
        Self {
            allowlist: allowlist
                .into_iter()
                .map(|name| normalize_global_name(name.as_ref()))
                .collect(),
            sensitive: sensitive
                .into_iter()
                .map(|name| normalize_global_name(name.as_ref()))
                .collect(),
        }
    }

    pub fn allow(mut self, global: &str) -> Self {
        self.allowlist.insert(normalize_global_name(global));
        self
    }

    pub fn is_allowed(&self, global: &str) -> bool {
        self.allowlist.contains(&normalize_global_name(global))
    }

    pub fn is_sensitive(&self, global: &str) -> bool {
        self.sensitive.contains(&normalize_global_name(global))
    }

    pub fn allowlist(&self) -> impl Iterator<Item = &str> {
        self.allowlist.iter().map(String::as_str)
    }

    pub fn check(&self, path: &GlobalPath) -> Result<(), Error> {
        if self.is_allowed(path.global()) {
            return Ok(());
        }
        let allowed = self.allowlist().collect::<Vec<_>>().join(", ");
        Err(Error::new(ErrorKind::Policy)
            .with_message(format!("blocked by allowlist policy: {}", path.global()))
            .with_hint(format!("Allowed set: {allowed}")))
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWLIST, DEFAULT_SENSITIVE)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DisplayOptions {
    /// Show escaped bytes instead of decoded text.
    pub raw: bool,
    /// Opt in to real content for sensitive roots.
    pub include_sensitive: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NodeView {
    pub path: String,
    pub display: String,
    pub has_value: bool,
    pub has_subtree: bool,
    pub redacted: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChildEntry {
    pub subscript: String,
    pub path: String,
    pub display: String,
    pub has_value: bool,
    pub has_subtree: bool,
    pub redacted: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Listing {
    pub path: String,
    pub entries: Vec<ChildEntry>,
    pub truncated: bool,
    pub max_nodes: usize,
}

/// Structural summary shown in place of sensitive content.
pub fn redact_text(text: &str) -> String {
    let chars = text.chars().count();
    let pieces = if text.is_empty() {
        0
    } else {
        text.matches('^').count() + 1
    };
    format!("<redacted: {chars} chars, {pieces} piece(s)>")
}

pub struct SafeReader<S> {
    store: S,
    policy: Policy,
}

impl<S: Store> SafeReader<S> {
    pub fn new(store: S, policy: Policy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn render(&self, path: &GlobalPath, value: Option<&Value>, options: DisplayOptions) -> (String, bool) {
        let Some(value) = value else {
            return (NO_VALUE.to_string(), false);
        };
        if self.policy.is_sensitive(path.global()) && !options.include_sensitive {
            return (redact_text(&value.text()), true);
        }
        (value.display(options.raw), false)
    }

    pub fn read_node(&self, path: &GlobalPath, options: DisplayOptions) -> Result<NodeView, Error> {
        self.policy.check(path)?;
        let node = self.store.node(path)?;
        let (display, redacted) = self.render(path, node.value.as_ref(), options);
        Ok(NodeView {
            path: path.to_string(),
            display,
            has_value: node.has_value,
            has_subtree: node.has_subtree,
            redacted,
        })
    }

    pub fn list_children(
        &self,
        path: &GlobalPath,
        max_nodes: usize,
        options: DisplayOptions,
    ) -> Result<Listing, Error> {
        if max_nodes == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("max nodes must be at least 1")
                .with_path(path));
        }
        self.policy.check(path)?;
        tracing::debug!(path = %path, max_nodes, "listing children");

        let mut entries = Vec::new();
        let mut truncated = false;
        for sub in Children::new(&self.store, path.clone()) {
            let sub = sub?;
            if entries.len() == max_nodes {
                truncated = true;
                break;
            }
            let child = path.child(sub.as_str());
            let node = self.store.node(&child)?;
            let (display, redacted) = self.render(&child, node.value.as_ref(), options);
            entries.push(ChildEntry {
                subscript: sub,
                path: child.to_string(),
                display,
                has_value: node.has_value,
                has_subtree: node.has_subtree,
                redacted,
            });
        }

        Ok(Listing {
            path: path.to_string(),
            entries,
            truncated,
            max_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Children, DisplayOptions, Policy, SafeReader, redact_text};
    use crate::core::error::ErrorKind;
    use crate::core::path::GlobalPath;
    use crate::core::snapshot::SnapshotStore;
    use crate::core::store::testing::CountingStore;

    fn store() -> SnapshotStore {
        SnapshotStore::from_entries([
            ("^DPT", vec!["1", "0"], "SMITH,JOHN^M^2660512^^^^^^123456789"),
            ("^DPT", vec!["2", "0"], "DOE,JANE^F^2700101"),
            ("^DPT", vec!["3", "0"], "ROE,RICHARD^M"),
            ("^DIC", vec!["2", "0"], "PATIENT^2"),
            ("^DIC", vec!["200", "0"], "NEW PERSON^200"),
            ("^SECRET", vec!["1"], "x"),
        ])
        .expect("store")
    }

    fn path(global: &str, subs: &[&str]) -> GlobalPath {
        GlobalPath::from_parts(global, subs.iter().copied())
    }

    #[test]
    fn blocked_root_makes_zero_store_calls() {
        let counting = CountingStore::new(store());
        let reader = SafeReader::new(&counting, Policy::default());
        let target = path("SECRET", &[]);

        let err = reader
            .list_children(&target, 5, DisplayOptions::default())
            .expect_err("blocked");
        assert_eq!(err.kind(), ErrorKind::Policy);
        let err = reader
            .read_node(&target, DisplayOptions::default())
            .expect_err("blocked");
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert_eq!(counting.calls.get(), 0);
    }

    #[test]
    fn truncation_is_flagged_only_when_more_remain() {
        let reader = SafeReader::new(store(), Policy::default());
        let root = path("^DPT", &[]);

        let listing = reader
            .list_children(&root, 2, DisplayOptions::default())
            .expect("list");
        assert_eq!(listing.entries.len(), 2);
        assert!(listing.truncated);

        for k in [3, 10] {
            let listing = reader
                .list_children(&root, k, DisplayOptions::default())
                .expect("list");
            assert_eq!(listing.entries.len(), 3);
            assert!(!listing.truncated);
        }
    }

    #[test]
    fn zero_max_nodes_is_usage_error() {
        let reader = SafeReader::new(store(), Policy::default());
        let err = reader
            .list_children(&path("^DPT", &[]), 0, DisplayOptions::default())
            .expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn sensitive_roots_are_redacted_unless_opted_in() {
        let reader = SafeReader::new(store(), Policy::default());
        let node = path("^DPT", &["1", "0"]);

        let hidden = reader.read_node(&node, DisplayOptions::default()).expect("read");
        assert!(hidden.redacted);
        assert_eq!(hidden.display, "<redacted: 35 chars, 9 piece(s)>");
        assert!(!hidden.display.contains("SMITH"));

        let shown = reader
            .read_node(
                &node,
                DisplayOptions {
                    include_sensitive: true,
                    ..DisplayOptions::default()
                },
            )
            .expect("read");
        assert!(!shown.redacted);
        assert!(shown.display.starts_with("SMITH,JOHN"));

        let public = reader
            .read_node(&path("^DIC", &["2", "0"]), DisplayOptions::default())
            .expect("read");
        assert_eq!(public.display, "PATIENT^2");
    }

    #[test]
    fn redaction_keeps_structural_counts() {
        let reader = SafeReader::new(store(), Policy::default());
        let listing = reader
            .list_children(&path("^DPT", &[]), 10, DisplayOptions::default())
            .expect("list");
        let subs: Vec<_> = listing.entries.iter().map(|e| e.subscript.as_str()).collect();
        assert_eq!(subs, vec!["1", "2", "3"]);
        assert!(listing.entries.iter().all(|e| e.has_subtree && !e.has_value));
        assert_eq!(redact_text(""), "<redacted: 0 chars, 0 piece(s)>");
        assert_eq!(redact_text("A^B"), "<redacted: 3 chars, 2 piece(s)>");
    }

    #[test]
    fn absent_value_is_not_redacted() {
        let reader = SafeReader::new(store(), Policy::default());
        let view = reader
            .read_node(&path("^DPT", &["1"]), DisplayOptions::default())
            .expect("read");
        assert_eq!(view.display, "<no value>");
        assert!(!view.redacted);
    }

    #[test]
    fn policy_normalizes_and_extends() {
        let policy = Policy::default().allow("SECRET");
        assert!(policy.is_allowed("^SECRET"));
        assert!(policy.is_allowed("DPT"));
        assert!(policy.is_sensitive("VA"));
        assert!(!policy.is_sensitive("^DIC"));
    }

    #[test]
    fn children_restart_after_and_at() {
        let store = store();
        let root = path("^DPT", &[]);
        let after: Vec<_> = Children::after(&store, root.clone(), "1")
            .collect::<Result<_, _>>()
            .expect("after");
        assert_eq!(after, vec!["2", "3"]);
        let at: Vec<_> = Children::starting_at(&store, root.clone(), "2")
            .collect::<Result<_, _>>()
            .expect("at");
        assert_eq!(at, vec!["2", "3"]);
        let missing: Vec<_> = Children::starting_at(&store, root, "1.5")
            .collect::<Result<_, _>>()
            .expect("missing");
        assert_eq!(missing, vec!["2", "3"]);
    }
}
