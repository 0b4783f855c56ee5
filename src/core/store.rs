// Store client contract: the read-only primitives the rest of the crate is built on.
use std::time::Instant;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::path::GlobalPath;
use crate::core::value::Value;

/// `$DATA`-style shape of a node.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct NodeData {
    pub has_value: bool,
    pub has_subtree: bool,
}

impl NodeData {
    pub fn exists(self) -> bool {
        self.has_value || self.has_subtree
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub path: GlobalPath,
    pub value: Option<Value>,
    pub has_value: bool,
    pub has_subtree: bool,
}

/// Read-only handle to a hierarchical store.
///
/// A handle serves one caller at a time; concurrent callers open their own
/// handles through a [`StoreSource`]. Dropping the handle releases it.
pub trait Store {
    /// Value stored at `path`, `None` when the node holds no value.
    fn read_value(&self, path: &GlobalPath) -> Result<Option<Value>, Error>;

    /// Lowest subscript directly below `path` in collation order.
    fn first_child(&self, path: &GlobalPath) -> Result<Option<String>, Error>;

    /// Next subscript strictly after the last subscript of `path`, at the same
    /// level. The start subscript need not exist; an empty start subscript
    /// means "before the first child".
    fn next_sibling(&self, path: &GlobalPath) -> Result<Option<String>, Error>;

    fn data(&self, path: &GlobalPath) -> Result<NodeData, Error> {
        Ok(NodeData {
            has_value: self.read_value(path)?.is_some(),
            has_subtree: self.first_child(path)?.is_some(),
        })
    }

    fn node(&self, path: &GlobalPath) -> Result<Node, Error> {
        let value = self.read_value(path)?;
        let has_subtree = self.first_child(path)?.is_some();
        Ok(Node {
            path: path.clone(),
            has_value: value.is_some(),
            value,
            has_subtree,
        })
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn read_value(&self, path: &GlobalPath) -> Result<Option<Value>, Error> {
        (**self).read_value(path)
    }

    fn first_child(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        (**self).first_child(path)
    }

    fn next_sibling(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        (**self).next_sibling(path)
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn read_value(&self, path: &GlobalPath) -> Result<Option<Value>, Error> {
        (**self).read_value(path)
    }

    fn first_child(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        (**self).first_child(path)
    }

    fn next_sibling(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        (**self).next_sibling(path)
    }
}

/// Hands out independent store handles (a connection pool boundary).
pub trait StoreSource: Send + Sync {
    type Handle: Store + Send + 'static;

    fn open(&self) -> Result<Self::Handle, Error>;
}

/// Fails every call issued after `deadline` with a Timeout error.
///
/// Calls are blocking, so a call already in flight is not interrupted; the
/// bound applies from the next call on. Callers that must return on time run
/// the wrapped handle on a worker thread and stop waiting at the deadline.
#[derive(Debug)]
pub struct DeadlineStore<S> {
    inner: S,
    deadline: Instant,
}

impl<S: Store> DeadlineStore<S> {
    pub fn new(inner: S, deadline: Instant) -> Self {
        Self { inner, deadline }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn check(&self, path: &GlobalPath) -> Result<(), Error> {
        if Instant::now() >= self.deadline {
            return Err(Error::new(ErrorKind::Timeout)
                .with_message("store call deadline exceeded")
                .with_path(path));
        }
        Ok(())
    }
}

impl<S: Store> Store for DeadlineStore<S> {
    fn read_value(&self, path: &GlobalPath) -> Result<Option<Value>, Error> {
        self.check(path)?;
        self.inner.read_value(path)
    }

    fn first_child(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        self.check(path)?;
        self.inner.first_child(path)
    }

    fn next_sibling(&self, path: &GlobalPath) -> Result<Option<String>, Error> {
        self.check(path)?;
        self.inner.next_sibling(path)
    }
}
