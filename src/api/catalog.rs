// FileMan file catalog under `^DIC`: file number, name and global root, and
// the reverse view from each global root to the files stored in it.
use std::collections::BTreeMap;

use serde::Serialize;

use super::entity::{EntityFile, read_optional};
use crate::core::error::{Error, ErrorKind};
use crate::core::path::normalize_global_name;
use crate::core::piece::get_piece;
use crate::core::store::Store;

pub const FILE_CATALOG: EntityFile = EntityFile::new("^DIC", &[]);

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileEntry {
    pub number: String,
    pub name: String,
    /// Open global root such as `^DPT(`; empty when the GL node is missing.
    pub global_root: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileListing {
    pub files: Vec<FileEntry>,
    pub truncated: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileRef {
    pub number: String,
    pub name: String,
}

/// One global root and the files the data dictionary places under it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GlobalEntry {
    pub global: String,
    pub files: Vec<FileRef>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GlobalListing {
    pub globals: Vec<GlobalEntry>,
    pub truncated: bool,
}

fn file_name<S: Store + ?Sized>(store: &S, number: &str) -> Option<String> {
    match FILE_CATALOG.zero_node(store, number) {
        Ok(Some(zero)) => {
            let text = zero.text();
            Some(get_piece(Some(text.as_ref()), 1).to_string())
        }
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(file = %number, error = %err, "file header unreadable; skipping");
            None
        }
    }
}

fn global_root<S: Store + ?Sized>(store: &S, number: &str) -> String {
    let root_path = FILE_CATALOG.entry(number).child("0").child("GL");
    read_optional(store, &root_path)
        .map(|value| value.text().trim().to_string())
        .unwrap_or_default()
}

/// Files whose name starts with `name_prefix`, in file-number order.
///
/// An unreadable zero node skips that file; the listing goes on.
pub fn list_files<S: Store + ?Sized>(store: &S, name_prefix: &str, limit: usize) -> Result<FileListing, Error> {
    if limit == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message("limit must be at least 1"));
    }
    let mut files = Vec::new();
    let mut truncated = false;
    for number in FILE_CATALOG.ids_after(store, "") {
        let number = number?;
        let Some(name) = file_name(store, &number) else {
            continue;
        };
        if !name.starts_with(name_prefix) {
            continue;
        }
        if files.len() == limit {
            truncated = true;
            break;
        }
        let global_root = global_root(store, &number);
        files.push(FileEntry {
            number,
            name,
            global_root,
        });
    }
    Ok(FileListing { files, truncated })
}

/// Global roots named by the data dictionary (`^DIC(n,0,"GL")`), each with the
/// files stored under it, sorted by global name.
///
/// Files without a usable root are left out. `global_prefix` gets a leading
/// `^` when it lacks one; an empty prefix matches every global.
pub fn list_globals<S: Store + ?Sized>(
    store: &S,
    global_prefix: &str,
    limit: usize,
) -> Result<GlobalListing, Error> {
    if limit == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message("limit must be at least 1"));
    }
    let prefix = if global_prefix.trim().is_empty() {
        String::new()
    } else {
        normalize_global_name(global_prefix)
    };
    let mut by_global: BTreeMap<String, Vec<FileRef>> = BTreeMap::new();
    for number in FILE_CATALOG.ids_after(store, "") {
        let number = number?;
        let root = global_root(store, &number);
        if !root.starts_with('^') {
            continue;
        }
        let global = root.split('(').next().unwrap_or(root.as_str()).to_string();
        if !global.starts_with(prefix.as_str()) {
            continue;
        }
        let name = file_name(store, &number).unwrap_or_else(|| "(unknown file name)".to_string());
        let files = by_global.entry(global).or_default();
        if !files.iter().any(|file| file.number == number) {
            files.push(FileRef { number, name });
        }
    }
    let truncated = by_global.len() > limit;
    let globals = by_global
        .into_iter()
        .take(limit)
        .map(|(global, files)| GlobalEntry { global, files })
        .collect();
    Ok(GlobalListing { globals, truncated })
}
