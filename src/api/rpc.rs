//! Purpose: Resolve remote procedure definitions from the REMOTE PROCEDURE file (#8994).
//! Exports: `RpcResolver`, `RpcDefinition`, `RpcParameter`, `return_type_label`.
//! Role: Name lookups go through the `"B"` cross-reference, then decode the entry.
//! Invariants: Zero node missing or no index match is NotFound; a fault there propagates.
//! Invariants: Description and parameter lines are secondary; their faults only drop lines.
//! Notes: Prefix listing seeks into the index instead of filtering every name.
use serde::Serialize;

use super::entity::{EntityFile, read_multi_line_field};
use crate::core::error::{Error, ErrorKind};
use crate::core::path::GlobalPath;
use crate::core::piece::get_piece;
use crate::core::store::Store;
use crate::core::traverse::Children;

pub const RPC_FILE: EntityFile = EntityFile::new("^XWB", &["8994"]);
pub const NO_DESCRIPTION: &str = "(no description)";
pub const NO_ENTRY_POINT: &str = "(not specified)";

const DESCRIPTION_FIELD: &str = "1";
const PARAMETER_FIELD: &str = "2";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RpcParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub length: String,
    pub required: bool,
    /// The undecoded parameter line.
    pub definition: String,
}

impl RpcParameter {
    fn from_line(line: &str) -> Self {
        let raw = Some(line);
        Self {
            name: get_piece(raw, 1).to_string(),
            kind: get_piece(raw, 2).to_string(),
            length: get_piece(raw, 3).to_string(),
            required: get_piece(raw, 4) == "1",
            definition: line.to_string(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RpcDefinition {
    pub ien: String,
    pub name: String,
    pub tag: String,
    pub routine: String,
    pub return_type_code: String,
    pub return_type: String,
    pub entry_point: String,
    pub description: String,
    pub parameters: Vec<RpcParameter>,
}

pub fn return_type_label(code: &str) -> String {
    match code {
        "1" => "Single Value".to_string(),
        "2" => "Array".to_string(),
        "3" => "Global".to_string(),
        "4" => "Word Processing".to_string(),
        other => format!("Type {other}"),
    }
}

fn entry_point(tag: &str, routine: &str) -> String {
    if tag.is_empty() || routine.is_empty() {
        NO_ENTRY_POINT.to_string()
    } else {
        format!("DO {tag}^{routine}")
    }
}

/// Prefixes that could match canonical-number names cannot seek: numbers
/// collate before strings, so those names are not contiguous.
fn can_seek(prefix: &str) -> bool {
    match prefix.as_bytes().first() {
        None => false,
        Some(first) => !(first.is_ascii_digit() || *first == b'-' || *first == b'.'),
    }
}

pub struct RpcResolver<S> {
    store: S,
}

impl<S: Store> RpcResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn name_index(&self) -> GlobalPath {
        RPC_FILE.base().child("B")
    }

    fn first_ien_for(&self, name: &str) -> Result<Option<String>, Error> {
        self.store.first_child(&self.name_index().child(name))
    }

    pub fn find_by_name(&self, name: &str) -> Result<RpcDefinition, Error> {
        match self.first_ien_for(name)? {
            Some(ien) => self.definition(&ien),
            None => Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("remote procedure {name:?} not found"))
                .with_path(self.name_index().child(name))),
        }
    }

    pub fn definition(&self, ien: &str) -> Result<RpcDefinition, Error> {
        let Some(zero) = RPC_FILE.zero_node(&self.store, ien)? else {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("remote procedure entry {ien} not found"))
                .with_path(RPC_FILE.entry(ien).child("0")));
        };
        let text = zero.text();
        let zero = Some(text.as_ref());
        let tag = get_piece(zero, 2).to_string();
        let routine = get_piece(zero, 3).to_string();
        let return_type_code = get_piece(zero, 4).to_string();

        let entry = RPC_FILE.entry(ien);
        let lines = read_multi_line_field(&self.store, &entry.child(DESCRIPTION_FIELD));
        let description = if lines.is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            lines.join("\n")
        };
        let parameters = read_multi_line_field(&self.store, &entry.child(PARAMETER_FIELD))
            .iter()
            .map(|line| RpcParameter::from_line(line))
            .collect();

        Ok(RpcDefinition {
            ien: ien.to_string(),
            name: get_piece(zero, 1).to_string(),
            entry_point: entry_point(&tag, &routine),
            return_type: return_type_label(&return_type_code),
            tag,
            routine,
            return_type_code,
            description,
            parameters,
        })
    }

    /// Definitions whose name starts with `prefix`, in index order, up to `limit`.
    pub fn list_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<RpcDefinition>, Error> {
        if limit == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("limit must be at least 1"));
        }
        let index = self.name_index();
        let seek = can_seek(prefix);
        let names = if seek {
            Children::starting_at(&self.store, index, prefix)
        } else {
            Children::new(&self.store, index)
        };

        let mut found = Vec::new();
        for name in names {
            let name = name?;
            if !name.starts_with(prefix) {
                if seek {
                    break;
                }
                continue;
            }
            let Some(ien) = self.first_ien_for(&name)? else {
                continue;
            };
            match self.definition(&ien) {
                Ok(def) => found.push(def),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    tracing::debug!(name = %name, ien = %ien, "index entry without definition");
                }
                Err(err) => return Err(err),
            }
            if found.len() >= limit {
                break;
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::{NO_DESCRIPTION, NO_ENTRY_POINT, RpcResolver, return_type_label};
    use crate::core::error::ErrorKind;
    use crate::core::snapshot::SnapshotStore;
    use crate::core::store::testing::{CountingStore, FaultyStore};

    fn store() -> SnapshotStore {
        SnapshotStore::from_entries([
            ("^XWB", vec!["8994", "1", "0"], "ORWPT SELECT^SELECT^ORWPT^2"),
            ("^XWB", vec!["8994", "1", "1", "0"], "^^2^2^3130101^"),
            ("^XWB", vec!["8994", "1", "1", "1", "0"], "Returns patient data."),
            ("^XWB", vec!["8994", "1", "1", "2", "0"], "Used at selection."),
            ("^XWB", vec!["8994", "1", "2", "0"], "^8994.02A^2^2"),
            ("^XWB", vec!["8994", "1", "2", "1", "0"], "DFN^1^30^1^1"),
            ("^XWB", vec!["8994", "1", "2", "2", "0"], "FLAGS^1^10^0^2"),
            ("^XWB", vec!["8994", "2", "0"], "ORWPT ID INFO^IDINFO^ORWPT^1"),
            ("^XWB", vec!["8994", "3", "0"], "XUS SIGNON SETUP^^XUSRB^7"),
            ("^XWB", vec!["8994", "B", "ORWPT ID INFO", "2"], ""),
            ("^XWB", vec!["8994", "B", "ORWPT SELECT", "1"], ""),
            ("^XWB", vec!["8994", "B", "ORWPT STALE", "99"], ""),
            ("^XWB", vec!["8994", "B", "XUS SIGNON SETUP", "3"], ""),
        ])
        .expect("store")
    }

    #[test]
    fn definition_decodes_zero_node_description_and_parameters() {
        let resolver = RpcResolver::new(store());
        let def = resolver.find_by_name("ORWPT SELECT").expect("rpc");
        assert_eq!(def.ien, "1");
        assert_eq!(def.entry_point, "DO SELECT^ORWPT");
        assert_eq!(def.return_type, "Array");
        assert_eq!(def.description, "Returns patient data.\nUsed at selection.");
        assert_eq!(def.parameters.len(), 2);
        assert_eq!(def.parameters[0].name, "DFN");
        assert_eq!(def.parameters[0].length, "30");
        assert!(def.parameters[0].required);
        assert!(!def.parameters[1].required);
    }

    #[test]
    fn sparse_definition_uses_placeholders() {
        let def = RpcResolver::new(store()).definition("3").expect("rpc");
        assert_eq!(def.description, NO_DESCRIPTION);
        assert_eq!(def.entry_point, NO_ENTRY_POINT);
        assert_eq!(def.return_type, "Type 7");
        assert!(def.parameters.is_empty());
        assert_eq!(return_type_label("4"), "Word Processing");
    }

    #[test]
    fn unknown_name_is_not_found() {
        let err = RpcResolver::new(store())
            .find_by_name("NO SUCH RPC")
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn description_fault_keeps_the_definition() {
        let faulty = FaultyStore::new(store(), &["^XWB(8994,1,1,"]);
        let def = RpcResolver::new(faulty).definition("1").expect("rpc");
        assert_eq!(def.description, NO_DESCRIPTION);
        assert_eq!(def.parameters.len(), 2);
    }

    #[test]
    fn zero_node_fault_propagates() {
        let faulty = FaultyStore::new(store(), &["^XWB(8994,1,0)"]);
        let err = RpcResolver::new(faulty).definition("1").expect_err("fault");
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn prefix_listing_seeks_and_skips_dangling_entries() {
        let resolver = RpcResolver::new(store());
        let names: Vec<_> = resolver
            .list_by_prefix("ORWPT", 10)
            .expect("list")
            .into_iter()
            .map(|def| def.name)
            .collect();
        assert_eq!(names, vec!["ORWPT ID INFO", "ORWPT SELECT"]);

        let limited = resolver.list_by_prefix("ORWPT", 1).expect("list");
        assert_eq!(limited.len(), 1);
        assert_eq!(resolver.list_by_prefix("", 10).expect("list").len(), 3);
        assert_eq!(
            resolver.list_by_prefix("X", 0).expect_err("limit").kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn prefix_listing_stops_past_the_prefix() {
        let counting = CountingStore::new(store());
        let resolver = RpcResolver::new(&counting);
        assert!(resolver.list_by_prefix("ORWPT Z", 10).expect("list").is_empty());
        // seek (data + next) then one stop; the XUS entry is never decoded
        assert!(counting.calls.get() <= 4);
    }
}
