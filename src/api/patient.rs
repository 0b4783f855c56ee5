//! Purpose: Resolve PATIENT file (#2) entries stored under `^DPT`.
//! Exports: `PatientResolver`, `PatientIdentity`, `Candidate`, `PATIENT_FILE`.
//! Role: Decodes the zero node into an identity and pages or searches entries.
//! Invariants: A missing zero node is NotFound; store faults propagate unchanged.
//! Invariants: Scans and searches walk identifiers one sibling at a time.
use serde::Serialize;

use super::entity::{EntityFile, Page};
use crate::core::error::{Error, ErrorKind};
use crate::core::piece::{get_piece, render_fileman_date};
use crate::core::store::Store;
use crate::core::value::Value;

pub const PATIENT_FILE: EntityFile = EntityFile::new("^DPT", &[]);
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PatientIdentity {
    pub ien: String,
    pub name: String,
    pub sex: String,
    /// DOB as stored (FileMan internal form).
    pub dob_fileman: String,
    /// DOB rendered `MM/DD/YYYY`, or the invalid-date marker.
    pub dob: String,
    pub ssn: String,
}

impl PatientIdentity {
    fn from_zero_node(ien: &str, zero: &Value) -> Self {
        let text = zero.text();
        let zero = Some(text.as_ref());
        let dob_fileman = get_piece(zero, 3).to_string();
        Self {
            ien: ien.to_string(),
            name: get_piece(zero, 1).to_string(),
            sex: get_piece(zero, 2).to_string(),
            dob: render_fileman_date(&dob_fileman),
            dob_fileman,
            ssn: get_piece(zero, 9).to_string(),
        }
    }
}

/// Name-search hit; aggregation is left to the caller.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Candidate {
    pub dfn: String,
    pub name: String,
}

pub struct PatientResolver<S> {
    store: S,
}

impl<S: Store> PatientResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn lookup(&self, ien: &str) -> Result<PatientIdentity, Error> {
        match PATIENT_FILE.zero_node(&self.store, ien)? {
            Some(zero) => Ok(PatientIdentity::from_zero_node(ien, &zero)),
            None => Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("patient {ien} not found"))
                .with_path(PATIENT_FILE.entry(ien).child("0"))),
        }
    }

    pub fn next_after(&self, ien: &str) -> Result<Option<String>, Error> {
        PATIENT_FILE.next_after(&self.store, ien)
    }

    pub fn scan(&self, after: &str, limit: usize) -> Result<Page<PatientIdentity>, Error> {
        PATIENT_FILE.page(&self.store, after, limit, PatientIdentity::from_zero_node)
    }

    /// Case-insensitive substring match on the patient name, stopping at `limit` hits.
    pub fn search_by_name(&self, term: &str, limit: usize) -> Result<Vec<Candidate>, Error> {
        let needle = term.trim().to_uppercase();
        let mut hits = Vec::new();
        if limit == 0 {
            return Ok(hits);
        }
        for ien in PATIENT_FILE.ids_after(&self.store, "0") {
            let ien = ien?;
            let Some(zero) = PATIENT_FILE.zero_node(&self.store, &ien)? else {
                continue;
            };
            let text = zero.text();
            let name = get_piece(Some(text.as_ref()), 1);
            if name.to_uppercase().contains(&needle) {
                hits.push(Candidate {
                    dfn: ien,
                    name: name.to_string(),
                });
                if hits.len() >= limit {
                    break;
                }
            }
        }
        tracing::debug!(term = %term, hits = hits.len(), "patient name search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::PatientResolver;
    use crate::core::error::ErrorKind;
    use crate::core::snapshot::SnapshotStore;
    use crate::core::store::testing::FaultyStore;

    fn store() -> SnapshotStore {
        SnapshotStore::from_entries([
            ("^DPT", vec!["1", "0"], "SMITH,JOHN^M^2660512^^^^^^123456789"),
            ("^DPT", vec!["3", "0"], "SMITHERS,WAYLON^M^2450101^^^^^^222334444"),
            ("^DPT", vec!["7", "0"], "DOE,JANE^F^bad"),
            ("^DPT", vec!["B", "DOE,JANE", "7"], ""),
        ])
        .expect("store")
    }

    #[test]
    fn lookup_decodes_identity_pieces() {
        let resolver = PatientResolver::new(store());
        let patient = resolver.lookup("1").expect("patient");
        assert_eq!(patient.name, "SMITH,JOHN");
        assert_eq!(patient.sex, "M");
        assert_eq!(patient.dob, "05/12/1966");
        assert_eq!(patient.ssn, "123456789");

        let odd = resolver.lookup("7").expect("patient");
        assert_eq!(odd.dob, "Invalid Date (bad)");
        assert_eq!(odd.ssn, "");
    }

    #[test]
    fn missing_patient_is_not_found() {
        let resolver = PatientResolver::new(store());
        let err = resolver.lookup("2").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn primary_fault_is_store_error() {
        let resolver = PatientResolver::new(FaultyStore::new(store(), &["^DPT(1,"]));
        let err = resolver.lookup("1").expect_err("fault");
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn next_after_walks_numeric_entries_then_stops() {
        let resolver = PatientResolver::new(store());
        assert_eq!(resolver.next_after("0").expect("next").as_deref(), Some("1"));
        assert_eq!(resolver.next_after("1").expect("next").as_deref(), Some("3"));
        assert_eq!(resolver.next_after("3").expect("next").as_deref(), Some("7"));
        assert_eq!(resolver.next_after("7").expect("next"), None);
    }

    #[test]
    fn scan_pages_forward() {
        let resolver = PatientResolver::new(store());
        let page = resolver.scan("1", 5).expect("scan");
        let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["SMITHERS,WAYLON", "DOE,JANE"]);
        assert!(page.exhausted);
    }

    #[test]
    fn search_matches_substrings_case_insensitively() {
        let resolver = PatientResolver::new(store());
        let hits = resolver.search_by_name("smith", 10).expect("search");
        let dfns: Vec<_> = hits.iter().map(|c| c.dfn.as_str()).collect();
        assert_eq!(dfns, vec!["1", "3"]);
        assert_eq!(resolver.search_by_name("smith", 1).expect("search").len(), 1);
        assert!(resolver.search_by_name("nobody", 10).expect("search").is_empty());
    }
}
