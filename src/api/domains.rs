//! Purpose: Per-domain fetchers that read one slice of a patient record each.
//! Exports: `Domain`, `DomainFetcher`, `DomainData`, `FetchContext`, `default_fetchers`.
//! Role: Units of work for the aggregation orchestrator; each owns its store layout.
//! Invariants: A fetcher touches only the store handle it is given.
//! Invariants: Entry pointers that resolve nowhere are skipped; faults on a domain's
//! Invariants: primary nodes fail the whole domain, optional names fall back to "".
use std::sync::Arc;

use serde::Serialize;
use time::Date;

use super::entity::read_optional;
use super::patient::PATIENT_FILE;
use crate::core::collate::is_canonical_number;
use crate::core::error::{Error, ErrorKind};
use crate::core::path::GlobalPath;
use crate::core::piece::{age_on, decode_fileman_date, get_piece, render_fileman_date, render_fileman_datetime};
use crate::core::store::Store;
use crate::core::traverse::Children;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Demographics,
    Identifiers,
    Medications,
    Vitals,
    Allergies,
    Problems,
}

impl Domain {
    pub fn label(self) -> &'static str {
        match self {
            Domain::Demographics => "Demographics",
            Domain::Identifiers => "Identifiers",
            Domain::Medications => "Medications",
            Domain::Vitals => "Vitals",
            Domain::Allergies => "Allergies",
            Domain::Problems => "Problems",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchContext {
    pub dfn: String,
    pub site: String,
    /// Reference date for age calculation.
    pub as_of: Date,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Demographics {
    pub name: String,
    pub sex: String,
    pub dob_fileman: String,
    pub dob: String,
    pub age: Option<u32>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Identifiers {
    pub dfn: String,
    pub site: String,
    pub ssn: String,
    pub icn: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Medication {
    pub rx_ien: String,
    pub rx_number: String,
    pub drug_ien: String,
    pub drug_name: String,
    pub status_code: String,
    pub status: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Vital {
    pub ien: String,
    pub taken_fileman: String,
    pub taken: String,
    pub type_ien: String,
    pub type_name: String,
    pub rate: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Allergy {
    pub ien: String,
    pub reactant: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Problem {
    pub ien: String,
    pub narrative: String,
    pub status_code: String,
    pub status: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DomainData {
    Demographics(Demographics),
    Identifiers(Identifiers),
    Medications(Vec<Medication>),
    Vitals(Vec<Vital>),
    Allergies(Vec<Allergy>),
    Problems(Vec<Problem>),
}

/// One logical lookup contributing a slice of the aggregated record.
pub trait DomainFetcher: Send + Sync {
    fn domain(&self) -> Domain;

    fn fetch(&self, store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error>;
}

/// The standard fetchers, in the order their results are merged.
pub fn default_fetchers() -> Vec<Arc<dyn DomainFetcher>> {
    vec![
        Arc::new(DemographicsFetcher),
        Arc::new(IdentifiersFetcher),
        Arc::new(MedicationsFetcher),
        Arc::new(VitalsFetcher),
        Arc::new(AllergiesFetcher),
        Arc::new(ProblemsFetcher),
    ]
}

fn path(global: &str, subs: &[&str]) -> GlobalPath {
    GlobalPath::from_parts(global, subs.iter().copied())
}

fn text_of(store: &dyn Store, at: &GlobalPath) -> Result<Option<String>, Error> {
    Ok(store.read_value(at)?.map(|value| value.text().into_owned()))
}

fn optional_text(store: &dyn Store, at: &GlobalPath) -> String {
    read_optional(store, at)
        .map(|value| value.text().into_owned())
        .unwrap_or_default()
}

fn patient_zero(store: &dyn Store, dfn: &str) -> Result<String, Error> {
    match PATIENT_FILE.zero_node(store, dfn)? {
        Some(zero) => Ok(zero.text().into_owned()),
        None => Err(Error::new(ErrorKind::NotFound)
            .with_message(format!("patient {dfn} not found"))
            .with_path(PATIENT_FILE.entry(dfn).child("0"))),
    }
}

/// Numeric entries below `index`, decoded one by one; `None` skips an entry.
fn collect_entries<T, F>(store: &dyn Store, index: GlobalPath, mut decode: F) -> Result<Vec<T>, Error>
where
    F: FnMut(&str) -> Result<Option<T>, Error>,
{
    let mut out = Vec::new();
    for sub in Children::new(store, index.clone()) {
        let sub = sub?;
        if !is_canonical_number(&sub) {
            break;
        }
        match decode(&sub)? {
            Some(item) => out.push(item),
            None => tracing::debug!(index = %index, entry = %sub, "dangling entry skipped"),
        }
    }
    Ok(out)
}

pub struct DemographicsFetcher;

impl DomainFetcher for DemographicsFetcher {
    fn domain(&self) -> Domain {
        Domain::Demographics
    }

    fn fetch(&self, store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error> {
        let zero = patient_zero(store, &ctx.dfn)?;
        let zero = Some(zero.as_str());
        let dob_fileman = get_piece(zero, 3).to_string();
        let age = decode_fileman_date(&dob_fileman)
            .ok()
            .and_then(|dob| age_on(dob, ctx.as_of));
        Ok(DomainData::Demographics(Demographics {
            name: get_piece(zero, 1).to_string(),
            sex: get_piece(zero, 2).to_string(),
            dob: render_fileman_date(&dob_fileman),
            dob_fileman,
            age,
        }))
    }
}

pub struct IdentifiersFetcher;

impl DomainFetcher for IdentifiersFetcher {
    fn domain(&self) -> Domain {
        Domain::Identifiers
    }

    fn fetch(&self, store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error> {
        let zero = patient_zero(store, &ctx.dfn)?;
        let mpi = optional_text(store, &PATIENT_FILE.entry(&ctx.dfn).child("MPI"));
        Ok(DomainData::Identifiers(Identifiers {
            dfn: ctx.dfn.clone(),
            site: ctx.site.clone(),
            ssn: get_piece(Some(zero.as_str()), 9).to_string(),
            icn: get_piece(Some(mpi.as_str()), 1).to_string(),
        }))
    }
}

pub fn prescription_status(code: &str) -> String {
    match code {
        "0" => "ACTIVE".to_string(),
        "1" => "NON-VERIFIED".to_string(),
        "12" => "DISCONTINUED".to_string(),
        other => other.to_string(),
    }
}

pub struct MedicationsFetcher;

impl DomainFetcher for MedicationsFetcher {
    fn domain(&self) -> Domain {
        Domain::Medications
    }

    fn fetch(&self, store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error> {
        let profile = path("^PS", &["55", ctx.dfn.as_str(), "P"]);
        let meds = collect_entries(store, profile.clone(), |n| {
            let Some(pointer) = text_of(store, &profile.child(n).child("0"))? else {
                return Ok(None);
            };
            let rx_ien = get_piece(Some(pointer.as_str()), 1).to_string();
            if rx_ien.is_empty() {
                return Ok(None);
            }
            let Some(rx) = text_of(store, &path("^PSRX", &[rx_ien.as_str(), "0"]))? else {
                return Ok(None);
            };
            let rx = Some(rx.as_str());
            let drug_ien = get_piece(rx, 6).to_string();
            let drug_name = if drug_ien.is_empty() {
                String::new()
            } else {
                let drug = optional_text(store, &path("^PSDRUG", &[drug_ien.as_str(), "0"]));
                get_piece(Some(drug.as_str()), 1).to_string()
            };
            let sta = optional_text(store, &path("^PSRX", &[rx_ien.as_str(), "STA"]));
            let status_code = get_piece(Some(sta.as_str()), 1).to_string();
            Ok(Some(Medication {
                rx_number: get_piece(rx, 1).to_string(),
                rx_ien,
                drug_ien,
                drug_name,
                status: prescription_status(&status_code),
                status_code,
            }))
        })?;
        Ok(DomainData::Medications(meds))
    }
}

pub struct VitalsFetcher;

impl DomainFetcher for VitalsFetcher {
    fn domain(&self) -> Domain {
        Domain::Vitals
    }

    fn fetch(&self, store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error> {
        let index = path("^GMR", &["120.5", "C", ctx.dfn.as_str()]);
        let vitals = collect_entries(store, index, |ien| {
            let Some(zero) = text_of(store, &path("^GMR", &["120.5", ien, "0"]))? else {
                return Ok(None);
            };
            let zero = Some(zero.as_str());
            let taken_fileman = get_piece(zero, 1).to_string();
            let type_ien = get_piece(zero, 3).to_string();
            let type_name = if type_ien.is_empty() {
                String::new()
            } else {
                let kind = optional_text(store, &path("^GMRD", &["120.51", type_ien.as_str(), "0"]));
                get_piece(Some(kind.as_str()), 1).to_string()
            };
            Ok(Some(Vital {
                ien: ien.to_string(),
                taken: render_fileman_datetime(&taken_fileman),
                taken_fileman,
                type_ien,
                type_name,
                rate: get_piece(zero, 8).to_string(),
            }))
        })?;
        Ok(DomainData::Vitals(vitals))
    }
}

pub struct AllergiesFetcher;

impl DomainFetcher for AllergiesFetcher {
    fn domain(&self) -> Domain {
        Domain::Allergies
    }

    fn fetch(&self, store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error> {
        let index = path("^GMR", &["120.8", "B", ctx.dfn.as_str()]);
        let allergies = collect_entries(store, index, |ien| {
            let Some(zero) = text_of(store, &path("^GMR", &["120.8", ien, "0"]))? else {
                return Ok(None);
            };
            Ok(Some(Allergy {
                ien: ien.to_string(),
                reactant: get_piece(Some(zero.as_str()), 2).to_string(),
            }))
        })?;
        Ok(DomainData::Allergies(allergies))
    }
}

pub fn problem_status(code: &str) -> String {
    match code {
        "A" => "ACTIVE".to_string(),
        "I" => "INACTIVE".to_string(),
        other => other.to_string(),
    }
}

pub struct ProblemsFetcher;

impl DomainFetcher for ProblemsFetcher {
    fn domain(&self) -> Domain {
        Domain::Problems
    }

    fn fetch(&self, store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error> {
        let index = path("^AUPNPROB", &["AC", ctx.dfn.as_str()]);
        let problems = collect_entries(store, index, |ien| {
            let Some(zero) = text_of(store, &path("^AUPNPROB", &[ien, "0"]))? else {
                return Ok(None);
            };
            let zero = Some(zero.as_str());
            let pointer = get_piece(zero, 5);
            let narrative = if pointer.is_empty() {
                String::new()
            } else {
                let text = optional_text(store, &path("^AUTNPOV", &[pointer, "0"]));
                get_piece(Some(text.as_str()), 1).to_string()
            };
            let status_code = get_piece(zero, 12).to_string();
            Ok(Some(Problem {
                ien: ien.to_string(),
                narrative,
                status: problem_status(&status_code),
                status_code,
            }))
        })?;
        Ok(DomainData::Problems(problems))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::clinical_store;
    use super::*;
    use crate::core::store::testing::FaultyStore;
    use time::macros::date;

    fn ctx(dfn: &str) -> FetchContext {
        FetchContext {
            dfn: dfn.to_string(),
            site: "500".to_string(),
            as_of: date!(2026 - 10 - 17),
        }
    }

    #[test]
    fn demographics_and_identifiers() {
        let store = clinical_store();
        let DomainData::Demographics(demo) = DemographicsFetcher.fetch(&store, &ctx("1")).expect("demo") else {
            panic!("wrong domain data");
        };
        assert_eq!(demo.name, "SMITH,JOHN");
        assert_eq!(demo.dob, "05/12/1966");
        assert_eq!(demo.age, Some(60));

        let DomainData::Identifiers(ids) = IdentifiersFetcher.fetch(&store, &ctx("1")).expect("ids") else {
            panic!("wrong domain data");
        };
        assert_eq!(ids.ssn, "123456789");
        assert_eq!(ids.icn, "1012345678V123456");
        assert_eq!(ids.site, "500");

        let DomainData::Identifiers(ids) = IdentifiersFetcher.fetch(&store, &ctx("3")).expect("ids") else {
            panic!("wrong domain data");
        };
        assert_eq!(ids.icn, "");
    }

    #[test]
    fn missing_patient_fails_demographics() {
        let err = DemographicsFetcher
            .fetch(&clinical_store(), &ctx("42"))
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn medications_follow_prescription_pointers() {
        let DomainData::Medications(meds) = MedicationsFetcher
            .fetch(&clinical_store(), &ctx("1"))
            .expect("meds")
        else {
            panic!("wrong domain data");
        };
        assert_eq!(meds.len(), 2);
        assert_eq!(meds[0].rx_number, "100234");
        assert_eq!(meds[0].drug_name, "LISINOPRIL 10MG TAB");
        assert_eq!(meds[0].status, "ACTIVE");
        assert_eq!(meds[1].drug_name, "");
        assert_eq!(meds[1].status, "DISCONTINUED");
        assert_eq!(prescription_status("5"), "5");
    }

    #[test]
    fn clinical_lists_decode_their_nodes() {
        let store = clinical_store();
        let DomainData::Vitals(vitals) = VitalsFetcher.fetch(&store, &ctx("1")).expect("vitals") else {
            panic!("wrong domain data");
        };
        assert_eq!(vitals[0].type_name, "BLOOD PRESSURE");
        assert_eq!(vitals[0].rate, "120/80");
        assert_eq!(vitals[0].taken, "2013-01-01 09:30");

        let DomainData::Allergies(allergies) = AllergiesFetcher.fetch(&store, &ctx("1")).expect("allergies") else {
            panic!("wrong domain data");
        };
        assert_eq!(allergies[0].reactant, "PENICILLIN");

        let DomainData::Problems(problems) = ProblemsFetcher.fetch(&store, &ctx("1")).expect("problems") else {
            panic!("wrong domain data");
        };
        assert_eq!(problems[0].narrative, "Hypertension");
        assert_eq!(problems[0].status, "ACTIVE");

        let DomainData::Problems(none) = ProblemsFetcher.fetch(&store, &ctx("2")).expect("problems") else {
            panic!("wrong domain data");
        };
        assert!(none.is_empty());
    }

    #[test]
    fn optional_drug_name_survives_fault_but_prescription_fault_fails() {
        let drug_fault = FaultyStore::new(clinical_store(), &["^PSDRUG"]);
        let DomainData::Medications(meds) = MedicationsFetcher.fetch(&drug_fault, &ctx("1")).expect("meds") else {
            panic!("wrong domain data");
        };
        assert_eq!(meds[0].drug_name, "");

        let rx_fault = FaultyStore::new(clinical_store(), &["^PSRX(501,0)"]);
        let err = MedicationsFetcher.fetch(&rx_fault, &ctx("1")).expect_err("fault");
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
