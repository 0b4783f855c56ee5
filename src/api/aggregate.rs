//! Purpose: Fan out the domain fetchers for one patient and merge their results.
//! Exports: `Aggregator`, `AggregateOptions`, `PatientRecord`, `DomainError`, `SearchOutcome`.
//! Role: Tolerates partial failure; every call returns a record plus its error list.
//! Invariants: Results merge in fetcher order regardless of completion order.
//! Invariants: A fetcher that fails or misses the deadline never aborts the others.
//! Invariants: Concurrent mode gives each fetcher its own store handle.
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use time::{Date, OffsetDateTime};

use super::domains::{
    Allergy, Demographics, Domain, DomainData, DomainFetcher, FetchContext, Identifiers, Medication, Problem,
    Vital, default_fetchers,
};
use super::patient::{Candidate, DEFAULT_SEARCH_LIMIT, PatientResolver};
use crate::core::error::{Error, ErrorKind};
use crate::core::store::{DeadlineStore, Store, StoreSource};

pub const DEFAULT_SITE: &str = "500";
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

#[derive(Clone, Debug)]
pub struct AggregateOptions {
    pub site: String,
    pub as_of: Date,
    /// Total budget for one aggregation; `None` waits for every fetcher.
    pub deadline: Option<Duration>,
    pub concurrent: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            site: DEFAULT_SITE.to_string(),
            as_of: OffsetDateTime::now_utc().date(),
            deadline: None,
            concurrent: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DomainError {
    pub domain: Domain,
    pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PatientRecord {
    pub dfn: String,
    pub site: String,
    pub demographics: Option<Demographics>,
    pub identifiers: Option<Identifiers>,
    pub medications: Option<Vec<Medication>>,
    pub vitals: Option<Vec<Vital>>,
    pub allergies: Option<Vec<Allergy>>,
    pub problems: Option<Vec<Problem>>,
    pub errors: Vec<DomainError>,
}

impl PatientRecord {
    pub fn new(dfn: &str, site: &str) -> Self {
        Self {
            dfn: dfn.to_string(),
            site: site.to_string(),
            demographics: None,
            identifiers: None,
            medications: None,
            vitals: None,
            allergies: None,
            problems: None,
            errors: Vec::new(),
        }
    }

    pub fn apply(&mut self, data: DomainData) {
        match data {
            DomainData::Demographics(demo) => self.demographics = Some(demo),
            DomainData::Identifiers(ids) => self.identifiers = Some(ids),
            DomainData::Medications(meds) => self.medications = Some(meds),
            DomainData::Vitals(vitals) => self.vitals = Some(vitals),
            DomainData::Allergies(allergies) => self.allergies = Some(allergies),
            DomainData::Problems(problems) => self.problems = Some(problems),
        }
    }

    pub fn record_failure(&mut self, domain: Domain, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(dfn = %self.dfn, domain = domain.label(), error = %message, "domain fetch failed");
        self.errors.push(DomainError { domain, message });
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Partial error naming the failed domains, or `None` for a complete record.
    pub fn partial_error(&self) -> Option<Error> {
        if self.is_complete() {
            return None;
        }
        let failed = self
            .errors
            .iter()
            .map(|err| err.domain.label())
            .collect::<Vec<_>>()
            .join(", ");
        Some(
            Error::new(ErrorKind::Partial)
                .with_message(format!("patient {} aggregated with failures: {failed}", self.dfn))
                .with_hint("Failed domains are listed under errors; the rest of the record is usable."),
        )
    }

    fn merge(&mut self, domain: Domain, result: Result<DomainData, Error>) {
        match result {
            Ok(data) => self.apply(data),
            Err(err) => self.record_failure(domain, err.to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    NoMatch,
    Single { candidate: Candidate, record: PatientRecord },
    Ambiguous { candidates: Vec<Candidate> },
}

type Delivery = (usize, Result<DomainData, Error>);

/// Fills `slots` from `rx` until `pending` results arrived, the senders are
/// gone, or `deadline` passed. Returns true when the deadline cut it short.
fn collect_results(
    rx: &mpsc::Receiver<Delivery>,
    slots: &mut [Option<Result<DomainData, Error>>],
    mut pending: usize,
    deadline: Option<Instant>,
) -> bool {
    while pending > 0 {
        let received = match deadline {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((idx, result)) => {
                slots[idx] = Some(result);
                pending -= 1;
            }
            Err(RecvTimeoutError::Timeout) => return true,
            Err(RecvTimeoutError::Disconnected) => {
                return deadline.is_some_and(|deadline| Instant::now() >= deadline);
            }
        }
    }
    false
}

pub struct Aggregator {
    fetchers: Vec<Arc<dyn DomainFetcher>>,
    options: AggregateOptions,
}

impl Aggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self::with_fetchers(options, default_fetchers())
    }

    pub fn with_fetchers(options: AggregateOptions, fetchers: Vec<Arc<dyn DomainFetcher>>) -> Self {
        Self { fetchers, options }
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    fn context(&self, dfn: &str) -> FetchContext {
        FetchContext {
            dfn: dfn.to_string(),
            site: self.options.site.clone(),
            as_of: self.options.as_of,
        }
    }

    fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.options.deadline.map(|budget| start + budget)
    }

    /// Runs every fetcher in order on one handle.
    ///
    /// The deadline is checked between store calls only; [`Aggregator::aggregate_from`]
    /// also stops waiting on a call that stalls past it.
    pub fn aggregate(&self, store: &dyn Store, dfn: &str) -> PatientRecord {
        let ctx = self.context(dfn);
        let mut record = PatientRecord::new(dfn, &self.options.site);
        let Some(deadline) = self.deadline_from(Instant::now()) else {
            for fetcher in &self.fetchers {
                record.merge(fetcher.domain(), fetcher.fetch(store, &ctx));
            }
            return record;
        };
        let bounded = DeadlineStore::new(store, deadline);
        for fetcher in &self.fetchers {
            if Instant::now() >= deadline {
                record.record_failure(fetcher.domain(), DEADLINE_EXCEEDED);
                continue;
            }
            record.merge(fetcher.domain(), fetcher.fetch(&bounded, &ctx));
        }
        record
    }

    /// Aggregates using handles from `source`; concurrent when the options say so.
    pub fn aggregate_from<P: StoreSource>(&self, source: &P, dfn: &str) -> PatientRecord {
        if self.options.concurrent {
            return self.aggregate_concurrent(source, dfn);
        }
        let start = Instant::now();
        let handle = match source.open() {
            Ok(handle) => handle,
            Err(err) => return self.all_failed(dfn, &err),
        };
        match self.deadline_from(start) {
            Some(deadline) => self.aggregate_on_worker(handle, dfn, start, deadline),
            None => self.aggregate(&handle, dfn),
        }
    }

    fn all_failed(&self, dfn: &str, err: &Error) -> PatientRecord {
        let mut record = PatientRecord::new(dfn, &self.options.site);
        for fetcher in &self.fetchers {
            record.record_failure(fetcher.domain(), err.to_string());
        }
        record
    }

    /// Sequential run on one worker thread, so a stalled store call cannot hold
    /// the caller past `deadline`.
    fn aggregate_on_worker<H>(&self, handle: H, dfn: &str, start: Instant, deadline: Instant) -> PatientRecord
    where
        H: Store + Send + 'static,
    {
        let fetchers = self.fetchers.clone();
        let ctx = self.context(dfn);
        let (tx, rx) = mpsc::channel::<Delivery>();
        let spawned = thread::Builder::new()
            .name("fetch-sequential".to_string())
            .spawn(move || {
                let bounded = DeadlineStore::new(handle, deadline);
                for (idx, fetcher) in fetchers.iter().enumerate() {
                    if Instant::now() >= deadline {
                        break;
                    }
                    if tx.send((idx, fetcher.fetch(&bounded, &ctx))).is_err() {
                        break;
                    }
                }
            });
        if let Err(err) = spawned {
            let err = Error::new(ErrorKind::Internal)
                .with_message("failed to start fetcher thread")
                .with_source(err);
            return self.all_failed(dfn, &err);
        }

        let mut slots: Vec<Option<Result<DomainData, Error>>> = self.fetchers.iter().map(|_| None).collect();
        let timed_out = collect_results(&rx, &mut slots, self.fetchers.len(), Some(deadline));
        tracing::debug!(dfn = %dfn, elapsed_ms = start.elapsed().as_millis() as u64, timed_out, "sequential aggregation finished");
        self.assemble(dfn, slots, timed_out)
    }

    fn aggregate_concurrent<P: StoreSource>(&self, source: &P, dfn: &str) -> PatientRecord {
        let start = Instant::now();
        let deadline = self.deadline_from(start);
        let ctx = Arc::new(self.context(dfn));
        let (tx, rx) = mpsc::channel::<Delivery>();

        let mut slots: Vec<Option<Result<DomainData, Error>>> = Vec::with_capacity(self.fetchers.len());
        let mut pending = 0usize;
        for (idx, fetcher) in self.fetchers.iter().enumerate() {
            let handle = match source.open() {
                Ok(handle) => handle,
                Err(err) => {
                    slots.push(Some(Err(err)));
                    continue;
                }
            };
            slots.push(None);
            pending += 1;
            let fetcher = Arc::clone(fetcher);
            let ctx = Arc::clone(&ctx);
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("fetch-{}", fetcher.domain().label().to_lowercase()))
                .spawn(move || {
                    let result = match deadline {
                        Some(deadline) => fetcher.fetch(&DeadlineStore::new(handle, deadline), &ctx),
                        None => fetcher.fetch(&handle, &ctx),
                    };
                    // The receiver is gone once the deadline passed.
                    let _ = tx.send((idx, result));
                });
            if let Err(err) = spawned {
                pending -= 1;
                slots[idx] = Some(Err(Error::new(ErrorKind::Internal)
                    .with_message("failed to start fetcher thread")
                    .with_source(err)));
            }
        }
        drop(tx);

        let timed_out = collect_results(&rx, &mut slots, pending, deadline);
        tracing::debug!(dfn = %dfn, elapsed_ms = start.elapsed().as_millis() as u64, timed_out, "concurrent aggregation finished");
        self.assemble(dfn, slots, timed_out)
    }

    /// Merges slots in fetcher order; empty slots become failures.
    fn assemble(&self, dfn: &str, slots: Vec<Option<Result<DomainData, Error>>>, timed_out: bool) -> PatientRecord {
        let mut record = PatientRecord::new(dfn, &self.options.site);
        for (fetcher, slot) in self.fetchers.iter().zip(slots) {
            match slot {
                Some(result) => record.merge(fetcher.domain(), result),
                None if timed_out => record.record_failure(fetcher.domain(), DEADLINE_EXCEEDED),
                None => record.record_failure(fetcher.domain(), "fetcher ended without a result"),
            }
        }
        record
    }

    /// Patient name search; a store failure yields no candidates.
    pub fn search(&self, store: &dyn Store, term: &str) -> Vec<Candidate> {
        match PatientResolver::new(store).search_by_name(term, DEFAULT_SEARCH_LIMIT) {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(term = %term, error = %err, "patient search failed");
                Vec::new()
            }
        }
    }

    /// Searches, then aggregates automatically only when exactly one patient matches.
    pub fn search_and_aggregate<P: StoreSource>(&self, source: &P, term: &str) -> Result<SearchOutcome, Error> {
        let handle = source.open()?;
        let mut candidates = self.search(&handle, term);
        drop(handle);
        match candidates.len() {
            0 => Ok(SearchOutcome::NoMatch),
            1 => {
                let candidate = candidates.remove(0);
                let record = self.aggregate_from(source, &candidate.dfn);
                Ok(SearchOutcome::Single { candidate, record })
            }
            _ => Ok(SearchOutcome::Ambiguous { candidates }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::domains::fixtures::clinical_store;
    use crate::core::snapshot::SnapshotStore;
    use crate::core::store::testing::{FaultyStore, StallingStore};
    use time::macros::date;

    fn options() -> AggregateOptions {
        AggregateOptions {
            as_of: date!(2026 - 10 - 17),
            ..AggregateOptions::default()
        }
    }

    struct SlowFetcher {
        domain: Domain,
        delay: Duration,
    }

    impl DomainFetcher for SlowFetcher {
        fn domain(&self) -> Domain {
            self.domain
        }

        fn fetch(&self, _store: &dyn Store, ctx: &FetchContext) -> Result<DomainData, Error> {
            thread::sleep(self.delay);
            Ok(DomainData::Allergies(vec![Allergy {
                ien: ctx.dfn.clone(),
                reactant: "SLOW".to_string(),
            }]))
        }
    }

    #[test]
    fn complete_record_has_every_domain() {
        let record = Aggregator::new(options()).aggregate(&clinical_store(), "1");
        assert!(record.is_complete(), "{:?}", record.errors);
        assert!(record.partial_error().is_none());
        assert_eq!(record.demographics.as_ref().map(|d| d.age), Some(Some(60)));
        assert_eq!(record.medications.as_ref().map(Vec::len), Some(2));
        assert_eq!(record.site, "500");
    }

    #[test]
    fn two_failing_domains_leave_four_populated() {
        let faulty = FaultyStore::new(clinical_store(), &["^PS(55", "^GMR(120.5"]);
        let record = Aggregator::new(options()).aggregate(&faulty, "1");
        assert!(record.demographics.is_some());
        assert!(record.identifiers.is_some());
        assert!(record.allergies.is_some());
        assert!(record.problems.is_some());
        assert!(record.medications.is_none());
        assert!(record.vitals.is_none());
        let failed: Vec<_> = record.errors.iter().map(|e| e.domain).collect();
        assert_eq!(failed, vec![Domain::Medications, Domain::Vitals]);

        let err = record.partial_error().expect("partial");
        assert_eq!(err.kind(), ErrorKind::Partial);
        assert!(err.message().unwrap_or("").contains("Medications, Vitals"));
    }

    #[test]
    fn unknown_patient_still_returns_a_record() {
        let record = Aggregator::new(options()).aggregate(&clinical_store(), "99");
        let failed: Vec<_> = record.errors.iter().map(|e| e.domain).collect();
        assert_eq!(failed, vec![Domain::Demographics, Domain::Identifiers]);
        assert_eq!(record.medications, Some(Vec::new()));
    }

    #[test]
    fn concurrent_output_matches_sequential() {
        let store = clinical_store();
        let sequential = Aggregator::new(options()).aggregate_from(&store, "1");
        let concurrent = Aggregator::new(AggregateOptions {
            concurrent: true,
            deadline: Some(Duration::from_secs(30)),
            ..options()
        })
        .aggregate_from(&store, "1");
        assert_eq!(
            serde_json::to_value(&sequential).expect("json"),
            serde_json::to_value(&concurrent).expect("json")
        );
    }

    #[test]
    fn concurrent_deadline_marks_unfinished_fetchers() {
        let mut fetchers = default_fetchers();
        fetchers[4] = Arc::new(SlowFetcher {
            domain: Domain::Allergies,
            delay: Duration::from_millis(500),
        });
        let aggregator = Aggregator::with_fetchers(
            AggregateOptions {
                concurrent: true,
                deadline: Some(Duration::from_millis(100)),
                ..options()
            },
            fetchers,
        );
        let record = aggregator.aggregate_from(&clinical_store(), "1");
        assert!(record.demographics.is_some());
        assert!(record.allergies.is_none());
        assert_eq!(
            record.errors,
            vec![DomainError {
                domain: Domain::Allergies,
                message: DEADLINE_EXCEEDED.to_string(),
            }]
        );
    }

    #[test]
    fn sequential_deadline_stops_remaining_fetchers() {
        let aggregator = Aggregator::new(AggregateOptions {
            deadline: Some(Duration::ZERO),
            ..options()
        });
        let record = aggregator.aggregate(&clinical_store(), "1");
        assert_eq!(record.errors.len(), 6);
        assert!(record.errors.iter().all(|e| e.message == DEADLINE_EXCEEDED));
    }

    #[test]
    fn sequential_deadline_bounds_a_stalled_store_call() {
        let stalling = StallingStore {
            inner: clinical_store(),
            prefix: "^PSRX",
            delay: Duration::from_secs(2),
        };
        let aggregator = Aggregator::new(AggregateOptions {
            deadline: Some(Duration::from_millis(100)),
            ..options()
        });
        let started = Instant::now();
        let record = aggregator.aggregate_from(&stalling, "1");
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());

        assert!(record.demographics.is_some());
        assert!(record.identifiers.is_some());
        let failed: Vec<_> = record.errors.iter().map(|e| e.domain).collect();
        assert_eq!(
            failed,
            vec![Domain::Medications, Domain::Vitals, Domain::Allergies, Domain::Problems]
        );
        assert!(record.errors.iter().all(|e| e.message == DEADLINE_EXCEEDED));
    }

    #[test]
    fn sequential_with_deadline_matches_unbounded_run() {
        let store = clinical_store();
        let unbounded = Aggregator::new(options()).aggregate_from(&store, "1");
        let bounded = Aggregator::new(AggregateOptions {
            deadline: Some(Duration::from_secs(30)),
            ..options()
        })
        .aggregate_from(&store, "1");
        assert_eq!(unbounded, bounded);
    }

    #[test]
    fn concurrent_failures_keep_sequential_order() {
        let faulty = FaultyStore::new(clinical_store(), &["^AUPNPROB", "^GMR(120.8", "^PS(55"]);
        let sequential = Aggregator::new(options()).aggregate_from(&faulty, "1");
        let concurrent = Aggregator::new(AggregateOptions {
            concurrent: true,
            deadline: Some(Duration::from_secs(30)),
            ..options()
        })
        .aggregate_from(&faulty, "1");

        let failed: Vec<_> = sequential.errors.iter().map(|e| e.domain).collect();
        assert_eq!(failed, vec![Domain::Medications, Domain::Allergies, Domain::Problems]);
        assert_eq!(sequential.errors, concurrent.errors);
        assert_eq!(sequential, concurrent);
    }

    #[test]
    fn search_outcomes() {
        let store = clinical_store();
        let aggregator = Aggregator::new(options());
        match aggregator.search_and_aggregate(&store, "smith").expect("search") {
            SearchOutcome::Ambiguous { candidates } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
        match aggregator.search_and_aggregate(&store, "doe").expect("search") {
            SearchOutcome::Single { candidate, record } => {
                assert_eq!(candidate.dfn, "3");
                assert_eq!(record.dfn, "3");
            }
            other => panic!("expected single match, got {other:?}"),
        }
        assert!(matches!(
            aggregator.search_and_aggregate(&store, "nobody").expect("search"),
            SearchOutcome::NoMatch
        ));
    }

    #[test]
    fn failed_search_yields_no_candidates() {
        let faulty = FaultyStore::new(SnapshotStore::default(), &["^DPT"]);
        assert!(Aggregator::new(options()).search(&faulty, "smith").is_empty());
    }
}
