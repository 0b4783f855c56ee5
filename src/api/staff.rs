// NEW PERSON file (#200) under `^VA(200)`: lookup and forward paging.
use serde::Serialize;

use super::entity::{EntityFile, Page};
use crate::core::error::{Error, ErrorKind};
use crate::core::piece::get_piece;
use crate::core::store::Store;
use crate::core::value::Value;

pub const STAFF_FILE: EntityFile = EntityFile::new("^VA", &["200"]);

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StaffMember {
    pub ien: String,
    pub name: String,
    pub title: String,
}

impl StaffMember {
    fn from_zero_node(ien: &str, zero: &Value) -> Self {
        let text = zero.text();
        let zero = Some(text.as_ref());
        Self {
            ien: ien.to_string(),
            name: get_piece(zero, 1).to_string(),
            title: get_piece(zero, 9).to_string(),
        }
    }
}

pub struct StaffResolver<S> {
    store: S,
}

impl<S: Store> StaffResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn lookup(&self, ien: &str) -> Result<StaffMember, Error> {
        match STAFF_FILE.zero_node(&self.store, ien)? {
            Some(zero) => Ok(StaffMember::from_zero_node(ien, &zero)),
            None => Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("staff member {ien} not found"))
                .with_path(STAFF_FILE.entry(ien).child("0"))),
        }
    }

    pub fn next_after(&self, ien: &str) -> Result<Option<String>, Error> {
        STAFF_FILE.next_after(&self.store, ien)
    }

    pub fn scan(&self, after: &str, limit: usize) -> Result<Page<StaffMember>, Error> {
        STAFF_FILE.page(&self.store, after, limit, StaffMember::from_zero_node)
    }
}
