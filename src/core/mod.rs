// Core modules: store contract, ordering, traversal policy, codecs and errors.
pub mod collate;
pub mod error;
pub mod path;
pub mod piece;
pub mod snapshot;
pub mod store;
pub mod traverse;
pub mod value;
