//! Purpose: Shared library crate used by the `vistascope` CLI and tests.
//! Exports: `core` (store client, traversal, piece codec, errors), `api` (resolvers, aggregation).
//! Role: Read-only access layer; no module offers a way to modify a store.
//! Invariants: Policy checks run before any store access.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod notice;
