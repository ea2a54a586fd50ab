//! Purpose: Client library crate for the Quiver Data API, used by the `quiver` CLI.
//! Exports: `api` (clients, options, results, cursor, transport seam).
//! Role: Library backing the binary and downstream applications.
//! Invariants: `api` is the stable surface; `core` stays internal.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;
