//! Purpose: Library crate bridging a host process to a runtime-loaded quant
//! data-provider module.
//! Exports: `api` (the stable surface), `core` (lifecycle, decoding, FFI).
//! Role: Owns the module mapping, its symbol table, and every byte copied out
//! of foreign result buffers; callers only ever see host-owned data.
//! Invariants: All FFI interaction is confined to `core` modules; no public
//! type retains a foreign pointer.
pub mod api;
pub mod core;
