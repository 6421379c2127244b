//! Bulk ingest paths: uploaded documents and file-change observations
//! (spec.md §4.14).

pub mod document;
pub mod observer;
