//! Integration tests for adsync-sync
//!
//! Runs whole batches against an in-memory directory and local store and
//! checks the reports and the data left behind.

mod common;

mod test_batch_control;
mod test_export;
mod test_import;
