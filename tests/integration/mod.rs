//! Integration tests for the WBEM export pipeline

mod config_integration;
mod dispatch_files;
mod export_session;
mod manifest_resolution;
mod snapshot_storage;
mod test_utils;
