//! Integration tests for gke-e2e
//!
//! These tests run the actual binary. The GKE tests need a live cluster and
//! are ignored by default.
