#![deny(missing_docs)]

//! Core library for the mining document analysis service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Firestore project records and history events.
pub mod firestore;
/// Best-effort geocoding of recognized locations.
pub mod geocoding;
/// Google Cloud credentials and endpoint helpers.
pub mod google;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Entity recognition for regulatory documents.
pub mod nlp;
/// Retrieve, extract, annotate, geocode, and record.
pub mod pipeline;
/// Cloud Storage document retrieval.
pub mod storage;
