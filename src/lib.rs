//! Compliance Desk Client Library
//!
//! This library provides the client side of the customer-compliance workflow:
//! sanctions screening, document OCR, the registration form with its PDF
//! report, and the AI assistant used to find PRADO verification pages.
//!
//! # Modules
//!
//! - `core`: Domain types and business rules.
//! - `integrations`: Backend client and rasterization seam.
//! - `features`: Per-screen controllers (search, OCR, registration, chat, PRADO).
//! - `config`: Configuration management.
//! - `documents`: Uploaded documents and preview handles.
//! - `errors`: Error handling types.
//! - `field_store`: Persistent form state with cross-context sync.
//! - `http_client`: Backend HTTP client and multipart payloads.
//! - `match_normalizer`: Normalization of sanctions hits.
//! - `models`: Core data models.
//! - `phase`: Navigation between search, results and registration.
//! - `reconcile`: OCR results to registration form fields.
//! - `screenshot`: Capture and encoding of document screenshots.
//! - `services`: Backend service clients and form validation.
//! - `store_integrity`: Checksummed storage envelopes.

pub mod core;
pub mod features;
pub mod integrations;

pub mod config;
pub mod documents;
pub mod errors;
pub mod field_store;
pub mod http_client;
pub mod match_normalizer;
pub mod models;
pub mod phase;
pub mod reconcile;
pub mod screenshot;
pub mod services;
pub mod store_integrity;
