#![doc = "printpack-core: document pack generation and artifact sync pipeline."]

//! This crate turns business payloads (shipments, cartons) into filled spreadsheet
//! templates, converts them to PDF through the Microsoft Graph drive API, merges multi
//! document packs into one artifact and delivers that artifact to the remote drive.
//!
//! # Layout
//! - [`payload`], [`mapping`], [`workbook`]: binding payloads to template cells.
//! - [`graph`], [`pdf`]: the external rendering service and page concatenation.
//! - [`engine`]: the pack orchestrator.
//! - [`sync_queue`]: the bounded retry state machine delivering artifacts.
//! - [`versions`], [`catalog`]: template/mapping governance.
//! - [`store`]: SQLite persistence for all of the above.
//!
//! Collaborator seams (converter, uploader, merger, payload provider) are traits in
//! [`contract`], mockable with `mockall` when the `test-export-mocks` feature is enabled.

pub mod catalog;
pub mod config;
pub mod contract;
pub mod engine;
pub mod error;
pub mod graph;
pub mod mapping;
pub mod models;
pub mod payload;
pub mod pdf;
pub mod routing;
pub mod store;
pub mod sync_queue;
pub mod versions;
pub mod workbook;
