//! Batch mode: spreadsheet upload, column mapping, sequential PDF rendering into a ZIP.

pub mod handlers;
pub mod mapping;
pub mod registry;
pub mod runner;
pub mod table;

pub use mapping::{Field, FieldMapping, NormalizeOptions};
pub use registry::{BatchPhase, BatchRegistry, BatchStatus};
