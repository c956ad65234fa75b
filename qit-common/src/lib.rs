//! # QIT Common Library
//!
//! Shared code for the carton quality-inspection tracker:
//! - Inspection record model and sentinels
//! - Row normalization from loosely-keyed tabular records
//! - Batch grouping and rowspan layout for the merged-cell table
//! - Defect vocabulary, keyword matching and error-code derivation
//! - Carton serial catalog and draft batch workflow
//! - Configuration loading

pub mod catalog;
pub mod config;
pub mod defect;
pub mod draft;
pub mod error;
pub mod grouping;
pub mod layout;
pub mod model;
pub mod normalize;
pub mod time;

pub use error::{Error, Result};
pub use model::{InspectionDate, InspectionResult, InspectionRow, RecordId};
