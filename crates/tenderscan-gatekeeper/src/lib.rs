//! Tenderscan Gatekeeper
//!
//! Decides whether an assembled record may leave the pipeline.
//!
//! The Gatekeeper provides:
//! - Schema validation of the assembled record
//! - Completeness scoring against the structural index
//! - Data quality scoring (confidence, provenance, conflicts, failures)
//! - The P0 battery: ten hard checks, any failure blocks acceptance
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use tenderscan_gatekeeper::quick_validate;
//!
//! let record = json!({
//!     "document_id": "tender-1",
//!     "conflicts": [],
//!     "metadata": {},
//!     "deadlines": [{"event": "bid submission", "date": "15.03.2025"}]
//! });
//! assert!(quick_validate(&record).valid);
//! ```

#![warn(missing_docs)]

mod config;
pub mod error;
pub mod p0;
pub mod schema;
mod validator;

pub use config::GatekeeperConfig;
pub use error::{GatekeeperError, Result};
pub use p0::{
    create_text_hash, run_all_p0_checks, P0CheckResult, P0Context, P0Summary, P0Violation,
};
pub use schema::{AdditionalKeys, ObjectSchema, OutputSchema, SchemaReport, SchemaViolation};
pub use validator::{
    calculate_completeness, check_data_quality, quick_validate, validate_schema,
    CompletenessReport, DataQualityReport, Gatekeeper, IssueKind, KindCoverage, QualityIssue,
    QuickValidation, SectionCoverage, ValidationReport,
};
