//! Tenderscan Structure Detector
//!
//! Rule-based detection of headings, tables, lists (with deep hierarchical
//! numbering such as `12.3.4.a.ii`), footnotes and cross-references in raw
//! tender text. Every detector is a pure function of its input; the
//! aggregate [`detect_structure`] is deterministic and produces a
//! [`StructuralIndex`](tenderscan_domain::StructuralIndex).
//!
//! # Examples
//!
//! ```
//! use tenderscan_structure::detect_structure;
//!
//! let text = "ARTICLE 8 - Penalties\n12.3.4.a Perishable goods:\n12.3.4.a.ii Late: 5%\n";
//! let index = detect_structure(text).unwrap();
//! let (_, item) = index.list_items().last().unwrap();
//! assert_eq!(item.index, "12.3.4.a.ii");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod detector;
pub mod error;
mod footnotes;
mod headings;
mod layout;
mod lines;
mod lists;
mod references;
mod tables;

pub use detector::{detect_structure, detect_structure_with_limit, DEFAULT_MAX_TEXT_LENGTH};
pub use error::{Result, StructureError};
pub use footnotes::detect_footnotes;
pub use headings::detect_headings;
pub use lists::detect_lists;
pub use references::{
    detect_references, resolve_references, ReferenceResolution, ResolvedReference, Suggestion,
};
pub use tables::detect_tables;

use serde::{Deserialize, Serialize};
use tenderscan_domain::{ElementKind, Span};

/// One element found by a single detector, before ids and links exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detected {
    /// Covered range
    pub span: Span,
    /// Typed payload
    pub kind: ElementKind,
}
