//! # Xylem DB Core
//!
//! Shared engine types for the xylem document database:
//!
//! - record identifiers and document positions ([`RecordId`], [`PreValue`])
//! - the document-store seam index layers consult to turn ids into current
//!   tree positions ([`DocStore`])
//! - the cooperative interrupt flag the job framework raises against
//!   long-running batch operations ([`InterruptFlag`])

pub mod ids;
pub mod interrupt;
pub mod store;

pub use ids::{PreValue, RecordId};
pub use interrupt::{InterruptFlag, Interrupted};
pub use store::{resolve_pres, DocStore, IdentityStore};
