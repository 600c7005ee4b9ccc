//! Kula Annotator - Interactive annotation session engine
//!
//! Turns a stream of entity/relation candidates into an approved dataset.
//! A reviewer saves or skips one candidate at a time, can undo any recent
//! step, and finishes by committing the approved records and shrinking the
//! candidate source to what is still undecided.

pub mod session;
pub mod shared;
pub mod spert;
pub mod state;
pub mod undo;

pub use session::{AnnotationSession, SessionPhase, SessionSummary};
pub use shared::SharedSession;
pub use spert::{ExportReport, SpertDocument, SpertExporter, SpertSplits, SpertTypes};
pub use state::SessionState;
pub use undo::{UndoSnapshot, UndoStack, DEFAULT_UNDO_CAPACITY};
