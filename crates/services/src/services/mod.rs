//! Service modules for the Trello deliverable sync.
//!
//! - [`trello`] - REST client for the Trello API, behind the [`trello::BoardApi`] seam
//! - [`board_options`] - board layout configuration (checklists, lists, labels, member ranks)
//! - [`deliverable_sync`] - the reconciliation engine: resolve, reconcile, orchestrate

pub mod board_options;
pub mod deliverable_sync;
pub mod trello;
