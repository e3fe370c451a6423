//! # Progression — Activity Stage Engine
//!
//! Moves each precast element through the ordered stages of its element type.
//! An **activity** is the live record of one element at one stage; each status
//! write is authorized against the stage's assignee/QC bindings, audited, and
//! may advance the activity to the next stage or finish it into precast stock.
//!
//! ## Architecture
//!
//! ```text
//! HTTP handler (status / qc-answers)
//!     ↓ TransitionRequest
//! transition::Engine  ── one DB transaction, activity row locked FOR UPDATE
//!     ↓ Topology (path + registry + current stage)
//! engine::plan  ── dispatch ladder → target column, skip rule, done predicate
//!     ↓ Plan
//! writes: qc_answers, activity, complete_production, element, precast_stock
//!     ↓ COMMIT
//! events::Outbox  ── notification intents, in order
//! ```
//!
//! ## Parallel window
//!
//! The `Mesh & Mould` and `Reinforcement` stages run side by side. While an
//! activity sits in either, both crews write their own sub-stage columns, and
//! the activity leaves the window only when every member present on the path is
//! done (with QC where required). The successor is taken from the later member.
//!
//! ## Module Structure
//!
//! - [`status`]: status values, the six status columns, activity state
//! - [`registry`]: project stages, stage kinds, reserved names
//! - [`path`]: element-type stage paths (successor / predecessor lookups)
//! - [`dispatch`]: authorization ladder: actor → target column
//! - [`engine`]: pure transition planning
//! - [`transition`]: transactional executor
//! - [`adoption`]: activity creation for a task's elements
//! - [`view`]: read-only per-stage projection
//! - [`history`]: audit events grouped per stage

pub mod adoption;
pub mod dispatch;
pub mod engine;
pub mod history;
pub mod path;
pub mod registry;
pub mod status;
pub mod transition;
pub mod view;

pub use dispatch::{ActivityCtx, Channel};
pub use engine::{Decision, Plan, Planned, Topology};
pub use path::StagePath;
pub use registry::{StageInfo, StageKind, StageRegistry, MESH_AND_MOULD, REINFORCEMENT};
pub use status::{ActivityState, Status, TargetField};
pub use transition::{Engine, Outcome, TransitionReport, TransitionRequest};

#[cfg(test)]
mod tests;
