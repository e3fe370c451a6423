//! Status values and the six status fields carried by an activity row.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Progress of one stage (or sub-stage) on either the assignee or the QC side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(alias = "in_progress", alias = "inprogress")]
    InProgress,
    #[serde(alias = "completed")]
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::InProgress => "InProgress",
            Status::Completed => "Completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "InProgress" => Some(Status::InProgress),
            "Completed" => Some(Status::Completed),
            _ => None,
        }
    }

    pub fn is_completed(self) -> bool {
        self == Status::Completed
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One writable status column on the `activity` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetField {
    Status,
    QcStatus,
    MeshMoldStatus,
    MeshMoldQcStatus,
    ReinforcementStatus,
    ReinforcementQcStatus,
}

impl TargetField {
    pub const ALL: [TargetField; 6] = [
        TargetField::Status,
        TargetField::QcStatus,
        TargetField::MeshMoldStatus,
        TargetField::MeshMoldQcStatus,
        TargetField::ReinforcementStatus,
        TargetField::ReinforcementQcStatus,
    ];

    /// Column name. The set is closed, so interpolating it into SQL is safe.
    pub fn column(self) -> &'static str {
        match self {
            TargetField::Status => "status",
            TargetField::QcStatus => "qc_status",
            TargetField::MeshMoldStatus => "mesh_mold_status",
            TargetField::MeshMoldQcStatus => "mesh_mold_qc_status",
            TargetField::ReinforcementStatus => "reinforcement_status",
            TargetField::ReinforcementQcStatus => "reinforcement_qc_status",
        }
    }

    pub fn is_qc(self) -> bool {
        matches!(
            self,
            TargetField::QcStatus
                | TargetField::MeshMoldQcStatus
                | TargetField::ReinforcementQcStatus
        )
    }
}

/// Snapshot of the status columns of one activity.
///
/// Sub-stage columns are `None` ("blank") until first written; a blank sub-stage
/// is treated as in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityState {
    pub status: Status,
    pub qc_status: Status,
    pub mesh_mold_status: Option<Status>,
    pub mesh_mold_qc_status: Option<Status>,
    pub reinforcement_status: Option<Status>,
    pub reinforcement_qc_status: Option<Status>,
}

impl Default for ActivityState {
    fn default() -> Self {
        ActivityState {
            status: Status::InProgress,
            qc_status: Status::InProgress,
            mesh_mold_status: None,
            mesh_mold_qc_status: None,
            reinforcement_status: None,
            reinforcement_qc_status: None,
        }
    }
}

impl ActivityState {
    /// Build from the raw column strings of an activity row.
    pub fn from_columns(
        status: &str,
        qc_status: &str,
        mesh_mold_status: Option<&str>,
        mesh_mold_qc_status: Option<&str>,
        reinforcement_status: Option<&str>,
        reinforcement_qc_status: Option<&str>,
    ) -> Result<Self, CoreError> {
        fn required(col: &str, v: &str) -> Result<Status, CoreError> {
            Status::parse(v).ok_or_else(|| {
                CoreError::Internal(format!("activity.{} holds unknown status '{}'", col, v))
            })
        }
        fn optional(col: &str, v: Option<&str>) -> Result<Option<Status>, CoreError> {
            match v {
                None | Some("") => Ok(None),
                Some(v) => required(col, v).map(Some),
            }
        }
        Ok(ActivityState {
            status: required("status", status)?,
            qc_status: required("qc_status", qc_status)?,
            mesh_mold_status: optional("mesh_mold_status", mesh_mold_status)?,
            mesh_mold_qc_status: optional("mesh_mold_qc_status", mesh_mold_qc_status)?,
            reinforcement_status: optional("reinforcement_status", reinforcement_status)?,
            reinforcement_qc_status: optional(
                "reinforcement_qc_status",
                reinforcement_qc_status,
            )?,
        })
    }

    pub fn get(&self, field: TargetField) -> Option<Status> {
        match field {
            TargetField::Status => Some(self.status),
            TargetField::QcStatus => Some(self.qc_status),
            TargetField::MeshMoldStatus => self.mesh_mold_status,
            TargetField::MeshMoldQcStatus => self.mesh_mold_qc_status,
            TargetField::ReinforcementStatus => self.reinforcement_status,
            TargetField::ReinforcementQcStatus => self.reinforcement_qc_status,
        }
    }

    pub fn set(&mut self, field: TargetField, value: Status) {
        match field {
            TargetField::Status => self.status = value,
            TargetField::QcStatus => self.qc_status = value,
            TargetField::MeshMoldStatus => self.mesh_mold_status = Some(value),
            TargetField::MeshMoldQcStatus => self.mesh_mold_qc_status = Some(value),
            TargetField::ReinforcementStatus => self.reinforcement_status = Some(value),
            TargetField::ReinforcementQcStatus => self.reinforcement_qc_status = Some(value),
        }
    }

    pub fn is_completed(&self, field: TargetField) -> bool {
        self.get(field).is_some_and(Status::is_completed)
    }

    /// State after moving into a new stage: both top-level fields restart, and the
    /// sub-stage fields are blanked when leaving the parallel window.
    pub fn entering_stage(&self, leaving_window: bool) -> Self {
        let mut next = *self;
        next.status = Status::InProgress;
        next.qc_status = Status::InProgress;
        if leaving_window {
            next.mesh_mold_status = None;
            next.mesh_mold_qc_status = None;
            next.reinforcement_status = None;
            next.reinforcement_qc_status = None;
        }
        next
    }
}
