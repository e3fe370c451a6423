//! Stage registry: per-project lookup of stage bindings and stage kind.
//!
//! Two stage names are reserved: `"Mesh & Mould"` and `"Reinforcement"`. They form
//! the parallel pair. A stage row may carry an explicit `kind`; when it does not,
//! the kind is derived from the reserved names, compared case-insensitively.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::CoreError;

pub const MESH_AND_MOULD: &str = "Mesh & Mould";
pub const REINFORCEMENT: &str = "Reinforcement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Regular,
    MeshMould,
    Reinforcement,
}

impl StageKind {
    /// Kind implied by a stage name alone.
    pub fn classify(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case(MESH_AND_MOULD) {
            StageKind::MeshMould
        } else if name.eq_ignore_ascii_case(REINFORCEMENT) {
            StageKind::Reinforcement
        } else {
            StageKind::Regular
        }
    }

    /// Resolve from the optional `kind` column, falling back to the name.
    pub fn resolve(kind: Option<&str>, name: &str) -> Result<Self, CoreError> {
        match kind {
            None | Some("") => Ok(Self::classify(name)),
            Some("regular") => Ok(StageKind::Regular),
            Some("mesh_mould") => Ok(StageKind::MeshMould),
            Some("reinforcement") => Ok(StageKind::Reinforcement),
            Some(other) => Err(CoreError::Configuration(format!(
                "stage '{}' has unknown kind '{}'",
                name, other
            ))),
        }
    }

    pub fn is_parallel(self) -> bool {
        !matches!(self, StageKind::Regular)
    }
}

/// Resolved view of one project stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub kind: StageKind,
    pub order: i32,
    pub assigned_to: Option<i64>,
    pub qc_assign: bool,
    pub qc_id: Option<i64>,
    pub paper_id: Option<i64>,
    pub completion_stage: bool,
    pub inventory_deduction: bool,
}

/// All stages of one project, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<i64, StageInfo>,
    mesh_mould: Option<i64>,
    reinforcement: Option<i64>,
}

impl StageRegistry {
    /// Build a registry, enforcing the per-project stage invariants: unique order,
    /// at most one stage of each parallel kind, and a QC user on every QC stage.
    pub fn new(stages: Vec<StageInfo>) -> Result<Self, CoreError> {
        let mut reg = StageRegistry::default();
        let mut orders: HashMap<(i64, i32), i64> = HashMap::new();
        for stage in stages {
            if let Some(other) = orders.insert((stage.project_id, stage.order), stage.id) {
                return Err(CoreError::Configuration(format!(
                    "stages {} and {} share order {} in project {}",
                    other, stage.id, stage.order, stage.project_id
                )));
            }
            if stage.qc_assign && stage.qc_id.is_none() {
                return Err(CoreError::Configuration(format!(
                    "stage '{}' ({}) requires QC but has no QC user",
                    stage.name, stage.id
                )));
            }
            let slot = match stage.kind {
                StageKind::MeshMould => Some(&mut reg.mesh_mould),
                StageKind::Reinforcement => Some(&mut reg.reinforcement),
                StageKind::Regular => None,
            };
            if let Some(slot) = slot {
                if let Some(existing) = slot.replace(stage.id) {
                    return Err(CoreError::Configuration(format!(
                        "project {} has two {:?} stages ({} and {})",
                        stage.project_id, stage.kind, existing, stage.id
                    )));
                }
            }
            reg.stages.insert(stage.id, stage);
        }
        Ok(reg)
    }

    /// Bindings of one stage.
    pub fn resolve(&self, stage_id: i64) -> Result<&StageInfo, CoreError> {
        self.stages
            .get(&stage_id)
            .ok_or_else(|| CoreError::NotFound(format!("stage {}", stage_id)))
    }

    pub fn get(&self, stage_id: i64) -> Option<&StageInfo> {
        self.stages.get(&stage_id)
    }

    pub fn contains(&self, stage_id: i64) -> bool {
        self.stages.contains_key(&stage_id)
    }

    /// Lookup by name: case-insensitive for the two reserved names, exact otherwise.
    pub fn find_by_name(&self, project_id: i64, name: &str) -> Option<i64> {
        match StageKind::classify(name) {
            StageKind::MeshMould => self.mesh_mould.filter(|id| self.in_project(*id, project_id)),
            StageKind::Reinforcement => {
                self.reinforcement.filter(|id| self.in_project(*id, project_id))
            }
            StageKind::Regular => self
                .stages
                .values()
                .find(|s| s.project_id == project_id && s.name == name)
                .map(|s| s.id),
        }
    }

    pub fn mesh_mould(&self) -> Option<&StageInfo> {
        self.mesh_mould.and_then(|id| self.stages.get(&id))
    }

    pub fn reinforcement(&self) -> Option<&StageInfo> {
        self.reinforcement.and_then(|id| self.stages.get(&id))
    }

    fn in_project(&self, stage_id: i64, project_id: i64) -> bool {
        self.stages
            .get(&stage_id)
            .is_some_and(|s| s.project_id == project_id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: i64, name: &str, order: i32) -> StageInfo {
        StageInfo {
            id,
            project_id: 1,
            name: name.to_string(),
            kind: StageKind::classify(name),
            order,
            assigned_to: None,
            qc_assign: false,
            qc_id: None,
            paper_id: None,
            completion_stage: false,
            inventory_deduction: false,
        }
    }

    #[test]
    fn classify_reserved_names_case_insensitively() {
        assert_eq!(StageKind::classify("Mesh & Mould"), StageKind::MeshMould);
        assert_eq!(StageKind::classify("mesh & mould"), StageKind::MeshMould);
        assert_eq!(StageKind::classify(" REINFORCEMENT "), StageKind::Reinforcement);
        assert_eq!(StageKind::classify("Curing"), StageKind::Regular);
        assert_eq!(StageKind::classify("Mesh and Mould"), StageKind::Regular);
    }

    #[test]
    fn explicit_kind_overrides_name() {
        assert_eq!(
            StageKind::resolve(Some("reinforcement"), "Rebar cage").unwrap(),
            StageKind::Reinforcement
        );
        assert_eq!(
            StageKind::resolve(None, "Reinforcement").unwrap(),
            StageKind::Reinforcement
        );
        assert!(StageKind::resolve(Some("parallel"), "x").is_err());
    }

    #[test]
    fn registry_rejects_duplicate_parallel_stage() {
        let err = StageRegistry::new(vec![
            stage(1, "Mesh & Mould", 1),
            stage(2, "mesh & mould", 2),
        ])
        .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn registry_rejects_duplicate_order() {
        let err = StageRegistry::new(vec![stage(1, "Casting", 1), stage(2, "Curing", 1)])
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn registry_rejects_qc_stage_without_qc_user() {
        let mut s = stage(1, "Casting", 1);
        s.qc_assign = true;
        assert!(StageRegistry::new(vec![s]).is_err());
    }

    #[test]
    fn find_by_name_uses_reserved_slots() {
        let reg = StageRegistry::new(vec![
            stage(10, "Casting", 1),
            stage(30, "Mesh & Mould", 2),
            stage(40, "Reinforcement", 3),
        ])
        .unwrap();
        assert_eq!(reg.find_by_name(1, "MESH & MOULD"), Some(30));
        assert_eq!(reg.find_by_name(1, "reinforcement"), Some(40));
        assert_eq!(reg.find_by_name(1, "Casting"), Some(10));
        assert_eq!(reg.find_by_name(1, "casting"), None);
        assert_eq!(reg.find_by_name(2, "Reinforcement"), None);
        assert_eq!(reg.mesh_mould().map(|s| s.id), Some(30));
    }

    #[test]
    fn resolve_unknown_stage_is_not_found() {
        let reg = StageRegistry::new(vec![stage(10, "Casting", 1)]).unwrap();
        assert!(matches!(reg.resolve(99), Err(CoreError::NotFound(_))));
        assert_eq!(reg.resolve(10).unwrap().name, "Casting");
    }
}
