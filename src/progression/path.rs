//! Stage-path resolver.
//!
//! A [`StagePath`] is the ordered list of stage ids an element type travels
//! through. Construction rejects empty paths and repeated ids; [`StagePath::check`]
//! additionally verifies the path against the project's [`StageRegistry`].

use serde::Serialize;

use super::registry::{StageKind, StageRegistry};
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePath {
    element_type_id: i64,
    stages: Vec<i64>,
}

impl StagePath {
    pub fn new(element_type_id: i64, stages: Vec<i64>) -> Result<Self, CoreError> {
        if stages.is_empty() {
            return Err(CoreError::Configuration(format!(
                "element type {} has an empty stage path",
                element_type_id
            )));
        }
        for (i, id) in stages.iter().enumerate() {
            if stages[..i].contains(id) {
                return Err(CoreError::Configuration(format!(
                    "element type {} lists stage {} twice in its path",
                    element_type_id, id
                )));
            }
        }
        Ok(StagePath {
            element_type_id,
            stages,
        })
    }

    /// Verify every stage exists in the registry and that the parallel pair, when
    /// both members are on the path, sits side by side.
    pub fn check(&self, registry: &StageRegistry) -> Result<(), CoreError> {
        for id in &self.stages {
            if !registry.contains(*id) {
                return Err(CoreError::Configuration(format!(
                    "stage path of element type {} references unknown stage {}",
                    self.element_type_id, id
                )));
            }
        }
        let parallel: Vec<usize> = self
            .stages
            .iter()
            .enumerate()
            .filter(|(_, id)| {
                registry
                    .get(**id)
                    .is_some_and(|s| s.kind != StageKind::Regular)
            })
            .map(|(i, _)| i)
            .collect();
        if let [a, b] = parallel[..] {
            if b != a + 1 {
                return Err(CoreError::Configuration(format!(
                    "Mesh & Mould and Reinforcement are not adjacent in the path of element type {}",
                    self.element_type_id
                )));
            }
        }
        Ok(())
    }

    pub fn element_type_id(&self) -> i64 {
        self.element_type_id
    }

    pub fn stages(&self) -> &[i64] {
        &self.stages
    }

    pub fn first(&self) -> i64 {
        self.stages[0]
    }

    pub fn position(&self, stage_id: i64) -> Option<usize> {
        self.stages.iter().position(|id| *id == stage_id)
    }

    pub fn contains(&self, stage_id: i64) -> bool {
        self.position(stage_id).is_some()
    }

    /// Next stage; `None` when the stage is last or not on the path.
    pub fn successor_of(&self, stage_id: i64) -> Option<i64> {
        let i = self.position(stage_id)?;
        self.stages.get(i + 1).copied()
    }

    /// Previous stage; `None` when the stage is first or not on the path.
    pub fn predecessor_of(&self, stage_id: i64) -> Option<i64> {
        let i = self.position(stage_id)?;
        i.checked_sub(1).map(|j| self.stages[j])
    }
}
