//! Activity creation: adopting a task's elements into their first stage.

use serde::Serialize;
use tracing::info;

use super::path::StagePath;
use super::registry::{StageInfo, StageRegistry};
use crate::db::activities::{self, StageBinding};
use crate::db::{projects, stages, Database};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize)]
pub struct Adoption {
    pub task_id: i64,
    pub stage_id: i64,
    pub stage_name: String,
    pub activity_ids: Vec<i64>,
}

/// Stage new activities start in: the task's start stage when it is on the path,
/// otherwise the first stage of the path.
pub fn start_stage(path: &StagePath, task_start: Option<i64>) -> i64 {
    task_start
        .filter(|id| path.contains(*id))
        .unwrap_or_else(|| path.first())
}

/// Create one activity per element, all in one transaction.
pub async fn adopt_elements(
    db: &Database,
    task_id: i64,
    element_ids: &[i64],
    stockyard_id: Option<i64>,
) -> CoreResult<Adoption> {
    if element_ids.is_empty() {
        return Err(CoreError::InvalidInput("element_ids is empty".into()));
    }
    let mut ids = element_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut tx = db.pool().begin().await?;
    let task = activities::fetch_task(&mut tx, task_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task {}", task_id)))?;
    let stage_ids = stages::fetch_stage_path(&mut tx, task.element_type_id)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound(format!("stage path for element type {}", task.element_type_id))
        })?;
    let path = StagePath::new(task.element_type_id, stage_ids)?;
    let registry = StageRegistry::new(
        stages::fetch_project_stages(&mut tx, task.project_id)
            .await?
            .into_iter()
            .map(StageInfo::try_from)
            .collect::<Result<Vec<_>, _>>()?,
    )?;
    path.check(&registry)?;
    if let Some(yard) = stockyard_id {
        match projects::fetch_stockyard_project(&mut tx, yard).await? {
            Some(project_id) if project_id == task.project_id => {}
            Some(_) => {
                return Err(CoreError::InvalidInput(format!(
                    "stockyard {} belongs to another project",
                    yard
                )))
            }
            None => return Err(CoreError::NotFound(format!("stockyard {}", yard))),
        }
    }
    let start = registry.resolve(start_stage(&path, task.start_stage_id))?;

    let mut activity_ids = Vec::with_capacity(ids.len());
    for element_id in ids {
        let element = activities::lock_element(&mut tx, element_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("element {}", element_id)))?;
        if element.project_id != task.project_id || element.element_type_id != task.element_type_id
        {
            return Err(CoreError::InvalidInput(format!(
                "element {} does not belong to project {} with element type {}",
                element_id, task.project_id, task.element_type_id
            )));
        }
        let id = activities::insert_activity(
            &mut tx,
            &task,
            element_id,
            StageBinding {
                stage_id: start.id,
                assigned_to: start.assigned_to,
                qc_id: start.qc_id,
                paper_id: start.paper_id,
            },
            stockyard_id,
        )
        .await
        .map_err(|e| match CoreError::from(e) {
            CoreError::ConflictingState(_) => CoreError::ConflictingState(format!(
                "element {} already has an open activity",
                element_id
            )),
            other => other,
        })?;
        activities::set_element_stage(&mut tx, element_id, &start.name).await?;
        activity_ids.push(id);
    }
    tx.commit().await?;

    info!(task_id, stage_id = start.id, count = activity_ids.len(), "elements adopted");
    Ok(Adoption {
        task_id,
        stage_id: start.id,
        stage_name: start.name.clone(),
        activity_ids,
    })
}
