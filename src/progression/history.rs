//! Production-history reader: audit events grouped per `(activity, stage)`.

use serde::Serialize;

use crate::db::ProductionEventRow;

#[derive(Debug, Clone, Serialize)]
pub struct StageHistory {
    pub activity_id: i64,
    pub stage_id: i64,
    pub events: Vec<ProductionEventRow>,
}

/// Group events by `(activity_id, stage_id)`. Input must already be in write
/// order; events keep that order within a group and groups are ordered by their
/// first event.
pub fn group_by_stage(events: Vec<ProductionEventRow>) -> Vec<StageHistory> {
    let mut groups: Vec<StageHistory> = Vec::new();
    for event in events {
        match groups
            .iter_mut()
            .find(|g| g.activity_id == event.activity_id && g.stage_id == event.stage_id)
        {
            Some(group) => group.events.push(event),
            None => groups.push(StageHistory {
                activity_id: event.activity_id,
                stage_id: event.stage_id,
                events: vec![event],
            }),
        }
    }
    groups
}
