//! QC questionnaire answers.

use anyhow::Result;
use sqlx::PgConnection;

use super::{ActivityRow, Database, NewQcAnswer, QcAnswerRow};

/// Insert a batch of answers for `activity`, stamping its element and activity ids
/// and the submitting user. Answers are opaque: comments and image paths are
/// stored as given.
pub async fn insert_qc_answers(
    conn: &mut PgConnection,
    activity: &ActivityRow,
    user_id: i64,
    answers: &[NewQcAnswer],
) -> sqlx::Result<u64> {
    let mut inserted = 0;
    for answer in answers {
        inserted += sqlx::query(
            "INSERT INTO qc_answers (project_id, task_id, stage_id, activity_id, element_id,
                                     question_id, option_id, comment, image_path, user_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(answer.project_id)
        .bind(answer.task_id)
        .bind(answer.stage_id)
        .bind(activity.id)
        .bind(activity.element_id)
        .bind(answer.question_id)
        .bind(answer.option_id)
        .bind(&answer.comment)
        .bind(&answer.image_path)
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}

impl Database {
    pub async fn get_qc_answers(&self, activity_id: i64) -> Result<Vec<QcAnswerRow>> {
        let rows = sqlx::query_as::<_, QcAnswerRow>(
            "SELECT id, project_id, task_id, stage_id, activity_id, element_id, question_id,
                    option_id, comment, image_path, user_id, created_at
             FROM qc_answers WHERE activity_id = $1 ORDER BY id",
        )
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
