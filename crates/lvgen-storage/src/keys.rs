//! Object key layout: `tasks/{owner}/{task}/...`.

use lvgen_models::TaskId;

fn task_prefix(owner_id: &str, task_id: &TaskId) -> String {
    format!("tasks/{}/{}/", owner_id, task_id)
}

pub fn combined_key(owner_id: &str, task_id: &TaskId) -> String {
    format!("{}combined.mp4", task_prefix(owner_id, task_id))
}

pub fn thumbnail_key(owner_id: &str, task_id: &TaskId) -> String {
    format!("{}thumbnail.jpg", task_prefix(owner_id, task_id))
}
