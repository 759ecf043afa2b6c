pub mod position;
pub mod task;
pub mod task_assignees;
pub mod task_type;
pub mod worker;
