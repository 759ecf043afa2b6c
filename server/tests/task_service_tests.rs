use chrono::NaiveDate;
use planner_server::auth::hash_password;
use planner_server::entities::task::Priority;
use planner_server::task::{NewTask, TaskChanges, TaskService, TaskServiceError};
use planner_server::task_type::TaskTypeService;
use planner_server::worker::{NewWorker, WorkerService};
use sea_orm::DatabaseConnection;
use testcontainers_modules::{postgres, testcontainers};

mod common;

pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let container = common::setup_container().await?;
    let db = common::setup_db(&container).await?;
    Ok(TestContext { db, container })
}

fn deadline(day: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

async fn seed_task_type(db: &DatabaseConnection) -> i32 {
    TaskTypeService::new(db)
        .create("General".to_string())
        .await
        .expect("Failed to create task type")
        .id()
}

async fn seed_worker(db: &DatabaseConnection, username: &str) -> i32 {
    WorkerService::new(db)
        .create(NewWorker {
            username: username.to_string(),
            password_hash: hash_password("test-password").expect("Failed to hash password"),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            position_id: None,
        })
        .await
        .expect("Failed to create worker")
        .id()
}

fn new_task(name: &str, day: u32, task_type_id: i32, assignee_ids: Vec<i32>) -> NewTask {
    NewTask {
        name: name.to_string(),
        description: format!("{name} description"),
        deadline: deadline(day),
        priority: Priority::Medium,
        task_type_id,
        assignee_ids,
    }
}

#[tokio::test]
async fn can_create_task_with_assignees() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;
    let worker_b = seed_worker(&state.db, "bob").await;
    let worker_a = seed_worker(&state.db, "alice").await;

    let task = task_service
        .create(new_task("Write docs", 5, task_type_id, vec![worker_b, worker_a]))
        .await
        .expect("Failed to create task");

    assert_eq!(task.name(), "Write docs");
    assert_eq!(task.task_type(), "General");
    assert!(!task.is_completed());
    // Assignees come back ordered by username.
    let usernames: Vec<&str> = task.assignees().iter().map(|a| a.username.as_str()).collect();
    assert_eq!(usernames, ["alice", "bob"]);
}

#[tokio::test]
async fn rejects_duplicate_task_name() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;

    task_service
        .create(new_task("Unique", 1, task_type_id, vec![]))
        .await
        .expect("Failed to create task");
    let result = task_service
        .create(new_task("Unique", 2, task_type_id, vec![]))
        .await;

    assert!(matches!(result, Err(TaskServiceError::DuplicateName(_))));
}

#[tokio::test]
async fn rejects_unknown_task_type_and_assignee() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;

    let result = task_service.create(new_task("Bad type", 1, 9999, vec![])).await;
    assert!(matches!(result, Err(TaskServiceError::UnknownTaskType(9999))));

    let result = task_service
        .create(new_task("Bad assignee", 1, task_type_id, vec![9999]))
        .await;
    assert!(matches!(result, Err(TaskServiceError::UnknownAssignee(9999))));
}

#[tokio::test]
async fn search_orders_by_deadline_and_paginates() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;

    // Insert out of order; six tasks means a full page of five plus one.
    for (name, day) in [
        ("Task F", 6),
        ("Task A", 1),
        ("Task D", 4),
        ("Task B", 2),
        ("Task E", 5),
        ("Task C", 3),
    ] {
        task_service
            .create(new_task(name, day, task_type_id, vec![]))
            .await
            .expect("Failed to create task");
    }

    let first_page = task_service
        .search("", 1, 5)
        .await
        .expect("Failed to search tasks");
    assert_eq!(first_page.total_items, 6);
    assert_eq!(first_page.total_pages, 2);
    let names: Vec<&str> = first_page.items.iter().map(|t| t.name()).collect();
    assert_eq!(names, ["Task A", "Task B", "Task C", "Task D", "Task E"]);

    let second_page = task_service
        .search("", 2, 5)
        .await
        .expect("Failed to search tasks");
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.items[0].name(), "Task F");
}

#[tokio::test]
async fn search_filters_by_name_substring() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;

    for (name, day) in [("Deploy backend", 1), ("Deploy frontend", 2), ("Write docs", 3)] {
        task_service
            .create(new_task(name, day, task_type_id, vec![]))
            .await
            .expect("Failed to create task");
    }

    let page = task_service
        .search("DEPLOY", 1, 10)
        .await
        .expect("Failed to search tasks");
    assert_eq!(page.total_items, 2);
}

#[tokio::test]
async fn update_preserves_completion_flag() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;
    let worker_id = seed_worker(&state.db, "carol").await;

    let task = task_service
        .create(new_task("Editable", 1, task_type_id, vec![]))
        .await
        .expect("Failed to create task");
    task_service
        .toggle_completed(task.id())
        .await
        .expect("Failed to toggle task");

    let updated = task_service
        .update(
            task.id(),
            TaskChanges {
                name: "Edited".to_string(),
                description: "New description".to_string(),
                deadline: deadline(9),
                priority: Priority::Urgent,
                task_type_id,
                assignee_ids: vec![worker_id],
            },
        )
        .await
        .expect("Failed to update task");

    assert_eq!(updated.name(), "Edited");
    assert_eq!(updated.priority(), Priority::Urgent);
    assert!(updated.is_completed());
    assert_eq!(updated.assignee_ids(), [worker_id]);
}

#[tokio::test]
async fn double_toggle_restores_completion_state() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;

    let task = task_service
        .create(new_task("Flip me", 1, task_type_id, vec![]))
        .await
        .expect("Failed to create task");

    assert!(task_service
        .toggle_completed(task.id())
        .await
        .expect("Failed to toggle task"));
    assert!(!task_service
        .toggle_completed(task.id())
        .await
        .expect("Failed to toggle task"));

    let fetched = task_service.get(task.id()).await.expect("Failed to fetch task");
    assert!(!fetched.is_completed());
}

#[tokio::test]
async fn double_toggle_restores_assignment_state() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;
    let worker_id = seed_worker(&state.db, "dave").await;

    let task = task_service
        .create(new_task("Claim me", 1, task_type_id, vec![]))
        .await
        .expect("Failed to create task");

    assert!(task_service
        .toggle_assignment(task.id(), worker_id)
        .await
        .expect("Failed to toggle assignment"));
    assert!(!task_service
        .toggle_assignment(task.id(), worker_id)
        .await
        .expect("Failed to toggle assignment"));

    let fetched = task_service.get(task.id()).await.expect("Failed to fetch task");
    assert!(fetched.assignees().is_empty());
}

#[tokio::test]
async fn toggling_a_missing_task_reports_not_found() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);

    let result = task_service.toggle_completed(9999).await;
    assert!(matches!(result, Err(TaskServiceError::NotFound(9999))));
}

#[tokio::test]
async fn delete_removes_task_and_assignments() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let worker_service = WorkerService::new(&state.db);
    let task_type_id = seed_task_type(&state.db).await;
    let worker_id = seed_worker(&state.db, "erin").await;

    let task = task_service
        .create(new_task("Doomed", 1, task_type_id, vec![worker_id]))
        .await
        .expect("Failed to create task");
    task_service
        .delete(task.id())
        .await
        .expect("Failed to delete task");

    let result = task_service.get(task.id()).await;
    assert!(matches!(result, Err(TaskServiceError::NotFound(_))));

    let assigned = worker_service
        .assigned_tasks(worker_id)
        .await
        .expect("Failed to list assigned tasks");
    assert!(assigned.is_empty());
}
