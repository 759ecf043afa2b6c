use chrono::NaiveDate;
use planner_server::entities::task::Priority;
use planner_server::task::{NewTask, TaskService, TaskServiceError};
use planner_server::task_type::{TaskTypeService, TaskTypeServiceError};
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

#[tokio::test]
async fn can_create_and_rename_task_type() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskTypeService::new(&state.db);

    let created = service
        .create("Bug".to_string())
        .await
        .expect("Failed to create task type");
    let renamed = service
        .update(created.id(), "Bugfix".to_string())
        .await
        .expect("Failed to update task type");
    assert_eq!(renamed.name(), "Bugfix");
}

#[tokio::test]
async fn rejects_duplicate_task_type_name() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskTypeService::new(&state.db);

    service
        .create("Feature".to_string())
        .await
        .expect("Failed to create task type");
    let result = service.create("Feature".to_string()).await;

    assert!(matches!(result, Err(TaskTypeServiceError::DuplicateName(_))));
}

#[tokio::test]
async fn deleting_a_task_type_cascades_to_its_tasks() {
    let state = setup().await.expect("Failed to setup test context");
    let type_service = TaskTypeService::new(&state.db);
    let task_service = TaskService::new(&state.db);

    let task_type = type_service
        .create("Chore".to_string())
        .await
        .expect("Failed to create task type");
    let task = task_service
        .create(NewTask {
            name: "Rotate credentials".to_string(),
            description: "Rotate the staging credentials".to_string(),
            deadline: deadline(1),
            priority: Priority::Medium,
            task_type_id: task_type.id(),
            assignee_ids: vec![],
        })
        .await
        .expect("Failed to create task");

    type_service
        .delete(task_type.id())
        .await
        .expect("Failed to delete task type");

    let result = task_service.get(task.id()).await;
    assert!(matches!(result, Err(TaskServiceError::NotFound(_))));
}

#[tokio::test]
async fn lists_tasks_of_a_type_ordered_by_deadline() {
    let state = setup().await.expect("Failed to setup test context");
    let type_service = TaskTypeService::new(&state.db);
    let task_service = TaskService::new(&state.db);

    let task_type = type_service
        .create("Release".to_string())
        .await
        .expect("Failed to create task type");
    for (name, day) in [("Ship v2", 20), ("Ship v1", 10)] {
        task_service
            .create(NewTask {
                name: name.to_string(),
                description: "Release work".to_string(),
                deadline: deadline(day),
                priority: Priority::High,
                task_type_id: task_type.id(),
                assignee_ids: vec![],
            })
            .await
            .expect("Failed to create task");
    }

    let (_, tasks) = type_service
        .get_with_tasks(task_type.id())
        .await
        .expect("Failed to fetch task type with tasks");
    let names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Ship v1", "Ship v2"]);
}
