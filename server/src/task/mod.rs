use crate::entities::task::Priority;
use crate::entities::*;
use crate::forms::contains_pattern;
use crate::pagination::{Page, fetch_page};
use sea_orm::sea_query::{Expr, extension::postgres::PgExpr};
use sea_orm::*;

pub mod web;

/// A task with its type and assignees resolved, ready for display.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    name: String,
    description: String,
    deadline: chrono::NaiveDateTime,
    is_completed: bool,
    priority: Priority,
    task_type_id: i32,
    task_type: String,
    assignees: Vec<Assignee>,
}

impl Task {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn deadline(&self) -> chrono::NaiveDateTime {
        self.deadline
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn task_type_id(&self) -> i32 {
        self.task_type_id
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn assignees(&self) -> &[Assignee] {
        &self.assignees
    }

    pub fn assignee_ids(&self) -> Vec<i32> {
        self.assignees.iter().map(|a| a.id).collect()
    }

    pub fn is_assigned_to(&self, username: &str) -> bool {
        self.assignees.iter().any(|a| a.username == username)
    }
}

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Assignee {
    pub id: i32,
    pub username: String,
}

impl From<worker::Model> for Assignee {
    fn from(model: worker::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
        }
    }
}

/// Field values for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub deadline: chrono::NaiveDateTime,
    pub priority: Priority,
    pub task_type_id: i32,
    pub assignee_ids: Vec<i32>,
}

/// Field values for updating a task. The completion flag is untouched; it is
/// only changed through the dedicated toggle.
#[derive(Debug, Clone)]
pub struct TaskChanges {
    pub name: String,
    pub description: String,
    pub deadline: chrono::NaiveDateTime,
    pub priority: Priority,
    pub task_type_id: i32,
    pub assignee_ids: Vec<i32>,
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    #[error("Task named '{0}' already exists")]
    DuplicateName(String),
    #[error("Task with ID {0} not found")]
    NotFound(i32),
    #[error("Task type with ID {0} not found")]
    UnknownTaskType(i32),
    #[error("Worker with ID {0} not found")]
    UnknownAssignee(i32),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskService {
        TaskService { db }
    }

    /// Returns one page of tasks ordered by deadline ascending with task type
    /// and assignees resolved. The filter matches the task name as a
    /// case-insensitive substring; an empty filter returns every task.
    #[tracing::instrument(skip(self))]
    pub async fn search(
        &self,
        name_filter: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<Task>, TaskServiceError> {
        let mut select = task::Entity::find()
            .find_also_related(task_type::Entity)
            .order_by_asc(task::Column::Deadline);
        if !name_filter.is_empty() {
            select =
                select.filter(Expr::col(task::Column::Name).ilike(contains_pattern(name_filter)));
        }
        let paginator = select.paginate(self.db, page_size);
        let page = fetch_page(&paginator, page).await?;
        self.resolve_page(page).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<Task, TaskServiceError> {
        let (model, task_type) = task::Entity::find_by_id(id)
            .find_also_related(task_type::Entity)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::NotFound(id))?;
        let assignees = model
            .find_related(worker::Entity)
            .order_by_asc(worker::Column::Username)
            .all(self.db)
            .await?
            .into_iter()
            .map(Assignee::from)
            .collect();
        Ok(Self::into_task(model, task_type, assignees))
    }

    #[tracing::instrument(skip(self, new_task))]
    pub async fn create(&self, new_task: NewTask) -> Result<Task, TaskServiceError> {
        if self.name_exists(&new_task.name, None).await? {
            return Err(TaskServiceError::DuplicateName(new_task.name));
        }
        self.check_task_type(new_task.task_type_id).await?;
        self.check_assignees(&new_task.assignee_ids).await?;

        let active_model = task::ActiveModel {
            name: ActiveValue::Set(new_task.name),
            description: ActiveValue::Set(new_task.description),
            deadline: ActiveValue::Set(new_task.deadline),
            is_completed: ActiveValue::Set(false),
            priority: ActiveValue::Set(new_task.priority),
            task_type_id: ActiveValue::Set(new_task.task_type_id),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        self.set_assignees(created_model.id, &new_task.assignee_ids)
            .await?;
        self.get(created_model.id).await
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update(&self, id: i32, changes: TaskChanges) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::NotFound(id))?;

        if self.name_exists(&changes.name, Some(id)).await? {
            return Err(TaskServiceError::DuplicateName(changes.name));
        }
        self.check_task_type(changes.task_type_id).await?;
        self.check_assignees(&changes.assignee_ids).await?;

        let mut active_model: task::ActiveModel = model.into();
        active_model.name = ActiveValue::Set(changes.name);
        active_model.description = ActiveValue::Set(changes.description);
        active_model.deadline = ActiveValue::Set(changes.deadline);
        active_model.priority = ActiveValue::Set(changes.priority);
        active_model.task_type_id = ActiveValue::Set(changes.task_type_id);
        let updated_model = active_model.update(self.db).await?;

        task_assignees::Entity::delete_many()
            .filter(task_assignees::Column::TaskId.eq(id))
            .exec(self.db)
            .await?;
        self.set_assignees(updated_model.id, &changes.assignee_ids)
            .await?;
        self.get(updated_model.id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<Task, TaskServiceError> {
        let deleted = self.get(id).await?;
        task::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(deleted)
    }

    /// Flips the completion flag and returns the new value.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_completed(&self, id: i32) -> Result<bool, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::NotFound(id))?;

        let flipped = !model.is_completed;
        let mut active_model: task::ActiveModel = model.into();
        active_model.is_completed = ActiveValue::Set(flipped);
        active_model.update(self.db).await?;
        Ok(flipped)
    }

    /// Assigns the worker to the task if not yet assigned, otherwise
    /// unassigns them. Returns whether the worker is assigned afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_assignment(
        &self,
        task_id: i32,
        worker_id: i32,
    ) -> Result<bool, TaskServiceError> {
        let existing = task_assignees::Entity::find_by_id((task_id, worker_id))
            .one(self.db)
            .await?;

        match existing {
            Some(row) => {
                row.delete(self.db).await?;
                Ok(false)
            }
            None => {
                task::Entity::find_by_id(task_id)
                    .one(self.db)
                    .await?
                    .ok_or(TaskServiceError::NotFound(task_id))?;
                let row = task_assignees::ActiveModel {
                    task_id: ActiveValue::Set(task_id),
                    worker_id: ActiveValue::Set(worker_id),
                };
                row.insert(self.db).await?;
                Ok(true)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn count(&self) -> Result<u64, TaskServiceError> {
        Ok(task::Entity::find().count(self.db).await?)
    }

    async fn resolve_page(
        &self,
        page: Page<(task::Model, Option<task_type::Model>)>,
    ) -> Result<Page<Task>, TaskServiceError> {
        let models: Vec<task::Model> = page.items.iter().map(|(t, _)| t.clone()).collect();
        let assignees = models
            .load_many_to_many(worker::Entity, task_assignees::Entity, self.db)
            .await?;

        let mut assignees = assignees.into_iter();
        Ok(page.map(|(model, task_type)| {
            let mut task_assignees: Vec<Assignee> = assignees
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(Assignee::from)
                .collect();
            task_assignees.sort_by(|a, b| a.username.cmp(&b.username));
            Self::into_task(model, task_type, task_assignees)
        }))
    }

    fn into_task(
        model: task::Model,
        task_type: Option<task_type::Model>,
        assignees: Vec<Assignee>,
    ) -> Task {
        Task {
            id: model.id,
            name: model.name,
            description: model.description,
            deadline: model.deadline,
            is_completed: model.is_completed,
            priority: model.priority,
            task_type_id: model.task_type_id,
            task_type: task_type.map(|t| t.name).unwrap_or_default(),
            assignees,
        }
    }

    async fn set_assignees(&self, task_id: i32, worker_ids: &[i32]) -> Result<(), TaskServiceError> {
        if worker_ids.is_empty() {
            return Ok(());
        }
        let rows: Vec<task_assignees::ActiveModel> = worker_ids
            .iter()
            .map(|&worker_id| task_assignees::ActiveModel {
                task_id: ActiveValue::Set(task_id),
                worker_id: ActiveValue::Set(worker_id),
            })
            .collect();
        task_assignees::Entity::insert_many(rows).exec(self.db).await?;
        Ok(())
    }

    async fn name_exists(
        &self,
        name: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, TaskServiceError> {
        let mut select = task::Entity::find().filter(task::Column::Name.eq(name));
        if let Some(id) = exclude_id {
            select = select.filter(task::Column::Id.ne(id));
        }
        Ok(select.one(self.db).await?.is_some())
    }

    async fn check_task_type(&self, task_type_id: i32) -> Result<(), TaskServiceError> {
        let exists = task_type::Entity::find_by_id(task_type_id)
            .one(self.db)
            .await?
            .is_some();
        if !exists {
            return Err(TaskServiceError::UnknownTaskType(task_type_id));
        }
        Ok(())
    }

    async fn check_assignees(&self, worker_ids: &[i32]) -> Result<(), TaskServiceError> {
        for &worker_id in worker_ids {
            let exists = worker::Entity::find_by_id(worker_id)
                .one(self.db)
                .await?
                .is_some();
            if !exists {
                return Err(TaskServiceError::UnknownAssignee(worker_id));
            }
        }
        Ok(())
    }
}
