use crate::entities::*;
use crate::forms::contains_pattern;
use crate::pagination::{Page, fetch_page};
use sea_orm::sea_query::{Expr, extension::postgres::PgExpr};
use sea_orm::*;

pub mod web;

/// A worker with its position resolved, ready for display.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Worker {
    id: i32,
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    position_id: Option<i32>,
    position: Option<String>,
}

impl Worker {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn position_id(&self) -> Option<i32> {
        self.position_id
    }

    pub fn position(&self) -> Option<&str> {
        self.position.as_deref()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl From<(worker::Model, Option<position::Model>)> for Worker {
    fn from((model, position): (worker::Model, Option<position::Model>)) -> Self {
        Self {
            id: model.id,
            username: model.username,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            position_id: model.position_id,
            position: position.map(|p| p.name),
        }
    }
}

/// A task assigned to a worker, as listed on the worker detail page.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct AssignedTask {
    pub id: i32,
    pub name: String,
    pub deadline: chrono::NaiveDateTime,
    pub priority: task::Priority,
    pub is_completed: bool,
}

impl From<task::Model> for AssignedTask {
    fn from(model: task::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            deadline: model.deadline,
            priority: model.priority,
            is_completed: model.is_completed,
        }
    }
}

/// Field values for creating a worker. The password arrives already hashed.
#[derive(Debug, Clone)]
pub struct NewWorker {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position_id: Option<i32>,
}

/// Field values for updating a worker. Updates never touch the password.
#[derive(Debug, Clone)]
pub struct WorkerChanges {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position_id: Option<i32>,
}

/// Error type for WorkerService operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerServiceError {
    #[error("Username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("Worker with ID {0} not found")]
    NotFound(i32),
    #[error("Position with ID {0} not found")]
    UnknownPosition(i32),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct WorkerService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl WorkerService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> WorkerService {
        WorkerService { db }
    }

    /// Returns one page of workers ordered by username with their positions
    /// resolved. The query matches username, first name or last name as a
    /// case-insensitive substring; an empty query returns everyone.
    #[tracing::instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<Worker>, WorkerServiceError> {
        let mut select = worker::Entity::find()
            .find_also_related(position::Entity)
            .order_by_asc(worker::Column::Username);
        if !query.is_empty() {
            let pattern = contains_pattern(query);
            select = select.filter(
                Condition::any()
                    .add(Expr::col(worker::Column::Username).ilike(pattern.clone()))
                    .add(Expr::col(worker::Column::FirstName).ilike(pattern.clone()))
                    .add(Expr::col(worker::Column::LastName).ilike(pattern)),
            );
        }
        let paginator = select.paginate(self.db, page_size);
        let page = fetch_page(&paginator, page).await?;
        Ok(page.map(Worker::from))
    }

    /// Retrieves all workers ordered by username, for assignee select inputs.
    #[tracing::instrument(skip(self))]
    pub async fn all(&self) -> Result<Vec<Worker>, WorkerServiceError> {
        let workers = worker::Entity::find()
            .find_also_related(position::Entity)
            .order_by_asc(worker::Column::Username)
            .all(self.db)
            .await?
            .into_iter()
            .map(Worker::from)
            .collect();
        Ok(workers)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<Worker, WorkerServiceError> {
        let found = worker::Entity::find_by_id(id)
            .find_also_related(position::Entity)
            .one(self.db)
            .await?
            .ok_or(WorkerServiceError::NotFound(id))?;
        Ok(Worker::from(found))
    }

    /// Retrieves the tasks assigned to a worker, ordered by deadline.
    #[tracing::instrument(skip(self))]
    pub async fn assigned_tasks(&self, id: i32) -> Result<Vec<AssignedTask>, WorkerServiceError> {
        let model = worker::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(WorkerServiceError::NotFound(id))?;
        let tasks = model
            .find_related(task::Entity)
            .order_by_asc(task::Column::Deadline)
            .all(self.db)
            .await?
            .into_iter()
            .map(AssignedTask::from)
            .collect();
        Ok(tasks)
    }

    /// Looks a worker up by username. Used by the login flow.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<worker::Model>, WorkerServiceError> {
        Ok(worker::Entity::find()
            .filter(worker::Column::Username.eq(username))
            .one(self.db)
            .await?)
    }

    #[tracing::instrument(skip(self, new_worker))]
    pub async fn create(&self, new_worker: NewWorker) -> Result<Worker, WorkerServiceError> {
        if self.username_exists(&new_worker.username, None).await? {
            return Err(WorkerServiceError::DuplicateUsername(new_worker.username));
        }
        self.check_position(new_worker.position_id).await?;

        let active_model = worker::ActiveModel {
            username: ActiveValue::Set(new_worker.username),
            password_hash: ActiveValue::Set(new_worker.password_hash),
            first_name: ActiveValue::Set(new_worker.first_name),
            last_name: ActiveValue::Set(new_worker.last_name),
            email: ActiveValue::Set(new_worker.email),
            is_staff: ActiveValue::Set(false),
            is_superuser: ActiveValue::Set(false),
            position_id: ActiveValue::Set(new_worker.position_id),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        self.get(created_model.id).await
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: i32,
        changes: WorkerChanges,
    ) -> Result<Worker, WorkerServiceError> {
        let model = worker::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(WorkerServiceError::NotFound(id))?;

        if self.username_exists(&changes.username, Some(id)).await? {
            return Err(WorkerServiceError::DuplicateUsername(changes.username));
        }
        self.check_position(changes.position_id).await?;

        let mut active_model: worker::ActiveModel = model.into();
        active_model.username = ActiveValue::Set(changes.username);
        active_model.first_name = ActiveValue::Set(changes.first_name);
        active_model.last_name = ActiveValue::Set(changes.last_name);
        active_model.email = ActiveValue::Set(changes.email);
        active_model.position_id = ActiveValue::Set(changes.position_id);
        let updated_model = active_model.update(self.db).await?;
        self.get(updated_model.id).await
    }

    /// Deletes a worker. Tasks survive; only the assignment rows go with it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<Worker, WorkerServiceError> {
        let deleted = self.get(id).await?;
        worker::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(deleted)
    }

    #[tracing::instrument(skip(self))]
    pub async fn count(&self) -> Result<u64, WorkerServiceError> {
        Ok(worker::Entity::find().count(self.db).await?)
    }

    async fn username_exists(
        &self,
        username: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, WorkerServiceError> {
        let mut select = worker::Entity::find().filter(worker::Column::Username.eq(username));
        if let Some(id) = exclude_id {
            select = select.filter(worker::Column::Id.ne(id));
        }
        Ok(select.one(self.db).await?.is_some())
    }

    async fn check_position(&self, position_id: Option<i32>) -> Result<(), WorkerServiceError> {
        if let Some(position_id) = position_id {
            let exists = position::Entity::find_by_id(position_id)
                .one(self.db)
                .await?
                .is_some();
            if !exists {
                return Err(WorkerServiceError::UnknownPosition(position_id));
            }
        }
        Ok(())
    }
}
