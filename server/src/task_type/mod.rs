use crate::entities::*;
use crate::forms::contains_pattern;
use crate::pagination::{Page, fetch_page};
use sea_orm::sea_query::{Expr, extension::postgres::PgExpr};
use sea_orm::*;

pub mod web;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct TaskType {
    id: i32,
    name: String,
}

impl TaskType {
    pub fn new(id: i32, name: String) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl From<task_type::Model> for TaskType {
    fn from(model: task_type::Model) -> Self {
        TaskType::new(model.id, model.name)
    }
}

/// A task belonging to a type, as shown on the task type detail page.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct TypeTask {
    pub id: i32,
    pub name: String,
    pub is_completed: bool,
}

/// Error type for TaskTypeService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskTypeServiceError {
    #[error("Task type named '{0}' already exists")]
    DuplicateName(String),
    #[error("Task type with ID {0} not found")]
    NotFound(i32),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskTypeService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskTypeService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskTypeService {
        TaskTypeService { db }
    }

    /// Returns one page of task types ordered by name, optionally filtered by
    /// a case-insensitive substring match on the name.
    #[tracing::instrument(skip(self))]
    pub async fn search(
        &self,
        name_filter: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<TaskType>, TaskTypeServiceError> {
        let mut select = task_type::Entity::find().order_by_asc(task_type::Column::Name);
        if !name_filter.is_empty() {
            select = select
                .filter(Expr::col(task_type::Column::Name).ilike(contains_pattern(name_filter)));
        }
        let paginator = select.paginate(self.db, page_size);
        let page = fetch_page(&paginator, page).await?;
        Ok(page.map(TaskType::from))
    }

    /// Retrieves all task types ordered by name, for form select inputs.
    #[tracing::instrument(skip(self))]
    pub async fn all(&self) -> Result<Vec<TaskType>, TaskTypeServiceError> {
        let task_types = task_type::Entity::find()
            .order_by_asc(task_type::Column::Name)
            .all(self.db)
            .await?
            .into_iter()
            .map(TaskType::from)
            .collect();
        Ok(task_types)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<TaskType, TaskTypeServiceError> {
        let model = task_type::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskTypeServiceError::NotFound(id))?;
        Ok(TaskType::from(model))
    }

    /// Retrieves a task type together with its tasks ordered by deadline.
    #[tracing::instrument(skip(self))]
    pub async fn get_with_tasks(
        &self,
        id: i32,
    ) -> Result<(TaskType, Vec<TypeTask>), TaskTypeServiceError> {
        let model = task_type::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskTypeServiceError::NotFound(id))?;
        let tasks = model
            .find_related(task::Entity)
            .order_by_asc(task::Column::Deadline)
            .all(self.db)
            .await?
            .into_iter()
            .map(|t| TypeTask {
                id: t.id,
                name: t.name,
                is_completed: t.is_completed,
            })
            .collect();
        Ok((TaskType::from(model), tasks))
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, name: String) -> Result<TaskType, TaskTypeServiceError> {
        if self.name_exists(&name, None).await? {
            return Err(TaskTypeServiceError::DuplicateName(name));
        }

        let active_model = task_type::ActiveModel {
            name: ActiveValue::Set(name),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(TaskType::from(created_model))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: i32, name: String) -> Result<TaskType, TaskTypeServiceError> {
        let model = task_type::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskTypeServiceError::NotFound(id))?;

        if self.name_exists(&name, Some(id)).await? {
            return Err(TaskTypeServiceError::DuplicateName(name));
        }

        let mut active_model: task_type::ActiveModel = model.into();
        active_model.name = ActiveValue::Set(name);
        let updated_model = active_model.update(self.db).await?;
        Ok(TaskType::from(updated_model))
    }

    /// Deletes a task type and, through the cascading foreign key, every task
    /// of that type.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<TaskType, TaskTypeServiceError> {
        let model = task_type::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskTypeServiceError::NotFound(id))?;

        let deleted = TaskType::from(model.clone());
        model.delete(self.db).await?;
        Ok(deleted)
    }

    #[tracing::instrument(skip(self))]
    pub async fn count(&self) -> Result<u64, TaskTypeServiceError> {
        Ok(task_type::Entity::find().count(self.db).await?)
    }

    async fn name_exists(
        &self,
        name: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, TaskTypeServiceError> {
        let mut select = task_type::Entity::find().filter(task_type::Column::Name.eq(name));
        if let Some(id) = exclude_id {
            select = select.filter(task_type::Column::Id.ne(id));
        }
        Ok(select.one(self.db).await?.is_some())
    }
}
