use crate::entities::*;
use crate::forms::contains_pattern;
use crate::pagination::{Page, fetch_page};
use sea_orm::sea_query::{Expr, extension::postgres::PgExpr};
use sea_orm::*;

pub mod web;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Position {
    id: i32,
    name: String,
}

impl Position {
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

impl From<position::Model> for Position {
    fn from(model: position::Model) -> Self {
        Position::new(model.id, model.name)
    }
}

/// A worker holding a position, as shown on the position detail page.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct PositionWorker {
    pub id: i32,
    pub username: String,
}

/// Error type for PositionService operations.
#[derive(Debug, thiserror::Error)]
pub enum PositionServiceError {
    #[error("Position named '{0}' already exists")]
    DuplicateName(String),
    #[error("Position with ID {0} not found")]
    NotFound(i32),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct PositionService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl PositionService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> PositionService {
        PositionService { db }
    }

    /// Returns one page of positions ordered by name, optionally filtered by a
    /// case-insensitive substring match on the name.
    #[tracing::instrument(skip(self))]
    pub async fn search(
        &self,
        name_filter: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<Position>, PositionServiceError> {
        let mut select = position::Entity::find().order_by_asc(position::Column::Name);
        if !name_filter.is_empty() {
            select = select
                .filter(Expr::col(position::Column::Name).ilike(contains_pattern(name_filter)));
        }
        let paginator = select.paginate(self.db, page_size);
        let page = fetch_page(&paginator, page).await?;
        Ok(page.map(Position::from))
    }

    /// Retrieves all positions ordered by name, for form select inputs.
    #[tracing::instrument(skip(self))]
    pub async fn all(&self) -> Result<Vec<Position>, PositionServiceError> {
        let positions = position::Entity::find()
            .order_by_asc(position::Column::Name)
            .all(self.db)
            .await?
            .into_iter()
            .map(Position::from)
            .collect();
        Ok(positions)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<Position, PositionServiceError> {
        let model = position::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(PositionServiceError::NotFound(id))?;
        Ok(Position::from(model))
    }

    /// Retrieves a position together with the workers currently holding it.
    #[tracing::instrument(skip(self))]
    pub async fn get_with_workers(
        &self,
        id: i32,
    ) -> Result<(Position, Vec<PositionWorker>), PositionServiceError> {
        let model = position::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(PositionServiceError::NotFound(id))?;
        let workers = model
            .find_related(worker::Entity)
            .order_by_asc(worker::Column::Username)
            .all(self.db)
            .await?
            .into_iter()
            .map(|w| PositionWorker {
                id: w.id,
                username: w.username,
            })
            .collect();
        Ok((Position::from(model), workers))
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, name: String) -> Result<Position, PositionServiceError> {
        if self.name_exists(&name, None).await? {
            return Err(PositionServiceError::DuplicateName(name));
        }

        let active_model = position::ActiveModel {
            name: ActiveValue::Set(name),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Position::from(created_model))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: i32, name: String) -> Result<Position, PositionServiceError> {
        let model = position::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(PositionServiceError::NotFound(id))?;

        if self.name_exists(&name, Some(id)).await? {
            return Err(PositionServiceError::DuplicateName(name));
        }

        let mut active_model: position::ActiveModel = model.into();
        active_model.name = ActiveValue::Set(name);
        let updated_model = active_model.update(self.db).await?;
        Ok(Position::from(updated_model))
    }

    /// Deletes a position. Workers holding it keep existing with their
    /// position cleared (the foreign key is ON DELETE SET NULL).
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<Position, PositionServiceError> {
        let model = position::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(PositionServiceError::NotFound(id))?;

        let deleted = Position::from(model.clone());
        model.delete(self.db).await?;
        Ok(deleted)
    }

    #[tracing::instrument(skip(self))]
    pub async fn count(&self) -> Result<u64, PositionServiceError> {
        Ok(position::Entity::find().count(self.db).await?)
    }

    async fn name_exists(
        &self,
        name: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, PositionServiceError> {
        let mut select = position::Entity::find().filter(position::Column::Name.eq(name));
        if let Some(id) = exclude_id {
            select = select.filter(position::Column::Id.ne(id));
        }
        Ok(select.one(self.db).await?.is_some())
    }
}
