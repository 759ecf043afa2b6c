use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Position::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Position::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Position::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaskType::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskType::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TaskType::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Worker::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Worker::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Worker::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Worker::PasswordHash).string().not_null())
                    .col(
                        ColumnDef::new(Worker::FirstName)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Worker::LastName)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Worker::Email)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Worker::IsStaff)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Worker::IsSuperuser)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Worker::PositionId).integer().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_worker_position")
                            .from(Worker::Table, Worker::PositionId)
                            .to(Position::Table, Position::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Task::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Task::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Task::Description).text().not_null())
                    .col(ColumnDef::new(Task::Deadline).timestamp().not_null())
                    .col(
                        ColumnDef::new(Task::IsCompleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Task::Priority).string().not_null())
                    .col(ColumnDef::new(Task::TaskTypeId).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_task_type")
                            .from(Task::Table, Task::TaskTypeId)
                            .to(TaskType::Table, TaskType::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaskAssignees::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TaskAssignees::TaskId).integer().not_null())
                    .col(ColumnDef::new(TaskAssignees::WorkerId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(TaskAssignees::TaskId)
                            .col(TaskAssignees::WorkerId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_assignees_task")
                            .from(TaskAssignees::Table, TaskAssignees::TaskId)
                            .to(Task::Table, Task::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_assignees_worker")
                            .from(TaskAssignees::Table, TaskAssignees::WorkerId)
                            .to(Worker::Table, Worker::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskAssignees::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Worker::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskType::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Position::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Position {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum TaskType {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Worker {
    Table,
    Id,
    Username,
    PasswordHash,
    FirstName,
    LastName,
    Email,
    IsStaff,
    IsSuperuser,
    PositionId,
}

#[derive(DeriveIden)]
enum Task {
    Table,
    Id,
    Name,
    Description,
    Deadline,
    IsCompleted,
    Priority,
    TaskTypeId,
}

#[derive(DeriveIden)]
enum TaskAssignees {
    Table,
    TaskId,
    WorkerId,
}
