use std::marker::PhantomData;

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, Condition, DatabaseConnection, EntityTrait,
    FromQueryResult, IntoActiveModel, PaginatorTrait, PrimaryKeyTrait, QueryFilter, Select,
    UpdateMany,
};

use crate::error::{AppError, AppResult};
use crate::pagination::{self, Page};

/// Uniform CRUD verb set shared by every entity service, parameterized over
/// the entity at compile time. The repository adds no business logic: every
/// verb forwards its engine-native arguments verbatim, and persistence errors
/// propagate to the caller untranslated.
pub struct Repository<E>
where
    E: EntityTrait,
{
    conn: DatabaseConnection,
    entity: PhantomData<E>,
}

impl<E> Repository<E>
where
    E: EntityTrait,
    E::Model: FromQueryResult + Sized + Send + Sync,
{
    pub fn new(conn: &DatabaseConnection) -> Self {
        Self {
            conn: conn.clone(),
            entity: PhantomData,
        }
    }

    pub async fn find_by_id<T>(&self, id: T) -> AppResult<Option<E::Model>>
    where
        T: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        Ok(E::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn find_by_id_or_throw<T>(&self, id: T) -> AppResult<E::Model>
    where
        T: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        self.find_by_id(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn find_first(&self, condition: Condition) -> AppResult<Option<E::Model>> {
        Ok(E::find().filter(condition).one(&self.conn).await?)
    }

    pub async fn find_first_or_throw(&self, condition: Condition) -> AppResult<E::Model> {
        self.find_first(condition).await?.ok_or(AppError::NotFound)
    }

    pub async fn find_many(&self, select: Select<E>) -> AppResult<Vec<E::Model>> {
        Ok(select.all(&self.conn).await?)
    }

    /// Delegates to the paginator with this repository's query source.
    pub async fn find_many_paginated(
        &self,
        select: Select<E>,
        page: u64,
        per_page: u64,
    ) -> AppResult<Page<E::Model>> {
        pagination::paginate(&self.conn, select, page, per_page).await
    }

    pub async fn count(&self, condition: Condition) -> AppResult<u64> {
        Ok(E::find().filter(condition).count(&self.conn).await?)
    }

    pub async fn exists(&self, condition: Condition) -> AppResult<bool> {
        Ok(E::find().filter(condition).one(&self.conn).await?.is_some())
    }

    pub async fn insert(&self, model: E::ActiveModel) -> AppResult<E::Model>
    where
        E::ActiveModel: ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        Ok(model.insert(&self.conn).await?)
    }

    pub async fn insert_many<I>(&self, models: I) -> AppResult<u64>
    where
        I: IntoIterator<Item = E::ActiveModel>,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        Ok(E::insert_many(models)
            .exec_without_returning(&self.conn)
            .await?)
    }

    pub async fn update(&self, model: E::ActiveModel) -> AppResult<E::Model>
    where
        E::ActiveModel: ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        Ok(model.update(&self.conn).await?)
    }

    /// Insert-or-update keyed on the primary key.
    pub async fn save(&self, model: E::ActiveModel) -> AppResult<E::ActiveModel>
    where
        E::ActiveModel: ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        Ok(model.save(&self.conn).await?)
    }

    pub async fn update_many(&self, stmt: UpdateMany<E>) -> AppResult<u64> {
        Ok(stmt.exec(&self.conn).await?.rows_affected)
    }

    pub async fn delete_by_id<T>(&self, id: T) -> AppResult<u64>
    where
        T: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        Ok(E::delete_by_id(id).exec(&self.conn).await?.rows_affected)
    }

    pub async fn delete_many(&self, condition: Condition) -> AppResult<u64> {
        Ok(E::delete_many()
            .filter(condition)
            .exec(&self.conn)
            .await?
            .rows_affected)
    }
}
