use sea_orm::{DatabaseConnection, EntityTrait, FromQueryResult, PaginatorTrait, QuerySelect, Select};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PageMeta {
    pub total: u64,
    pub last_page: u64,
    pub current_page: u64,
    pub per_page: u64,
    pub prev: Option<u64>,
    pub next: Option<u64>,
}

impl PageMeta {
    /// `per_page` must already be validated to be >= 1 at the input boundary.
    pub fn compute(total: u64, page: u64, per_page: u64) -> Self {
        let last_page = total.div_ceil(per_page);
        Self {
            total,
            last_page,
            current_page: page,
            per_page,
            prev: (page > 1).then(|| page - 1),
            next: (page < last_page).then(|| page + 1),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Fetch one page of a query. The row fetch and the count run concurrently;
/// the page is assembled only after both complete.
pub async fn paginate<E>(
    conn: &DatabaseConnection,
    select: Select<E>,
    page: u64,
    per_page: u64,
) -> AppResult<Page<E::Model>>
where
    E: EntityTrait,
    E::Model: FromQueryResult + Sized + Send + Sync,
{
    if per_page == 0 {
        return Err(AppError::Unprocessable("per_page must be >= 1".into()));
    }
    let skip = per_page * page.saturating_sub(1);

    let data_fut = select.clone().limit(per_page).offset(skip).all(conn);
    let count_fut = select.count(conn);
    let (data, total) = tokio::try_join!(data_fut, count_fut)?;

    Ok(Page {
        meta: PageMeta::compute(total, page, per_page),
        data,
    })
}

/// Page a distinct-projection query. The engine cannot count distinct rows for
/// us here, so the full result set is loaded and the page sliced out of it.
pub async fn paginate_distinct<E>(
    conn: &DatabaseConnection,
    select: Select<E>,
    page: u64,
    per_page: u64,
) -> AppResult<Page<E::Model>>
where
    E: EntityTrait,
    E::Model: FromQueryResult + Sized + Send + Sync,
{
    if per_page == 0 {
        return Err(AppError::Unprocessable("per_page must be >= 1".into()));
    }
    let rows = select.all(conn).await?;
    let total = rows.len() as u64;
    let skip = (per_page * page.saturating_sub(1)) as usize;
    let data: Vec<E::Model> = rows
        .into_iter()
        .skip(skip)
        .take(per_page as usize)
        .collect();

    Ok(Page {
        meta: PageMeta::compute(total, page, per_page),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_for_partial_last_page() {
        // 45 rows, 20 per page
        let first = PageMeta::compute(45, 1, 20);
        assert_eq!(first.last_page, 3);
        assert_eq!(first.prev, None);
        assert_eq!(first.next, Some(2));

        let middle = PageMeta::compute(45, 2, 20);
        assert_eq!(middle.prev, Some(1));
        assert_eq!(middle.next, Some(3));

        let last = PageMeta::compute(45, 3, 20);
        assert_eq!(last.prev, Some(2));
        assert_eq!(last.next, None);
    }

    #[test]
    fn meta_for_exact_multiple() {
        let meta = PageMeta::compute(40, 2, 20);
        assert_eq!(meta.last_page, 2);
        assert_eq!(meta.next, None);
        assert_eq!(meta.prev, Some(1));
    }

    #[test]
    fn meta_for_empty_result() {
        let meta = PageMeta::compute(0, 1, 20);
        assert_eq!(meta.total, 0);
        assert_eq!(meta.last_page, 0);
        assert_eq!(meta.prev, None);
        assert_eq!(meta.next, None);
    }

    #[test]
    fn meta_for_single_page() {
        let meta = PageMeta::compute(5, 1, 20);
        assert_eq!(meta.last_page, 1);
        assert_eq!(meta.prev, None);
        assert_eq!(meta.next, None);
    }

    #[test]
    fn next_is_none_past_last_page() {
        let meta = PageMeta::compute(45, 7, 20);
        assert_eq!(meta.next, None);
        assert_eq!(meta.prev, Some(6));
    }
}
