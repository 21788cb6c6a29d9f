use serde::Deserialize;
use utoipa::ToSchema;

use crate::pagination::{DEFAULT_PER_PAGE, MAX_PER_PAGE};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    /// Clamp inputs before anything reaches the paginator: page >= 1,
    /// per_page in [1, 500].
    pub fn normalize(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1) as u64;
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE) as u64;
        (page, per_page)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderSortBy {
    CreatedAt,
    Price,
    StartDate,
}

impl OrderSortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSortBy::CreatedAt => "created_at",
            OrderSortBy::Price => "price",
            OrderSortBy::StartDate => "start_date",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSortBy {
    CreatedAt,
    FullName,
}

impl CustomerSortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerSortBy::CreatedAt => "created_at",
            CustomerSortBy::FullName => "full_name",
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<OrderSortBy>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub role: Option<String>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CustomerListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub sort_by: Option<CustomerSortBy>,
    pub sort_order: Option<SortOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_defaults() {
        let p = Pagination {
            page: None,
            per_page: None,
        };
        assert_eq!(p.normalize(), (1, 20));
    }

    #[test]
    fn normalize_coerces_nonpositive_page() {
        let p = Pagination {
            page: Some(0),
            per_page: Some(50),
        };
        assert_eq!(p.normalize(), (1, 50));
        let p = Pagination {
            page: Some(-3),
            per_page: Some(50),
        };
        assert_eq!(p.normalize(), (1, 50));
    }

    #[test]
    fn normalize_clamps_per_page() {
        let p = Pagination {
            page: Some(2),
            per_page: Some(0),
        };
        assert_eq!(p.normalize(), (2, 1));
        let p = Pagination {
            page: Some(2),
            per_page: Some(10_000),
        };
        assert_eq!(p.normalize(), (2, 500));
    }
}
