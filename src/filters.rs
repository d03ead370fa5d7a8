//! Query-parameter filters for list endpoints.
//!
//! `FilterParams` is the raw, typed view of the query string. `FilterParams::into_filters`
//! composes it into an ordered list of `FilterCriterion` values which handlers pass
//! unchanged to the repository. Composition is pure; SQL translation lives in
//! `repository`.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::Query;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::AppError;

pub const DEFAULT_CURRENT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_ORDER_BY: &str = "updated_at";
pub const ID_FIELD: &str = "id";
pub const CREATED_FIELD: &str = "created_at";
pub const UPDATED_FIELD: &str = "updated_at";

/// SortOrder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// FilterCriterion
///
/// One unit of filtering, ordering or pagination intent.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCriterion {
    /// `field` must be one of `values`.
    CollectionFilter { field: String, values: Vec<i64> },
    /// `field` strictly before `before` and/or strictly after `after`.
    BeforeAfter {
        field: String,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    },
    LimitOffset { limit: i64, offset: i64 },
    /// Substring match of `value` in `field`.
    SearchFilter {
        field: String,
        value: String,
        ignore_case: bool,
    },
    OrderBy { field: String, sort_order: SortOrder },
}

impl FilterCriterion {
    /// A date range, or `None` when neither bound is set.
    pub fn before_after(
        field: &str,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        if before.is_none() && after.is_none() {
            return None;
        }
        Some(FilterCriterion::BeforeAfter {
            field: field.to_string(),
            before,
            after,
        })
    }

    /// An id-set filter, or `None` when there are no ids.
    pub fn collection(field: &str, values: Vec<i64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(FilterCriterion::CollectionFilter {
            field: field.to_string(),
            values,
        })
    }
}

/// FilterParams
///
/// The query parameters accepted by every filtered list endpoint. `ids` may be
/// repeated (`?ids=1&ids=2`), which is why the extractor uses the form-style
/// `axum_extra` Query rather than axum's.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct FilterParams {
    /// Restrict results to these ids.
    #[serde(default)]
    pub ids: Vec<i64>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    /// Page number, starting at 1.
    pub current_page: Option<i64>,
    /// Items per page.
    pub page_size: Option<i64>,
    /// Field to search.
    pub search_field: Option<String>,
    pub search_string: Option<String>,
    /// Search should ignore case. Defaults to false.
    pub search_ignore_case: Option<bool>,
    /// Order by field. Defaults to `updated_at`.
    pub order_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl FilterParams {
    /// Rejects pagination values below 1 and pages whose offset does not fit
    /// in an `i64`.
    pub fn validate(&self) -> Result<(), AppError> {
        if matches!(self.current_page, Some(page) if page < 1) {
            return Err(AppError::ValidationFailed(
                "currentPage must be greater than or equal to 1".to_string(),
            ));
        }
        if matches!(self.page_size, Some(size) if size < 1) {
            return Err(AppError::ValidationFailed(
                "pageSize must be greater than or equal to 1".to_string(),
            ));
        }
        let current_page = self.current_page.unwrap_or(DEFAULT_CURRENT_PAGE);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size.checked_mul(current_page - 1).is_none() {
            return Err(AppError::ValidationFailed(
                "currentPage and pageSize are out of range".to_string(),
            ));
        }
        Ok(())
    }

    /// Composes the criteria in their canonical order: ids, created range,
    /// limit/offset, updated range, search, order. Empty ranges and an empty id
    /// set are left out; ordering is always present.
    pub fn into_filters(self) -> Vec<FilterCriterion> {
        let current_page = self.current_page.unwrap_or(DEFAULT_CURRENT_PAGE);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        let mut filters = Vec::with_capacity(6);

        filters.extend(FilterCriterion::collection(ID_FIELD, self.ids));
        filters.extend(FilterCriterion::before_after(
            CREATED_FIELD,
            self.created_before,
            self.created_after,
        ));
        filters.push(FilterCriterion::LimitOffset {
            limit: page_size,
            offset: page_size.saturating_mul(current_page.saturating_sub(1)),
        });
        filters.extend(FilterCriterion::before_after(
            UPDATED_FIELD,
            self.updated_before,
            self.updated_after,
        ));

        if let (Some(field), Some(value)) = (self.search_field, self.search_string) {
            filters.push(FilterCriterion::SearchFilter {
                field,
                value,
                ignore_case: self.search_ignore_case.unwrap_or(false),
            });
        }

        filters.push(FilterCriterion::OrderBy {
            field: self
                .order_by
                .unwrap_or_else(|| DEFAULT_ORDER_BY.to_string()),
            sort_order: self.sort_order.unwrap_or_default(),
        });

        filters
    }
}

/// The limit/offset carried by a filter list, or the defaults when none is present.
pub fn limit_offset(filters: &[FilterCriterion]) -> (i64, i64) {
    filters
        .iter()
        .find_map(|filter| match filter {
            FilterCriterion::LimitOffset { limit, offset } => Some((*limit, *offset)),
            _ => None,
        })
        .unwrap_or((DEFAULT_PAGE_SIZE, 0))
}

/// Filters Extractor
///
/// Parses and validates `FilterParams` from the query string and composes them.
/// Rejects with `ValidationFailed` on malformed input.
#[derive(Debug, Clone)]
pub struct Filters(pub Vec<FilterCriterion>);

impl<S> FromRequestParts<S> for Filters
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<FilterParams>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::ValidationFailed(rejection.to_string()))?;
        params.validate()?;
        Ok(Filters(params.into_filters()))
    }
}
