use crate::{
    errors::AppError,
    filters::FilterCriterion,
    models::{Account, AccountAssignment, Contact, NewUser, Organization, ROLE_ADMIN, User},
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;

/// Repository Trait
///
/// The data-access contract consumed by services, the session authenticator and
/// handlers. Listing operations take the composed filter list verbatim and return
/// the page together with the total number of matching rows.
///
/// **Send + Sync + async_trait** keep `Arc<dyn Repository>` usable across axum's
/// task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, filters: &[FilterCriterion]) -> Result<(Vec<User>, i64), AppError>;
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    // Writes every mutable column of `user`, keyed by its id.
    async fn update_user(&self, user: &User) -> Result<User, AppError>;
    // True when a row was removed.
    async fn delete_user(&self, id: i64) -> Result<bool, AppError>;

    // --- Accounts ---
    async fn get_user_accounts(&self, user_id: i64) -> Result<Vec<AccountAssignment>, AppError>;
    // Creates the account and makes `owner_id` its owning admin in one transaction.
    async fn create_account(&self, name: &str, owner_id: i64) -> Result<Account, AppError>;

    // --- CRM records, scoped to a set of accounts ---
    async fn list_organizations(
        &self,
        account_ids: &[i64],
        filters: &[FilterCriterion],
    ) -> Result<(Vec<Organization>, i64), AppError>;
    async fn get_organization(&self, id: i64) -> Result<Option<Organization>, AppError>;
    async fn list_contacts(
        &self,
        account_ids: &[i64],
        filters: &[FilterCriterion],
    ) -> Result<(Vec<Contact>, i64), AppError>;
    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, AppError>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer carried in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// Columns
///
/// Per-entity allow-lists for column names that arrive from query parameters.
/// Only listed names are ever pushed into SQL text.
#[derive(Debug, Clone, Copy)]
pub struct Columns {
    pub filterable: &'static [&'static str],
    pub searchable: &'static [&'static str],
}

impl Columns {
    fn filterable(&self, field: &str) -> Result<&'static str, AppError> {
        lookup(self.filterable, field)
    }

    fn searchable(&self, field: &str) -> Result<&'static str, AppError> {
        lookup(self.searchable, field)
    }
}

fn lookup(allowed: &'static [&'static str], field: &str) -> Result<&'static str, AppError> {
    allowed
        .iter()
        .copied()
        .find(|column| *column == field)
        .ok_or_else(|| AppError::ValidationFailed(format!("Unsupported field: {field}")))
}

pub const USER_COLUMNS: Columns = Columns {
    filterable: &["id", "email", "name", "joined_at", "created_at", "updated_at"],
    searchable: &["email", "name"],
};

pub const ORGANIZATION_COLUMNS: Columns = Columns {
    filterable: &["id", "name", "city", "country", "created_at", "updated_at"],
    searchable: &["name", "email", "phone", "city", "region", "country"],
};

pub const CONTACT_COLUMNS: Columns = Columns {
    filterable: &[
        "id",
        "organization_id",
        "first_name",
        "last_name",
        "created_at",
        "updated_at",
    ],
    searchable: &["first_name", "last_name", "email", "phone", "city", "country"],
};

/// push_conditions
///
/// Appends one ` AND ...` clause per filtering criterion. The builder must already
/// end in a `WHERE` clause. Ordering and pagination criteria are skipped here.
pub fn push_conditions(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[FilterCriterion],
    columns: &Columns,
) -> Result<(), AppError> {
    for filter in filters {
        match filter {
            FilterCriterion::CollectionFilter { field, values } => {
                let column = columns.filterable(field)?;
                builder.push(format!(" AND {column} = ANY("));
                builder.push_bind(values.clone());
                builder.push(")");
            }
            FilterCriterion::BeforeAfter {
                field,
                before,
                after,
            } => {
                let column = columns.filterable(field)?;
                if let Some(before) = before {
                    builder.push(format!(" AND {column} < "));
                    builder.push_bind(*before);
                }
                if let Some(after) = after {
                    builder.push(format!(" AND {column} > "));
                    builder.push_bind(*after);
                }
            }
            FilterCriterion::SearchFilter {
                field,
                value,
                ignore_case,
            } => {
                let column = columns.searchable(field)?;
                let operator = if *ignore_case { "ILIKE" } else { "LIKE" };
                builder.push(format!(" AND {column} {operator} "));
                builder.push_bind(contains_pattern(value));
                builder.push(" ESCAPE '\\'");
            }
            FilterCriterion::LimitOffset { .. } | FilterCriterion::OrderBy { .. } => {}
        }
    }
    Ok(())
}

/// A `LIKE` pattern matching `value` anywhere, with backslash, `%` and `_` taken
/// literally.
pub fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// push_ordering
///
/// Appends `ORDER BY` for every ordering criterion, then `LIMIT/OFFSET` when
/// pagination is present.
pub fn push_ordering(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[FilterCriterion],
    columns: &Columns,
) -> Result<(), AppError> {
    let mut first = true;
    for filter in filters {
        if let FilterCriterion::OrderBy { field, sort_order } = filter {
            let column = columns.filterable(field)?;
            builder.push(if first { " ORDER BY " } else { ", " });
            builder.push(format!("{column} {}", sort_order.as_sql()));
            first = false;
        }
    }

    for filter in filters {
        if let FilterCriterion::LimitOffset { limit, offset } = filter {
            builder.push(" LIMIT ");
            builder.push_bind(*limit);
            builder.push(" OFFSET ");
            builder.push_bind(*offset);
            break;
        }
    }
    Ok(())
}

/// Maps write failures on `user_account` to client-facing errors.
fn user_write_error(error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return AppError::Conflict("A user with this email already exists".to_string());
        }
        if db.is_check_violation() {
            return AppError::ValidationFailed("User operation failed.".to_string());
        }
    }
    tracing::error!(error = ?error, "user write failed");
    AppError::Database(error)
}

const USER_SELECT: &str = r#"
    SELECT id, email, name, hashed_password, avatar_url, is_active, is_superuser,
           is_verified, verified_at, joined_at, created_at, updated_at
    FROM user_account
"#;

const ORGANIZATION_SELECT: &str = r#"
    SELECT id, account_id, name, email, phone, address, city, region, country,
           postal_code, created_at, updated_at
    FROM organization
"#;

const CONTACT_SELECT: &str = r#"
    SELECT id, account_id, organization_id, first_name, last_name, email, phone,
           address, city, region, country, postal_code, created_at, updated_at
    FROM contact
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs a filtered listing: a `COUNT(*)` over the conditions, then the page.
    async fn list_scoped<T>(
        &self,
        select: &str,
        table: &str,
        account_ids: Option<&[i64]>,
        filters: &[FilterCriterion],
        columns: &Columns,
    ) -> Result<(Vec<T>, i64), AppError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE TRUE"));
        let mut page: QueryBuilder<Postgres> = QueryBuilder::new(select);
        page.push(" WHERE TRUE");

        if let Some(account_ids) = account_ids {
            for builder in [&mut count, &mut page] {
                builder.push(" AND account_id = ANY(");
                builder.push_bind(account_ids.to_vec());
                builder.push(")");
            }
        }

        push_conditions(&mut count, filters, columns)?;
        push_conditions(&mut page, filters, columns)?;
        push_ordering(&mut page, filters, columns)?;

        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        let items = page.build_query_as::<T>().fetch_all(&self.pool).await?;

        Ok((items, total))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self, filters: &[FilterCriterion]) -> Result<(Vec<User>, i64), AppError> {
        self.list_scoped(USER_SELECT, "user_account", None, filters, &USER_COLUMNS)
            .await
    }

    /// create_user
    ///
    /// Inserts a new identity. Duplicate emails surface as `Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO user_account (email, name, hashed_password, is_active, is_superuser, is_verified, verified_at)
            VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $6 THEN CURRENT_DATE ELSE NULL END)
            RETURNING id, email, name, hashed_password, avatar_url, is_active, is_superuser,
                      is_verified, verified_at, joined_at, created_at, updated_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.hashed_password)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.is_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(user_write_error)
    }

    async fn update_user(&self, user: &User) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE user_account
            SET email = $2,
                name = $3,
                hashed_password = $4,
                avatar_url = $5,
                is_active = $6,
                is_superuser = $7,
                is_verified = $8,
                verified_at = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, name, hashed_password, avatar_url, is_active, is_superuser,
                      is_verified, verified_at, joined_at, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.hashed_password)
        .bind(&user.avatar_url)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.is_verified)
        .bind(user.verified_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(user_write_error)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM user_account WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user_accounts(&self, user_id: i64) -> Result<Vec<AccountAssignment>, AppError> {
        let accounts = sqlx::query_as::<_, AccountAssignment>(
            r#"
            SELECT m.account_id, a.name AS account_name, m.is_owner, m.role
            FROM account_member m
            JOIN account a ON a.id = m.account_id
            WHERE m.user_id = $1
            ORDER BY a.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn create_account(&self, name: &str, owner_id: i64) -> Result<Account, AppError> {
        let mut tx = self.pool.begin().await?;

        let account = sqlx::query_as::<_, Account>(
            "INSERT INTO account (name) VALUES ($1) RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO account_member (account_id, user_id, role, is_owner) VALUES ($1, $2, $3, true)",
        )
        .bind(account.id)
        .bind(owner_id)
        .bind(ROLE_ADMIN)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn list_organizations(
        &self,
        account_ids: &[i64],
        filters: &[FilterCriterion],
    ) -> Result<(Vec<Organization>, i64), AppError> {
        self.list_scoped(
            ORGANIZATION_SELECT,
            "organization",
            Some(account_ids),
            filters,
            &ORGANIZATION_COLUMNS,
        )
        .await
    }

    async fn get_organization(&self, id: i64) -> Result<Option<Organization>, AppError> {
        let organization =
            sqlx::query_as::<_, Organization>(&format!("{ORGANIZATION_SELECT} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(organization)
    }

    async fn list_contacts(
        &self,
        account_ids: &[i64],
        filters: &[FilterCriterion],
    ) -> Result<(Vec<Contact>, i64), AppError> {
        self.list_scoped(
            CONTACT_SELECT,
            "contact",
            Some(account_ids),
            filters,
            &CONTACT_COLUMNS,
        )
        .await
    }

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, AppError> {
        let contact = sqlx::query_as::<_, Contact>(&format!("{CONTACT_SELECT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contact)
    }
}
