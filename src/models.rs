use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Records (Mapped to Database) ---
//
// Entities are keyed by surrogate `i64` ids. Relations are plain foreign-key
// fields resolved through explicit repository lookups.

/// User
///
/// The identity record stored in `user_account`. Carries the password hash, so it
/// is never serialized to clients; handlers convert it into `UserSchema`.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct User {
    pub id: i64,
    // Unique login identifier; also the value stored in the session.
    pub email: String,
    pub name: Option<String>,
    // PHC-formatted Argon2 hash. `None` for accounts without a password.
    pub hashed_password: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub verified_at: Option<NaiveDate>,
    pub joined_at: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_password(&self) -> bool {
        self.hashed_password.is_some()
    }
}

/// NewUser
///
/// Insert payload for `user_account`. The password has already been hashed by
/// the service layer.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub hashed_password: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
}

/// Account
///
/// A tenant. Users join accounts through `account_member` rows.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Account {
    pub id: i64,
    pub name: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Organization
///
/// A company tracked by an account. `account_id` scopes it to one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Organization {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Contact
///
/// A person tracked by an account, optionally attached to one of the account's
/// organizations.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Contact {
    pub id: i64,
    pub account_id: i64,
    pub organization_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// ContactDetail
///
/// A contact together with its organization, resolved by a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ContactDetail {
    #[serde(flatten)]
    pub contact: Contact,
    pub organization: Option<Organization>,
}

/// Role names stored in `account_member.role`.
pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_MEMBER: &str = "MEMBER";

/// AccountAssignment
///
/// One membership of a user in an account, loaded by joining `account_member`
/// with `account`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccountAssignment {
    pub account_id: i64,
    pub account_name: String,
    pub is_owner: bool,
    // 'ADMIN' or 'MEMBER'.
    pub role: String,
}

// --- Output Schemas ---

/// UserSchema
///
/// The public projection of a `User`, used for API responses and shared with the
/// view layer as the authenticated user. The password hash is reduced to
/// `hasPassword`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserSchema {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub is_superuser: bool,
    pub is_active: bool,
    pub is_verified: bool,
    pub has_password: bool,
    pub avatar_url: Option<String>,
    pub accounts: Vec<AccountAssignment>,
}

impl UserSchema {
    pub fn from_user(user: &User, accounts: Vec<AccountAssignment>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            is_superuser: user.is_superuser,
            is_active: user.is_active,
            is_verified: user.is_verified,
            has_password: user.has_password(),
            avatar_url: user.avatar_url.clone(),
            accounts,
        }
    }
}

/// OffsetPagination
///
/// A page of results plus the limit/offset that produced it and the total number
/// of matching rows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OffsetPagination<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

/// Message
///
/// A plain confirmation message.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Message {
    pub message: String,
}

// --- Request Payloads (Input Schemas) ---

/// AccountLogin
///
/// Login form payload. `username` is the account email.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccountLogin {
    pub username: String,
    pub password: String,
}

/// AccountRegister
///
/// Self-service registration payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccountRegister {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    // Name of an account to create with the new user as owner.
    #[serde(default)]
    pub initial_account: Option<String>,
}

/// UserCreate
///
/// Administrative user creation payload (POST /api/users and the CLI).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub initial_account: Option<String>,
}

fn default_true() -> bool {
    true
}

impl From<AccountRegister> for UserCreate {
    fn from(data: AccountRegister) -> Self {
        Self {
            email: data.email,
            password: data.password,
            name: data.name,
            is_superuser: false,
            is_active: true,
            is_verified: false,
            initial_account: data.initial_account,
        }
    }
}

/// UserUpdate
///
/// Partial update payload (PATCH /api/users/{email}). Absent fields are left
/// untouched; a present `password` is re-hashed before storage.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
}

/// ProfileUpdate
///
/// The fields a user may change on their own profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// PasswordUpdate
///
/// Password change payload; the current password must verify first.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PasswordUpdate {
    pub current_password: String,
    pub new_password: String,
}
