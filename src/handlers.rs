use crate::{
    AppState,
    auth::{self, AuthUser, CurrentUser, LOGIN_PATH},
    errors::AppError,
    filters::{FilterParams, Filters, limit_offset},
    inertia::{Inertia, flash},
    models::{
        AccountLogin, AccountRegister, Contact, ContactDetail, Message, OffsetPagination,
        Organization, PasswordUpdate, ProfileUpdate, User, UserCreate, UserSchema, UserUpdate,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use tower_sessions::Session;

pub const DASHBOARD_PATH: &str = "/dashboard/";
pub const HOME_PATH: &str = "/";

const FLASH_INFO: &str = "info";

// --- Site ---

/// home
///
/// [Public Route] Sends signed-in users to the dashboard and everyone else to the
/// login page.
pub async fn home(CurrentUser(user): CurrentUser) -> Redirect {
    if user.is_some() {
        Redirect::to(DASHBOARD_PATH)
    } else {
        Redirect::to(LOGIN_PATH)
    }
}

pub async fn dashboard(inertia: Inertia) -> Result<Response, AppError> {
    inertia.render("Dashboard/Index", json!({})).await
}

pub async fn reports(inertia: Inertia) -> Result<Response, AppError> {
    inertia.render("Reports/Index", json!({})).await
}

// --- Access ---

/// show_login
///
/// [Public Route] Renders the login page, or redirects an already authenticated
/// user to the dashboard.
pub async fn show_login(
    CurrentUser(user): CurrentUser,
    session: Session,
    inertia: Inertia,
) -> Result<Response, AppError> {
    if user.is_some() {
        flash(&session, "Your account is already authenticated.", FLASH_INFO).await?;
        return Ok(Redirect::to(DASHBOARD_PATH).into_response());
    }
    inertia.render("Auth/Login", json!({})).await
}

/// login
///
/// [Public Route] Authenticates the credentials and starts a session under a new
/// session id.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<AccountLogin>,
) -> Result<Redirect, AppError> {
    let user = state
        .users()
        .authenticate(&payload.username, &payload.password)
        .await
        .inspect_err(|e| tracing::info!(reason = %e, "login rejected"))?;

    auth::login(&session, &user).await?;
    tracing::info!(user_id = user.id, "user authenticated");
    flash(&session, "Your account was successfully authenticated.", FLASH_INFO).await?;
    Ok(Redirect::to(DASHBOARD_PATH))
}

/// logout
///
/// [Authenticated Route] Clears the session and returns to the login page.
pub async fn logout(AuthUser(user): AuthUser, session: Session) -> Result<Redirect, AppError> {
    auth::logout(&session).await?;
    tracing::info!(user_id = user.id, "user logged out");
    flash(&session, "You have been logged out.", FLASH_INFO).await?;
    Ok(Redirect::to(LOGIN_PATH))
}

pub async fn show_register(
    CurrentUser(user): CurrentUser,
    session: Session,
    inertia: Inertia,
) -> Result<Response, AppError> {
    if user.is_some() {
        flash(
            &session,
            "Your account is already authenticated. Welcome back!",
            FLASH_INFO,
        )
        .await?;
        return Ok(Redirect::to(DASHBOARD_PATH).into_response());
    }
    inertia.render("Auth/Register", json!({})).await
}

/// register
///
/// [Public Route] Self-service sign-up. Creates the user (and their initial
/// account, when named) and signs them in.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<AccountRegister>,
) -> Result<Redirect, AppError> {
    let user = state.users().create(UserCreate::from(payload)).await?;

    auth::login(&session, &user).await?;
    tracing::info!(event = "user_created", user_id = user.id, "user registered");
    flash(&session, "Account created successfully. Welcome!", FLASH_INFO).await?;
    Ok(Redirect::to(DASHBOARD_PATH))
}

// --- Profile ---

pub async fn show_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    inertia: Inertia,
) -> Result<Response, AppError> {
    let schema = state.users().to_schema(&user).await?;
    inertia.render("Profile/Edit", schema).await
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    inertia: Inertia,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Response, AppError> {
    let users = state.users();
    let updated = users.update_profile(&user, payload).await?;
    let schema = users.to_schema(&updated).await?;
    inertia.render("Profile/Edit", schema).await
}

/// update_password
///
/// [Profile Route] Changes the caller's password after verifying the current one.
pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<PasswordUpdate>,
) -> Result<Json<Message>, AppError> {
    state.users().update_password(&user, payload).await?;
    tracing::info!(user_id = user.id, "password updated");
    Ok(Json(Message {
        message: "Your password was successfully modified.".to_string(),
    }))
}

/// remove_account
///
/// [Profile Route] Deletes the caller's user record and ends the session.
pub async fn remove_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    session: Session,
) -> Result<Redirect, AppError> {
    auth::logout(&session).await?;
    state.users().delete(user.id).await?;
    tracing::info!(user_id = user.id, "account removed");
    flash(
        &session,
        "Your account has been removed from the system.",
        FLASH_INFO,
    )
    .await?;
    Ok(Redirect::to(HOME_PATH))
}

// --- Users API ---

/// list_users
///
/// [Admin Route] Lists users through the composed filters.
#[utoipa::path(
    get,
    path = "/api/users",
    params(FilterParams),
    responses(
        (status = 200, description = "Users", body = OffsetPagination<UserSchema>),
        (status = 400, description = "Invalid filter"),
        (status = 403, description = "Not a superuser")
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Filters(filters): Filters,
) -> Result<Json<OffsetPagination<UserSchema>>, AppError> {
    let users = state.users();
    let (records, total) = users.list_and_count(&filters).await?;

    let mut items = Vec::with_capacity(records.len());
    for user in &records {
        items.push(users.to_schema(user).await?);
    }

    let (limit, offset) = limit_offset(&filters);
    Ok(Json(OffsetPagination {
        items,
        limit,
        offset,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{email}",
    params(("email" = String, Path, description = "The user to retrieve.")),
    responses(
        (status = 200, description = "User", body = UserSchema),
        (status = 404, description = "Not Found")
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserSchema>, AppError> {
    let users = state.users();
    let user = users.get_by_email(&email).await?;
    Ok(Json(users.to_schema(&user).await?))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User Created", body = UserSchema),
        (status = 409, description = "Email already registered")
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserSchema>), AppError> {
    let users = state.users();
    let user = users.create(payload).await?;
    tracing::info!(event = "user_created", user_id = user.id, "user created by admin");
    Ok((StatusCode::CREATED, Json(users.to_schema(&user).await?)))
}

#[utoipa::path(
    patch,
    path = "/api/users/{email}",
    params(("email" = String, Path, description = "The user to update.")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "User Updated", body = UserSchema),
        (status = 404, description = "Not Found")
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<UserSchema>, AppError> {
    let users = state.users();
    let user = users.update(&email, payload).await?;
    Ok(Json(users.to_schema(&user).await?))
}

#[utoipa::path(
    delete,
    path = "/api/users/{email}",
    params(("email" = String, Path, description = "The user to delete.")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    ),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<StatusCode, AppError> {
    state.users().delete_by_email(&email).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- CRM API ---

/// The ids of every account `user` belongs to.
async fn account_ids(state: &AppState, user: &User) -> Result<Vec<i64>, AppError> {
    Ok(state
        .repo
        .get_user_accounts(user.id)
        .await?
        .into_iter()
        .map(|assignment| assignment.account_id)
        .collect())
}

/// list_organizations
///
/// [Authenticated Route] Organizations of the caller's accounts.
#[utoipa::path(
    get,
    path = "/api/organizations",
    params(FilterParams),
    responses((status = 200, description = "Organizations", body = OffsetPagination<Organization>)),
    tag = "crm"
)]
pub async fn list_organizations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Filters(filters): Filters,
) -> Result<Json<OffsetPagination<Organization>>, AppError> {
    let accounts = account_ids(&state, &user).await?;
    let (items, total) = state.repo.list_organizations(&accounts, &filters).await?;
    let (limit, offset) = limit_offset(&filters);
    Ok(Json(OffsetPagination {
        items,
        limit,
        offset,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/organizations/{id}",
    params(("id" = i64, Path, description = "The organization to retrieve.")),
    responses(
        (status = 200, description = "Organization", body = Organization),
        (status = 404, description = "Not Found")
    ),
    tag = "crm"
)]
pub async fn get_organization(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Organization>, AppError> {
    let accounts = account_ids(&state, &user).await?;
    state
        .repo
        .get_organization(id)
        .await?
        .filter(|organization| accounts.contains(&organization.account_id))
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))
}

/// list_contacts
///
/// [Authenticated Route] Contacts of the caller's accounts.
#[utoipa::path(
    get,
    path = "/api/contacts",
    params(FilterParams),
    responses((status = 200, description = "Contacts", body = OffsetPagination<Contact>)),
    tag = "crm"
)]
pub async fn list_contacts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Filters(filters): Filters,
) -> Result<Json<OffsetPagination<Contact>>, AppError> {
    let accounts = account_ids(&state, &user).await?;
    let (items, total) = state.repo.list_contacts(&accounts, &filters).await?;
    let (limit, offset) = limit_offset(&filters);
    Ok(Json(OffsetPagination {
        items,
        limit,
        offset,
        total,
    }))
}

/// get_contact
///
/// [Authenticated Route] A contact with its organization resolved.
#[utoipa::path(
    get,
    path = "/api/contacts/{id}",
    params(("id" = i64, Path, description = "The contact to retrieve.")),
    responses(
        (status = 200, description = "Contact", body = ContactDetail),
        (status = 404, description = "Not Found")
    ),
    tag = "crm"
)]
pub async fn get_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ContactDetail>, AppError> {
    let accounts = account_ids(&state, &user).await?;
    let contact = state
        .repo
        .get_contact(id)
        .await?
        .filter(|contact| accounts.contains(&contact.account_id))
        .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))?;

    let organization = match contact.organization_id {
        Some(organization_id) => state.repo.get_organization(organization_id).await?,
        None => None,
    };

    Ok(Json(ContactDetail {
        contact,
        organization,
    }))
}
