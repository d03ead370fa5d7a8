mod common;

use common::{TestApp, client, csrf_token, login, seed_user, spawn_app};
use pingcrm::repository::Repository;
use reqwest::{StatusCode, header::LOCATION};
use serde_json::{Value, json};

async fn app_with_member(email: &str, password: &str) -> TestApp {
    let app = spawn_app().await;
    let user = seed_user(&app.repo, email, password, true, false).await;
    let account = app
        .repo
        .create_account("Acme", user.id)
        .await
        .expect("account");
    app.repo.insert_organization(account.id, "Acme Widgets");
    app
}

fn location(response: &reqwest::Response) -> &str {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

// --- Public ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/schema/openapi.json", app.address))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = response.json().await.unwrap();
    assert!(doc["paths"].get("/api/users").is_some());
    assert!(doc["paths"].get("/api/contacts/{id}").is_some());
}

#[tokio::test]
async fn test_home_redirects_anonymous_visitor_to_login() {
    let app = spawn_app().await;
    let response = client().get(format!("{}/", app.address)).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login/");
}

#[tokio::test]
async fn test_login_page_renders_html_shell_with_anonymous_auth() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/login/", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let has_csrf_cookie = response.cookies().any(|c| c.name() == "XSRF-TOKEN");
    assert!(has_csrf_cookie);
    let html = response.text().await.unwrap();
    assert!(html.contains(r#"<div id="app" data-page=""#));
    assert!(html.contains("Auth/Login"));
    assert!(html.contains("&quot;isAuthenticated&quot;:false"));
}

// --- Authentication ---

#[tokio::test]
async fn test_anonymous_page_visit_redirects_to_login() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/dashboard/", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login/");
}

#[tokio::test]
async fn test_anonymous_api_call_is_unauthorized() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/api/organizations", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status_code"], 401);
}

#[tokio::test]
async fn test_post_without_csrf_token_is_forbidden() {
    let app = app_with_member("csrf@example.com", "secret").await;
    let client = client();
    csrf_token(&client, &app.address).await;

    let response = client
        .post(format!("{}/login/", app.address))
        .json(&json!({ "username": "csrf@example.com", "password": "secret" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "CSRF token verification failed");
}

#[tokio::test]
async fn test_login_with_bad_password_is_unauthorized() {
    let app = app_with_member("bad@example.com", "secret").await;
    let client = client();
    let token = csrf_token(&client, &app.address).await;

    let response = client
        .post(format!("{}/login/", app.address))
        .header("X-XSRF-TOKEN", token)
        .json(&json!({ "username": "bad@example.com", "password": "nope" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "User not found or password invalid");
}

#[tokio::test]
async fn test_login_flow_reaches_protected_pages() {
    let app = app_with_member("flow@example.com", "secret").await;
    let client = client();
    login(&client, &app.address, "flow@example.com", "secret").await;

    let response = client
        .get(format!("{}/dashboard/", app.address))
        .header("X-Inertia", "true")
        .header("X-Inertia-Version", "1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-inertia"], "true");
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["component"], "Dashboard/Index");
    assert_eq!(page["url"], "/dashboard/");
    assert_eq!(page["props"]["auth"]["isAuthenticated"], true);
    assert_eq!(page["props"]["auth"]["user"]["email"], "flow@example.com");
    assert_eq!(
        page["props"]["flash"]["info"][0],
        "Your account was successfully authenticated."
    );

    // Flash messages are consumed by the first render.
    let again: Value = client
        .get(format!("{}/dashboard/", app.address))
        .header("X-Inertia", "true")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["props"]["flash"], json!({}));
}

#[tokio::test]
async fn test_authenticated_visit_to_login_redirects_to_dashboard() {
    let app = app_with_member("again@example.com", "secret").await;
    let client = client();
    login(&client, &app.address, "again@example.com", "secret").await;

    let response = client
        .get(format!("{}/login/", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard/");
}

#[tokio::test]
async fn test_stale_asset_version_forces_reload() {
    let app = app_with_member("stale@example.com", "secret").await;
    let client = client();
    login(&client, &app.address, "stale@example.com", "secret").await;

    let response = client
        .get(format!("{}/dashboard/", app.address))
        .header("X-Inertia", "true")
        .header("X-Inertia-Version", "outdated")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response.headers()["x-inertia-location"], "/dashboard/");
}

#[tokio::test]
async fn test_organizations_are_listed_for_members() {
    let app = app_with_member("crm@example.com", "secret").await;
    let client = client();
    login(&client, &app.address, "crm@example.com", "secret").await;

    let response = client
        .get(format!("{}/api/organizations?pageSize=5", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 5);
    assert_eq!(page["items"][0]["name"], "Acme Widgets");
}

#[tokio::test]
async fn test_invalid_filter_is_bad_request() {
    let app = app_with_member("filter@example.com", "secret").await;
    let client = client();
    login(&client, &app.address, "filter@example.com", "secret").await;

    let response = client
        .get(format!("{}/api/contacts?pageSize=0", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let overflow = client
        .get(format!(
            "{}/api/contacts?pageSize=9223372036854775807&currentPage=3",
            app.address
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(overflow.status(), StatusCode::BAD_REQUEST);
    let body: Value = overflow.json().await.unwrap();
    assert_eq!(body["status_code"], 400);
}

// --- Guards ---

#[tokio::test]
async fn test_regular_user_cannot_reach_admin_api() {
    let app = app_with_member("plain@example.com", "secret").await;
    let client = client();
    login(&client, &app.address, "plain@example.com", "secret").await;

    let response = client
        .get(format!("{}/api/users", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["detail"],
        "Your account does not have enough privileges to access this content."
    );
}

#[tokio::test]
async fn test_superuser_manages_users() {
    let app = spawn_app().await;
    seed_user(&app.repo, "root@example.com", "secret", true, true).await;
    let client = client();
    let token = login(&client, &app.address, "root@example.com", "secret").await;

    let created = client
        .post(format!("{}/api/users", app.address))
        .header("X-XSRF-TOKEN", &token)
        .json(&json!({ "email": "new@example.com", "password": "pw", "name": "New" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let listing: Value = client
        .get(format!("{}/api/users?orderBy=email&sortOrder=asc", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["total"], 2);

    let deleted = client
        .delete(format!("{}/api/users/new@example.com", app.address))
        .header("X-XSRF-TOKEN", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.repo.user_count(), 1);
}

#[tokio::test]
async fn test_deactivated_user_loses_session_access() {
    let app = app_with_member("later@example.com", "secret").await;
    let client = client();
    login(&client, &app.address, "later@example.com", "secret").await;

    let mut user = app.repo.stored_user("later@example.com").unwrap();
    user.is_active = false;
    app.repo.update_user(&user).await.unwrap();

    let response = client
        .get(format!("{}/api/organizations", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- Profile ---

#[tokio::test]
async fn test_password_update_then_login_with_new_password() {
    let app = app_with_member("change@example.com", "before").await;
    let client = client();
    let token = login(&client, &app.address, "change@example.com", "before").await;

    let response = client
        .patch(format!("{}/profile/password-update/", app.address))
        .header("X-XSRF-TOKEN", &token)
        .json(&json!({ "currentPassword": "before", "newPassword": "after" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Your password was successfully modified.");

    let fresh = common::client();
    login(&fresh, &app.address, "change@example.com", "after").await;
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let app = app_with_member("leave@example.com", "secret").await;
    let client = client();
    let token = login(&client, &app.address, "leave@example.com", "secret").await;

    let response = client
        .post(format!("{}/logout/", app.address))
        .header("X-XSRF-TOKEN", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login/");

    let after = client
        .get(format!("{}/dashboard/", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&after), "/login/");
}

#[tokio::test]
async fn test_remove_account_deletes_user_and_ends_session() {
    let app = app_with_member("gone@example.com", "secret").await;
    let client = client();
    let token = login(&client, &app.address, "gone@example.com", "secret").await;

    let response = client
        .delete(format!("{}/profile/", app.address))
        .header("X-XSRF-TOKEN", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(app.repo.stored_user("gone@example.com").is_none());

    let after = client
        .get(format!("{}/dashboard/", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&after), "/login/");
}

#[tokio::test]
async fn test_register_signs_in_new_user() {
    let app = spawn_app().await;
    let client = client();
    let token = csrf_token(&client, &app.address).await;

    let response = client
        .post(format!("{}/register/", app.address))
        .header("X-XSRF-TOKEN", &token)
        .json(&json!({
            "email": "Fresh@Example.com",
            "password": "secret",
            "initialAccount": "Fresh Co"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard/");

    let profile: Value = client
        .get(format!("{}/profile/", app.address))
        .header("X-Inertia", "true")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["component"], "Profile/Edit");
    assert_eq!(profile["props"]["email"], "fresh@example.com");
    assert_eq!(profile["props"]["accounts"][0]["accountName"], "Fresh Co");

    // A later sign-in with the registration spelling finds the same user.
    login(&common::client(), &app.address, "Fresh@Example.com", "secret").await;
}
