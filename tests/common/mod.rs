#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pingcrm::{
    AppConfig, AppError, AppState, CredentialVerifier, create_router,
    filters::FilterCriterion,
    models::{
        Account, AccountAssignment, Contact, NewUser, Organization, ROLE_ADMIN, User,
    },
    repository::{Repository, RepositoryState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_sessions::MemoryStore;

// --- In-Memory Repository ---

struct Membership {
    account_id: i64,
    user_id: i64,
    role: String,
    is_owner: bool,
}

/// A `Repository` backed by vectors. Records the filters it receives so tests
/// can assert on what handlers forwarded.
#[derive(Default)]
pub struct InMemoryRepository {
    users: Mutex<Vec<User>>,
    accounts: Mutex<Vec<Account>>,
    members: Mutex<Vec<Membership>>,
    organizations: Mutex<Vec<Organization>>,
    contacts: Mutex<Vec<Contact>>,
    pub last_filters: Mutex<Vec<FilterCriterion>>,
}

impl InMemoryRepository {
    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    pub fn stored_user(&self, email: &str) -> Option<User> {
        self.users.lock().iter().find(|u| u.email == email).cloned()
    }

    pub fn insert_organization(&self, account_id: i64, name: &str) -> Organization {
        let mut organizations = self.organizations.lock();
        let now = Utc::now();
        let organization = Organization {
            id: organizations.len() as i64 + 1,
            account_id,
            name: name.to_string(),
            email: None,
            phone: None,
            address: None,
            city: None,
            region: None,
            country: None,
            postal_code: None,
            created_at: now,
            updated_at: now,
        };
        organizations.push(organization.clone());
        organization
    }

    pub fn insert_contact(
        &self,
        account_id: i64,
        organization_id: Option<i64>,
        first_name: &str,
        last_name: &str,
    ) -> Contact {
        let mut contacts = self.contacts.lock();
        let now = Utc::now();
        let contact = Contact {
            id: contacts.len() as i64 + 1,
            account_id,
            organization_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: None,
            phone: None,
            address: None,
            city: None,
            region: None,
            country: None,
            postal_code: None,
            created_at: now,
            updated_at: now,
        };
        contacts.push(contact.clone());
        contact
    }

    fn record(&self, filters: &[FilterCriterion]) {
        *self.last_filters.lock() = filters.to_vec();
    }
}

/// Applies id-set filters and limit/offset; other criteria are only recorded.
fn apply_filters<T: Clone>(
    items: Vec<T>,
    id_of: impl Fn(&T) -> i64,
    filters: &[FilterCriterion],
) -> (Vec<T>, i64) {
    let mut matching: Vec<T> = items
        .into_iter()
        .filter(|item| {
            filters.iter().all(|filter| match filter {
                FilterCriterion::CollectionFilter { field, values } if field == "id" => {
                    values.contains(&id_of(item))
                }
                _ => true,
            })
        })
        .collect();
    let total = matching.len() as i64;

    if let Some((limit, offset)) = filters.iter().find_map(|filter| match filter {
        FilterCriterion::LimitOffset { limit, offset } => Some((*limit, *offset)),
        _ => None,
    }) {
        matching = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
    }
    (matching, total)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.stored_user(email))
    }

    async fn list_users(&self, filters: &[FilterCriterion]) -> Result<(Vec<User>, i64), AppError> {
        self.record(filters);
        let users = self.users.lock().clone();
        Ok(apply_filters(users, |u| u.id, filters))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.lock();
        if users.iter().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let created = User {
            id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            email: user.email,
            name: user.name,
            hashed_password: user.hashed_password,
            avatar_url: None,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_verified: user.is_verified,
            verified_at: user.is_verified.then(|| now.date_naive()),
            joined_at: now.date_naive(),
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: &User) -> Result<User, AppError> {
        let mut users = self.users.lock();
        let stored = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        *stored = User {
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut users = self.users.lock();
        let before = users.len();
        users.retain(|u| u.id != id);
        self.members.lock().retain(|m| m.user_id != id);
        Ok(users.len() < before)
    }

    async fn get_user_accounts(&self, user_id: i64) -> Result<Vec<AccountAssignment>, AppError> {
        let accounts = self.accounts.lock();
        Ok(self
            .members
            .lock()
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                accounts
                    .iter()
                    .find(|a| a.id == m.account_id)
                    .map(|a| AccountAssignment {
                        account_id: a.id,
                        account_name: a.name.clone(),
                        is_owner: m.is_owner,
                        role: m.role.clone(),
                    })
            })
            .collect())
    }

    async fn create_account(&self, name: &str, owner_id: i64) -> Result<Account, AppError> {
        let mut accounts = self.accounts.lock();
        let now = Utc::now();
        let account = Account {
            id: accounts.len() as i64 + 1,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        accounts.push(account.clone());
        self.members.lock().push(Membership {
            account_id: account.id,
            user_id: owner_id,
            role: ROLE_ADMIN.to_string(),
            is_owner: true,
        });
        Ok(account)
    }

    async fn list_organizations(
        &self,
        account_ids: &[i64],
        filters: &[FilterCriterion],
    ) -> Result<(Vec<Organization>, i64), AppError> {
        self.record(filters);
        let scoped: Vec<Organization> = self
            .organizations
            .lock()
            .iter()
            .filter(|o| account_ids.contains(&o.account_id))
            .cloned()
            .collect();
        Ok(apply_filters(scoped, |o| o.id, filters))
    }

    async fn get_organization(&self, id: i64) -> Result<Option<Organization>, AppError> {
        Ok(self.organizations.lock().iter().find(|o| o.id == id).cloned())
    }

    async fn list_contacts(
        &self,
        account_ids: &[i64],
        filters: &[FilterCriterion],
    ) -> Result<(Vec<Contact>, i64), AppError> {
        self.record(filters);
        let scoped: Vec<Contact> = self
            .contacts
            .lock()
            .iter()
            .filter(|c| account_ids.contains(&c.account_id))
            .cloned()
            .collect();
        Ok(apply_filters(scoped, |c| c.id, filters))
    }

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, AppError> {
        Ok(self.contacts.lock().iter().find(|c| c.id == id).cloned())
    }
}

// --- Fixtures ---

/// Configuration with cheap Argon2 parameters so tests hash quickly.
pub fn test_config() -> AppConfig {
    AppConfig {
        password_memory_kib: 1024,
        password_iterations: 1,
        password_parallelism: 1,
        ..AppConfig::default()
    }
}

pub fn test_crypt() -> CredentialVerifier {
    CredentialVerifier::from_config(&test_config()).expect("valid test argon2 params")
}

pub fn test_state(repo: Arc<InMemoryRepository>) -> AppState {
    AppState::new(repo as RepositoryState, test_config()).expect("valid test state")
}

/// A user record with the given flags and no password.
pub fn user(id: i64, email: &str) -> User {
    let now = Utc::now();
    User {
        id,
        email: email.to_string(),
        name: Some("Test User".to_string()),
        hashed_password: None,
        avatar_url: None,
        is_active: true,
        is_superuser: false,
        is_verified: false,
        verified_at: None,
        joined_at: now.date_naive(),
        created_at: now,
        updated_at: now,
    }
}

/// Stores a user with a hashed password and returns the stored record.
pub async fn seed_user(
    repo: &InMemoryRepository,
    email: &str,
    password: &str,
    is_active: bool,
    is_superuser: bool,
) -> User {
    let hashed = test_crypt().hash(password).await.expect("hash");
    repo.create_user(NewUser {
        email: email.to_string(),
        name: Some("Seeded User".to_string()),
        hashed_password: Some(hashed),
        is_active,
        is_superuser,
        is_verified: false,
    })
    .await
    .expect("seed user")
}

// --- Live Server ---

pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryRepository>,
}

/// Serves the full router on an ephemeral port with an in-memory repository
/// and session store.
pub async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::default());
    let router = create_router(test_state(repo.clone()), MemoryStore::default());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().expect("local addr").port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server");
    });

    TestApp { address, repo }
}

/// A client that keeps cookies and does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client")
}

/// Performs a GET to obtain the CSRF cookie and returns its value.
pub async fn csrf_token(client: &reqwest::Client, address: &str) -> String {
    let response = client
        .get(format!("{address}/login/"))
        .send()
        .await
        .expect("csrf bootstrap");
    response
        .cookies()
        .find(|cookie| cookie.name() == "XSRF-TOKEN")
        .map(|cookie| cookie.value().to_string())
        .expect("XSRF-TOKEN cookie")
}

/// Logs `email` in through the login form; returns the CSRF token to use next.
pub async fn login(client: &reqwest::Client, address: &str, email: &str, password: &str) -> String {
    let token = csrf_token(client, address).await;
    let response = client
        .post(format!("{address}/login/"))
        .header("X-XSRF-TOKEN", &token)
        .json(&serde_json::json!({ "username": email, "password": password }))
        .send()
        .await
        .expect("login");
    assert_eq!(response.status(), 303, "login should redirect");
    response
        .cookies()
        .find(|cookie| cookie.name() == "XSRF-TOKEN")
        .map(|cookie| cookie.value().to_string())
        .unwrap_or(token)
}
