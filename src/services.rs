use chrono::Utc;

use crate::{
    crypt::CredentialVerifier,
    errors::AppError,
    filters::FilterCriterion,
    models::{NewUser, PasswordUpdate, ProfileUpdate, User, UserCreate, UserSchema, UserUpdate},
    repository::RepositoryState,
};

const INVALID_CREDENTIALS: &str = "User not found or password invalid";

/// Emails are stored and looked up trimmed and lowercased.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// UserService
///
/// User operations layered over the repository. Every password comparison goes
/// through the `CredentialVerifier`; plaintext passwords never reach the
/// repository.
#[derive(Clone)]
pub struct UserService {
    repo: RepositoryState,
    crypt: CredentialVerifier,
}

impl UserService {
    pub fn new(repo: RepositoryState, crypt: CredentialVerifier) -> Self {
        Self { repo, crypt }
    }

    /// authenticate
    ///
    /// Resolves login credentials to an active user. A missing record, a record
    /// without a stored hash and a wrong password are indistinguishable to the
    /// caller. Only an inactive account gets its own message.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        let Some(user) = self.repo.get_user_by_email(&normalize_email(username)).await? else {
            return Err(AppError::AuthenticationDenied(INVALID_CREDENTIALS.to_string()));
        };
        let Some(stored) = user.hashed_password.as_deref() else {
            return Err(AppError::AuthenticationDenied(INVALID_CREDENTIALS.to_string()));
        };
        if !self.crypt.verify(password, stored).await? {
            return Err(AppError::AuthenticationDenied(INVALID_CREDENTIALS.to_string()));
        }
        if !user.is_active {
            return Err(AppError::AuthenticationDenied(
                "User account is inactive".to_string(),
            ));
        }
        Ok(user)
    }

    /// update_password
    ///
    /// Replaces the stored hash once the current password verifies and the
    /// account is active.
    pub async fn update_password(
        &self,
        user: &User,
        data: PasswordUpdate,
    ) -> Result<User, AppError> {
        let Some(stored) = user.hashed_password.as_deref() else {
            return Err(AppError::AuthenticationDenied(INVALID_CREDENTIALS.to_string()));
        };
        if !self.crypt.verify(&data.current_password, stored).await? {
            return Err(AppError::AuthenticationDenied(INVALID_CREDENTIALS.to_string()));
        }
        if !user.is_active {
            return Err(AppError::AuthorizationDenied(
                "User account is not active".to_string(),
            ));
        }
        if data.new_password.is_empty() {
            return Err(AppError::ValidationFailed(
                "Password must not be empty".to_string(),
            ));
        }

        let mut updated = user.clone();
        updated.hashed_password = Some(self.crypt.hash(&data.new_password).await?);
        self.repo.update_user(&updated).await
    }

    /// create
    ///
    /// Hashes the password, stores the user and, when `initial_account` names
    /// one, creates an account owned by the new user.
    pub async fn create(&self, data: UserCreate) -> Result<User, AppError> {
        let email = normalize_email(&data.email);
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::ValidationFailed(
                "A valid email address is required".to_string(),
            ));
        }
        if data.password.is_empty() {
            return Err(AppError::ValidationFailed(
                "Password must not be empty".to_string(),
            ));
        }

        let hashed_password = self.crypt.hash(&data.password).await?;
        let user = self
            .repo
            .create_user(NewUser {
                email,
                name: data.name,
                hashed_password: Some(hashed_password),
                is_active: data.is_active,
                is_superuser: data.is_superuser,
                is_verified: data.is_verified,
            })
            .await?;

        if let Some(account_name) = data
            .initial_account
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            let account = self.repo.create_account(account_name, user.id).await?;
            tracing::info!(user_id = user.id, account_id = account.id, "initial account created");
        }

        Ok(user)
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn list_and_count(
        &self,
        filters: &[FilterCriterion],
    ) -> Result<(Vec<User>, i64), AppError> {
        self.repo.list_users(filters).await
    }

    /// update
    ///
    /// Applies a partial administrative update. A new password is hashed; setting
    /// `isVerified` stamps `verified_at`.
    pub async fn update(&self, email: &str, data: UserUpdate) -> Result<User, AppError> {
        let mut user = self.get_by_email(email).await?;

        if let Some(new_email) = data.email {
            user.email = normalize_email(&new_email);
        }
        if let Some(password) = data.password {
            user.hashed_password = Some(self.crypt.hash(&password).await?);
        }
        if data.name.is_some() {
            user.name = data.name;
        }
        if let Some(is_superuser) = data.is_superuser {
            user.is_superuser = is_superuser;
        }
        if let Some(is_active) = data.is_active {
            user.is_active = is_active;
        }
        if let Some(is_verified) = data.is_verified {
            if is_verified && !user.is_verified {
                user.verified_at = Some(Utc::now().date_naive());
            }
            if !is_verified {
                user.verified_at = None;
            }
            user.is_verified = is_verified;
        }

        self.repo.update_user(&user).await
    }

    pub async fn update_profile(&self, user: &User, data: ProfileUpdate) -> Result<User, AppError> {
        let mut updated = user.clone();
        if data.name.is_some() {
            updated.name = data.name;
        }
        self.repo.update_user(&updated).await
    }

    pub async fn promote_to_superuser(&self, email: &str) -> Result<User, AppError> {
        let mut user = self.get_by_email(email).await?;
        if user.is_superuser {
            return Ok(user);
        }
        user.is_superuser = true;
        self.repo.update_user(&user).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if self.repo.delete_user(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound("User not found".to_string()))
        }
    }

    pub async fn delete_by_email(&self, email: &str) -> Result<(), AppError> {
        let user = self.get_by_email(email).await?;
        self.delete(user.id).await
    }

    /// The public projection of `user`, with its account memberships.
    pub async fn to_schema(&self, user: &User) -> Result<UserSchema, AppError> {
        let accounts = self.repo.get_user_accounts(user.id).await?;
        Ok(UserSchema::from_user(user, accounts))
    }
}
