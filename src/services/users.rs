use axum::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::baas::account::{Accounts, Session};
use crate::baas::databases::{Collection, Query};
use crate::baas::storage::Storage;
use crate::baas::Baas;
use crate::models::user::*;

use super::{ServiceError, ServiceResult, Svc};

#[async_trait]
pub trait UserService: Svc {
    async fn create_user_account(&self, user: NewUser) -> ServiceResult<User>;
    async fn sign_in(&self, creds: SignIn) -> ServiceResult<Session>;
    async fn sign_out(&self, secret: &str) -> ServiceResult<()>;
    /// The user document behind a session secret.
    async fn current_user(&self, secret: &str) -> ServiceResult<User>;
    /// Newest first.
    async fn get_users(&self, limit: Option<usize>) -> ServiceResult<Vec<User>>;
    async fn get_user_by_id(&self, id: Uuid) -> ServiceResult<User>;
    async fn update_user(&self, id: Uuid, update: UpdateUser) -> ServiceResult<User>;
}

#[derive(Clone)]
pub struct UserServiceBaas {
    users: Collection<User>,
    accounts: Accounts,
    storage: Storage,
    baas: Baas,
}

impl Svc for UserServiceBaas {}

#[async_trait]
impl UserService for UserServiceBaas {
    #[tracing::instrument(skip_all, fields(username = %user.username))]
    async fn create_user_account(&self, mut user: NewUser) -> ServiceResult<User> {
        // validate what gets stored
        user.name = user.name.trim().to_owned();
        user.username = user.username.trim().to_owned();
        user.validate()?;

        if self
            .users
            .find_by_key(&User::username_key(&user.username))
            .await
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }

        let account = self
            .accounts
            .create(&user.email, &user.password, &user.name)
            .await?;

        let now = Utc::now();
        let doc = User {
            id: Uuid::now_v7(),
            account_id: account.id,
            name: account.name.clone(),
            username: user.username,
            email: account.email.clone(),
            image_id: None,
            image_url: self.baas.initials_avatar_url(&account.name),
            bio: String::new(),
            created_at: now,
            updated_at: now,
        };

        match self.users.create(doc).await {
            Ok(created) => {
                info!(user_id = %created.id, "user account created");
                Ok(created)
            }
            Err(e) => {
                warn!(error = %e, "saving user failed, removing account");
                if let Err(undo) = self.accounts.delete(account.id).await {
                    error!(error = %undo, account_id = %account.id, "could not remove account");
                }
                Err(e.into())
            }
        }
    }

    #[tracing::instrument(skip_all)]
    async fn sign_in(&self, creds: SignIn) -> ServiceResult<Session> {
        creds.validate()?;
        Ok(self
            .accounts
            .create_email_session(&creds.email, &creds.password)
            .await?)
    }

    async fn sign_out(&self, secret: &str) -> ServiceResult<()> {
        Ok(self.accounts.delete_session(secret).await?)
    }

    async fn current_user(&self, secret: &str) -> ServiceResult<User> {
        let account = self.accounts.get(secret).await?;
        let account_id = account.id;
        self.users
            .list(
                Query::new()
                    .filter(move |u: &User| u.account_id == account_id)
                    .limit(1),
            )
            .await?
            .documents
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("user for account {account_id}")))
    }

    async fn get_users(&self, limit: Option<usize>) -> ServiceResult<Vec<User>> {
        let mut query = Query::new();
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(self.users.list(query).await?.documents)
    }

    async fn get_user_by_id(&self, id: Uuid) -> ServiceResult<User> {
        Ok(self.users.get(id).await?)
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_user(&self, id: Uuid, update: UpdateUser) -> ServiceResult<User> {
        update.validate()?;
        let existing = self.users.get(id).await?;

        let new_image = match update.file {
            Some(file) => Some(self.storage.upload_image(file).await?),
            None => None,
        };

        let replacement = new_image.clone();
        let updated = self
            .users
            .update(id, move |u| {
                u.name = update.name;
                u.bio = update.bio;
                if let Some((image_id, url)) = replacement {
                    u.image_id = Some(image_id);
                    u.image_url = url;
                }
                u.updated_at = Utc::now();
            })
            .await;

        match (updated, new_image) {
            (Ok(user), Some(_)) => {
                if let Some(old) = existing.image_id {
                    self.storage.discard(old).await;
                }
                Ok(user)
            }
            (Ok(user), None) => Ok(user),
            (Err(e), Some((image_id, _))) => {
                self.storage.discard(image_id).await;
                Err(e.into())
            }
            (Err(e), None) => Err(e.into()),
        }
    }
}

impl UserServiceBaas {
    pub fn new(baas: &Baas) -> Self {
        Self {
            users: baas.databases.users.clone(),
            accounts: baas.accounts.clone(),
            storage: baas.storage.clone(),
            baas: baas.clone(),
        }
    }
}
