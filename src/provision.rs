//! Local system user provisioning.
//!
//! Composed with any [`Authenticator`] through [`LocalAuthenticator`]: the
//! provisioner runs after a successful login and a failure rejects the login.

use crate::auth::authenticator::{Authenticator, IdentityRecord};
use crate::config::LocalUsersConfig;
use crate::error::{AuthError, ConfigError, ProvisionError};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

/// Makes sure a local account exists for an authenticated user.
#[async_trait]
pub trait UserProvisioner: Send + Sync {
    async fn ensure_user(&self, username: &str) -> Result<(), ProvisionError>;
}

/// Provisions accounts on the host operating system.
#[derive(Debug, Clone)]
pub struct SystemUserProvisioner {
    create_system_users: bool,
    add_user_cmd: Vec<String>,
}

impl SystemUserProvisioner {
    pub fn new(config: &LocalUsersConfig) -> Self {
        Self {
            create_system_users: config.create_system_users,
            add_user_cmd: config.add_user_cmd.clone(),
        }
    }

    async fn user_exists(&self, username: &str) -> Result<bool, ProvisionError> {
        let output = Command::new("id").arg("-u").arg(username).output().await?;
        Ok(output.status.success())
    }

    async fn add_user(&self, username: &str) -> Result<(), ProvisionError> {
        let (program, args) = self
            .add_user_cmd
            .split_first()
            .ok_or(ProvisionError::NoCommand)?;

        info!("Creating system user {}", username);

        let output = Command::new(program)
            .args(args)
            .arg(username)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                username: username.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl UserProvisioner for SystemUserProvisioner {
    async fn ensure_user(&self, username: &str) -> Result<(), ProvisionError> {
        validate_system_username(username)?;

        if self.user_exists(username).await? {
            debug!("System user {} already exists", username);
            return Ok(());
        }

        if !self.create_system_users {
            return Err(ProvisionError::UserMissing(username.to_string()));
        }

        self.add_user(username).await
    }
}

/// Accepts ASCII letters, digits, `.`, `_` and `-`, not starting with `-`.
pub fn validate_system_username(username: &str) -> Result<(), ProvisionError> {
    let valid = !username.is_empty()
        && username.len() <= 32
        && !username.starts_with('-')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(ProvisionError::InvalidUsername(username.to_string()))
    }
}

/// An authenticator that also provisions a local account for every login.
pub struct LocalAuthenticator<A, P> {
    inner: A,
    provisioner: P,
}

impl<A, P> LocalAuthenticator<A, P> {
    pub fn new(inner: A, provisioner: P) -> Self {
        Self { inner, provisioner }
    }
}

#[async_trait]
impl<A, P> Authenticator for LocalAuthenticator<A, P>
where
    A: Authenticator,
    P: UserProvisioner,
{
    fn login_service(&self) -> &str {
        self.inner.login_service()
    }

    fn authorize_url(&self, state: &str) -> Result<Url, ConfigError> {
        self.inner.authorize_url(state)
    }

    async fn authenticate(&self, code: &str) -> Result<IdentityRecord, AuthError> {
        let record = self.inner.authenticate(code).await?;
        self.provisioner.ensure_user(&record.username).await?;
        Ok(record)
    }
}
