use std::{collections::BTreeMap, sync::Arc};

use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    dto::{CreateUserRequest, LoginRequest, UpdateUserRequest},
    repo::UserRepo,
    repo_types::User,
    CredentialsError, UserError,
};
use crate::{
    auth::{
        claims::{all_claims, validate_all},
        jwt::issue_token,
        password::{hash_password, verify_password},
    },
    store::{ObjectId, TxnOptions, Write},
};

/// Successful login: the stored user plus a freshly signed token.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
}

/// User lifecycle and authentication. Cheap to clone; holds only the
/// repository handle and the signing secret.
#[derive(Clone)]
pub struct UserService {
    repo: UserRepo,
    jwt_secret: Arc<str>,
}

impl UserService {
    pub fn new(repo: UserRepo, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            repo,
            jwt_secret: jwt_secret.into(),
        }
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: LoginRequest) -> Result<LoginOutcome, UserError> {
        let user = match self.repo.find_by_email(&credentials.email).await {
            Ok(u) => u,
            Err(UserError::NotFound(_)) => {
                warn!("login unknown email");
                return Err(CredentialsError::EmailNotFound.into());
            }
            Err(e) => return Err(e),
        };

        if !verify_password(&credentials.password, &user.password_hash) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(CredentialsError::IncorrectPassword.into());
        }

        let token = issue_token(&user.id.to_string(), &self.jwt_secret, &user.claims)?;
        info!(user_id = %user.id, "user logged in");
        Ok(LoginOutcome { user, token })
    }

    /// Nothing is written unless the claims are valid and the password hashed.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: CreateUserRequest) -> Result<ObjectId, UserError> {
        validate_all(&input.claims)?;
        let password_hash = hash_password(&input.password)?;

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: ObjectId::new(),
            name: input.name,
            surnames: input.surnames,
            email: input.email,
            password_hash,
            claims: input.claims,
            created_at: now,
            updated_at: now,
        };
        let id = self.repo.insert(&user).await?;
        info!(user_id = %id, "user created");
        Ok(id)
    }

    /// False until the first user is stored.
    pub async fn has_users(&self) -> Result<bool, UserError> {
        Ok(!self.repo.find_all().await?.is_empty())
    }

    pub async fn get_all(&self) -> Result<Vec<User>, UserError> {
        self.repo.find_all().await
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        self.repo.find_by_email(email).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<User, UserError> {
        self.repo.find_by_id(id).await
    }

    /// Merge-patch: only supplied fields change. Every check runs before the
    /// record is stamped and written, so a failure leaves it untouched.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: UpdateUserRequest) -> Result<(), UserError> {
        let mut user = self.repo.find_by_id(id).await?;

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(surnames) = patch.surnames {
            user.surnames = surnames;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(new_password) = patch.new_password {
            let old_password = patch
                .old_password
                .ok_or(CredentialsError::OldPasswordRequired)?;
            if !verify_password(&old_password, &user.password_hash) {
                warn!(user_id = %user.id, "old password incorrect");
                return Err(CredentialsError::OldPasswordIncorrect.into());
            }
            user.password_hash = hash_password(&new_password)?;
        }
        if let Some(claims) = patch.claims {
            validate_all(&claims)?;
            user.claims = claims;
        }
        user.updated_at = OffsetDateTime::now_utc();

        self.repo.replace_by_id(&user.id, &user).await?;
        info!(user_id = %user.id, "user updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), UserError> {
        self.repo.delete_by_id(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Every valid claim code with its name.
    pub fn get_claims(&self) -> &'static BTreeMap<i32, &'static str> {
        all_claims()
    }

    pub async fn ping(&self) -> Result<(), UserError> {
        self.repo.ping().await
    }

    /// Inserts two users in one majority-write, snapshot-read transaction.
    /// Either both become visible or neither does.
    #[instrument(skip(self))]
    pub async fn atomic_transaction_proof(&self) -> Result<(), UserError> {
        let now = OffsetDateTime::now_utc();
        let mut writes = Vec::with_capacity(2);
        for label in ["Entity1", "Entity2"] {
            writes.push(Write::Insert(User {
                id: ObjectId::new(),
                name: label.into(),
                surnames: label.into(),
                email: label.into(),
                password_hash: hash_password(label)?,
                claims: Vec::new(),
                created_at: now,
                updated_at: now,
            }));
        }

        self.repo
            .run_atomic(&TxnOptions::majority_snapshot(), writes)
            .await?;
        info!("atomic transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{claims::Claim, jwt::verify_token},
        store::MemoryStore,
    };
    use assert_matches::assert_matches;
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    fn service() -> (UserService, MemoryStore<User>) {
        let store = MemoryStore::<User>::new();
        let svc = UserService::new(UserRepo::new(Arc::new(store.clone())), SECRET);
        (svc, store)
    }

    fn new_user(email: &str, claims: Vec<i32>) -> CreateUserRequest {
        CreateUserRequest {
            name: "Ada".into(),
            surnames: "Lovelace Byron".into(),
            email: email.into(),
            password: "analytical-engine".into(),
            claims,
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn create_then_get_by_id_round_trip() {
        let (svc, _) = service();
        let id = svc
            .create(new_user("ada@example.com", vec![0, 1]))
            .await
            .expect("create");

        let user = svc.get_by_id(&id.to_string()).await.expect("get");
        assert_eq!(user.id, id);
        assert_eq!(user.name, "Ada");
        assert_eq!(user.surnames, "Lovelace Byron");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.claims, vec![0, 1]);
        assert_ne!(user.password_hash, "analytical-engine");
        assert!(verify_password("analytical-engine", &user.password_hash));
        assert_eq!(user.created_at, user.updated_at);
    }

    #[tokio::test]
    async fn create_with_invalid_claim_writes_nothing() {
        let (svc, store) = service();
        let err = svc
            .create(new_user("ada@example.com", vec![0, 99999]))
            .await
            .unwrap_err();
        assert_matches!(err, UserError::InvalidClaim(99999));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn create_duplicate_email_conflicts() {
        let (svc, store) = service();
        svc.create(new_user("ada@example.com", vec![])).await.unwrap();
        let err = svc
            .create(new_user("ada@example.com", vec![]))
            .await
            .unwrap_err();
        assert_matches!(err, UserError::Conflict(field) if field == "email");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn login_returns_user_and_token_with_claims() {
        let (svc, _) = service();
        let id = svc
            .create(new_user("ada@example.com", vec![0]))
            .await
            .unwrap();

        let outcome = svc
            .login(login("ada@example.com", "analytical-engine"))
            .await
            .expect("login");
        assert_eq!(outcome.user.id, id);

        let claims = verify_token(&outcome.token, SECRET).expect("token verifies");
        assert!(claims.authorized);
        assert_eq!(claims.user_id, id.to_string());
        assert!(claims.has(Claim::Admin));
        assert!(!claims.has(Claim::Operator));
    }

    #[tokio::test]
    async fn login_unknown_email_is_a_credentials_error() {
        let (svc, _) = service();
        let err = svc
            .login(login("nobody@example.com", "whatever-pass"))
            .await
            .unwrap_err();
        assert_matches!(err, UserError::Credentials(CredentialsError::EmailNotFound));
        assert_eq!(err.to_string(), "email not found");
    }

    #[tokio::test]
    async fn login_wrong_password_is_a_credentials_error() {
        let (svc, _) = service();
        svc.create(new_user("ada@example.com", vec![])).await.unwrap();
        let err = svc
            .login(login("ada@example.com", "difference-engine"))
            .await
            .unwrap_err();
        assert_matches!(err, UserError::Credentials(CredentialsError::IncorrectPassword));
        assert_eq!(err.to_string(), "incorrect password");
    }

    #[tokio::test]
    async fn has_users_flips_after_first_insert() {
        let (svc, _) = service();
        assert!(!svc.has_users().await.unwrap());
        svc.create(new_user("a@example.com", vec![0])).await.unwrap();
        assert!(svc.has_users().await.unwrap());
    }

    #[tokio::test]
    async fn get_by_email_and_get_all() {
        let (svc, _) = service();
        svc.create(new_user("a@example.com", vec![])).await.unwrap();
        svc.create(new_user("b@example.com", vec![1])).await.unwrap();

        let b = svc.get_by_email("b@example.com").await.expect("found");
        assert_eq!(b.claims, vec![1]);
        assert_matches!(
            svc.get_by_email("c@example.com").await,
            Err(UserError::NotFound(_))
        );

        let mut emails: Vec<_> = svc
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        emails.sort();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn get_by_id_distinguishes_malformed_from_missing() {
        let (svc, _) = service();
        assert_matches!(svc.get_by_id("xyz").await, Err(UserError::InvalidId(_)));
        assert_matches!(
            svc.get_by_id(&ObjectId::new().to_string()).await,
            Err(UserError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn update_name_only_touches_name_and_updated_at() {
        let (svc, _) = service();
        let id = svc
            .create(new_user("ada@example.com", vec![1]))
            .await
            .unwrap()
            .to_string();
        let before = svc.get_by_id(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let patch = UpdateUserRequest {
            name: Some("Augusta".into()),
            ..Default::default()
        };
        svc.update(&id, patch).await.expect("update");

        let after = svc.get_by_id(&id).await.unwrap();
        assert_eq!(after.name, "Augusta");
        assert!(after.updated_at > before.updated_at);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.email, before.email);
        assert_eq!(after.surnames, before.surnames);
        assert_eq!(after.claims, before.claims);
        assert_eq!(after.password_hash, before.password_hash);
    }

    #[tokio::test]
    async fn update_password_requires_matching_old_password() {
        let (svc, _) = service();
        let id = svc
            .create(new_user("ada@example.com", vec![]))
            .await
            .unwrap()
            .to_string();
        let before = svc.get_by_id(&id).await.unwrap();

        let wrong = UpdateUserRequest {
            old_password: Some("not-the-password".into()),
            new_password: Some("brand-new-secret".into()),
            ..Default::default()
        };
        let err = svc.update(&id, wrong).await.unwrap_err();
        assert_matches!(err, UserError::Credentials(CredentialsError::OldPasswordIncorrect));

        let missing = UpdateUserRequest {
            new_password: Some("brand-new-secret".into()),
            ..Default::default()
        };
        let err = svc.update(&id, missing).await.unwrap_err();
        assert_matches!(err, UserError::Credentials(CredentialsError::OldPasswordRequired));

        let unchanged = svc.get_by_id(&id).await.unwrap();
        assert_eq!(unchanged, before);
    }

    #[tokio::test]
    async fn update_password_with_correct_old_password() {
        let (svc, _) = service();
        let id = svc
            .create(new_user("ada@example.com", vec![]))
            .await
            .unwrap()
            .to_string();

        let patch = UpdateUserRequest {
            old_password: Some("analytical-engine".into()),
            new_password: Some("brand-new-secret".into()),
            ..Default::default()
        };
        svc.update(&id, patch).await.expect("update");

        assert!(svc
            .login(login("ada@example.com", "brand-new-secret"))
            .await
            .is_ok());
        assert_matches!(
            svc.login(login("ada@example.com", "analytical-engine")).await,
            Err(UserError::Credentials(CredentialsError::IncorrectPassword))
        );
    }

    #[tokio::test]
    async fn update_with_invalid_claims_leaves_record_unchanged() {
        let (svc, _) = service();
        let id = svc
            .create(new_user("ada@example.com", vec![0]))
            .await
            .unwrap()
            .to_string();
        let before = svc.get_by_id(&id).await.unwrap();

        let patch = UpdateUserRequest {
            name: Some("Changed".into()),
            claims: Some(vec![1, 42]),
            ..Default::default()
        };
        assert_matches!(svc.update(&id, patch).await, Err(UserError::InvalidClaim(42)));
        assert_eq!(svc.get_by_id(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let (svc, _) = service();
        let patch = UpdateUserRequest {
            name: Some("Ghost".into()),
            ..Default::default()
        };
        assert_matches!(
            svc.update(&ObjectId::new().to_string(), patch).await,
            Err(UserError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn delete_removes_and_missing_delete_is_not_found() {
        let (svc, store) = service();
        let id = svc
            .create(new_user("ada@example.com", vec![]))
            .await
            .unwrap()
            .to_string();

        svc.delete(&id).await.expect("delete");
        assert!(store.is_empty());
        assert_matches!(svc.delete(&id).await, Err(UserError::NotFound(_)));
        assert_matches!(svc.delete("bogus").await, Err(UserError::InvalidId(_)));
    }

    #[tokio::test]
    async fn claims_listing_and_ping_are_independent() {
        let (svc, store) = service();
        assert_eq!(svc.get_claims().get(&0), Some(&"admin"));
        svc.ping().await.expect("online");

        store.set_online(false);
        assert_eq!(svc.get_claims().len(), Claim::ALL.len());
        assert_matches!(svc.ping().await, Err(UserError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn atomic_proof_inserts_both_users() {
        let (svc, store) = service();
        svc.atomic_transaction_proof().await.expect("commit");
        assert_eq!(store.len(), 2);
        assert!(svc.get_by_email("Entity1").await.is_ok());
        assert!(svc.get_by_email("Entity2").await.is_ok());
    }

    #[tokio::test]
    async fn atomic_proof_failure_persists_neither_user() {
        let (svc, store) = service();
        svc.create(new_user("Entity2", vec![])).await.unwrap();

        let err = svc.atomic_transaction_proof().await.unwrap_err();
        assert_matches!(err, UserError::TransactionAborted(_));
        assert_eq!(store.len(), 1);
        assert_matches!(
            svc.get_by_email("Entity1").await,
            Err(UserError::NotFound(_))
        );
    }
}
