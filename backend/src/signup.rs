//! Account creation.
//!
//! The auth provider owns user identities and the `profiles` row references
//! them by foreign key. The provider's user table lags behind its signup
//! response, so the profile insert can fail with a foreign-key violation for a
//! few seconds; those failures are retried with a linear back-off. Unique
//! violations mean another request got there first and are resolved by
//! re-reading the row.

use crate::activity::{self, NewActivity};
use crate::auth_provider::{AuthError, AuthProvider, AuthSession, AuthUser};
use crate::config::SignupConfig;
use crate::db::{FOREIGN_KEY_VIOLATION, UNIQUE_VIOLATION};
use crate::error::AppError;
use crate::models::{ObjectType, PROFILE_COLUMNS, Profile, Verb};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("valid username regex"));

const MIN_PASSWORD_LEN: usize = 6;

const USERNAME_TAKEN: &str = "Username is already taken. Please choose another.";
const USER_EXISTS: &str = "User already exists. Please try logging in instead.";
const PROFILE_NOT_READY: &str = "Profile creation failed: Please wait a moment and try logging in. If the issue persists, contact support.";

#[derive(Deserialize, Debug, Default)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
}

/// A signup request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub user: AuthUser,
    pub profile: Profile,
    pub session: Option<AuthSession>,
    #[serde(rename = "requiresEmailConfirmation")]
    pub requires_email_confirmation: bool,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

pub fn validate(req: SignupRequest) -> Result<NewAccount, AppError> {
    let (Some(email), Some(password), Some(username)) = (
        present(&req.email),
        present(&req.password),
        present(&req.username),
    ) else {
        let missing: Vec<&str> = [
            ("email", &req.email),
            ("password", &req.password),
            ("username", &req.username),
        ]
        .into_iter()
        .filter(|(_, v)| present(v).is_none())
        .map(|(name, _)| name)
        .collect();
        return Err(
            AppError::bad_request("Email, password, and username are required")
                .with_hint(format!("Missing: {}", missing.join(", "))),
        );
    };

    if !EMAIL_RE.is_match(email) {
        return Err(AppError::bad_request("Invalid email format")
            .with_hint("Email must be in format: user@domain.com"));
    }
    // Counted in UTF-16 units, the same measure browser-side checks use.
    if password.encode_utf16().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "Password must be at least 6 characters long",
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(AppError::bad_request("Invalid username format").with_hint(
            "Username must be 3-20 characters, letters, numbers, and underscores only",
        ));
    }

    Ok(NewAccount {
        email: email.to_lowercase(),
        password: password.to_string(),
        username: username.to_string(),
        display_name: present(&req.display_name).unwrap_or(username).to_string(),
        bio: present(&req.bio).map(str::to_string),
    })
}

/// Reword provider rejections into something a user can act on.
pub fn describe_provider_rejection(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("invalid") && lower.contains("email") {
        "Invalid email address. Please use a valid email format (e.g., user@domain.com). Some test domains may be rejected by the auth provider.".to_string()
    } else if lower.contains("already registered") || lower.contains("already exists") {
        "This email is already registered. Please try logging in instead.".to_string()
    } else if lower.contains("password") {
        "Password does not meet requirements. Password must be at least 6 characters.".to_string()
    } else {
        message.to_string()
    }
}

/// Why a profile insert failed.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertFailure {
    /// The auth user is not visible to the database yet.
    ForeignKey,
    Unique { constraint: Option<String>, message: String },
    Other(String),
}

impl From<&sqlx::Error> for InsertFailure {
    fn from(err: &sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = err {
            match db.code().as_deref() {
                Some(FOREIGN_KEY_VIOLATION) => return Self::ForeignKey,
                Some(UNIQUE_VIOLATION) => {
                    return Self::Unique {
                        constraint: db.constraint().map(str::to_string),
                        message: db.message().to_string(),
                    };
                }
                _ => {}
            }
        }
        Self::Other(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl From<&SignupConfig> for RetryPolicy {
    fn from(config: &SignupConfig) -> Self {
        Self {
            max_attempts: config.max_profile_attempts.max(1),
            base_backoff: config.base_backoff(),
        }
    }
}

/// Run `insert` until it succeeds, fails with something other than a
/// foreign-key violation, or runs out of attempts. Before attempt `n + 1` the
/// loop waits `base_backoff * n`, then asks `user_visible`; a `false` answer
/// adds one more `base_backoff`.
pub async fn insert_with_retry<T, I, IFut, V, VFut>(
    policy: RetryPolicy,
    mut insert: I,
    mut user_visible: V,
) -> Result<T, InsertFailure>
where
    I: FnMut() -> IFut,
    IFut: Future<Output = Result<T, sqlx::Error>>,
    V: FnMut() -> VFut,
    VFut: Future<Output = bool>,
{
    let mut attempt = 1;
    loop {
        let failure = match insert().await {
            Ok(row) => return Ok(row),
            Err(e) => InsertFailure::from(&e),
        };
        if failure != InsertFailure::ForeignKey || attempt >= policy.max_attempts {
            return Err(failure);
        }

        let wait = policy.base_backoff * attempt;
        info!(
            attempt,
            max_attempts = policy.max_attempts,
            wait_ms = wait.as_millis() as u64,
            "auth user not visible yet, retrying profile insert"
        );
        tokio::time::sleep(wait).await;
        if !user_visible().await {
            tokio::time::sleep(policy.base_backoff).await;
        }
        attempt += 1;
    }
}

/// What to do once the retry loop gave up.
#[derive(Debug, PartialEq)]
pub enum Resolution {
    /// Another writer may have created the profile; re-read it or fail with
    /// the given message.
    Refetch(&'static str),
    Reject(String),
}

pub fn resolve(failure: InsertFailure) -> Resolution {
    match failure {
        InsertFailure::Unique {
            constraint,
            message,
        } => {
            let name = constraint.as_deref().unwrap_or(message.as_str());
            if name.contains("profiles_pkey") {
                Resolution::Refetch(USER_EXISTS)
            } else if name.contains("username") {
                Resolution::Reject(USERNAME_TAKEN.to_string())
            } else {
                Resolution::Reject(USER_EXISTS.to_string())
            }
        }
        InsertFailure::ForeignKey => Resolution::Refetch(PROFILE_NOT_READY),
        InsertFailure::Other(message) => {
            Resolution::Reject(format!("Profile creation failed: {message}"))
        }
    }
}

async fn fetch_profile(pool: &PgPool, id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn username_in_use(pool: &PgPool, username: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM profiles WHERE username = $1 AND is_deleted = FALSE)",
    )
    .bind(username)
    .fetch_one(pool)
    .await
}

async fn insert_profile(
    pool: &PgPool,
    id: Uuid,
    account: &NewAccount,
) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "INSERT INTO profiles (id, username, display_name, bio, role)
         VALUES ($1, $2, $3, $4, 'user')
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(&account.username)
    .bind(&account.display_name)
    .bind(&account.bio)
    .fetch_one(pool)
    .await
}

async fn restore_profile(
    pool: &PgPool,
    id: Uuid,
    account: &NewAccount,
) -> Result<Profile, AppError> {
    sqlx::query_as::<_, Profile>(&format!(
        "UPDATE profiles
         SET username = $2, display_name = $3, bio = $4,
             is_deleted = FALSE, deleted_by = NULL, deleted_at = NULL
         WHERE id = $1
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(&account.username)
    .bind(&account.display_name)
    .bind(&account.bio)
    .fetch_one(pool)
    .await
    .map_err(|e| match InsertFailure::from(&e) {
        InsertFailure::Unique { .. } => AppError::bad_request(USERNAME_TAKEN),
        _ => AppError::bad_request(format!("Failed to restore profile: {e}")),
    })
}

/// Whether the auth user is visible through the admin API. Without an admin
/// key there is nothing to check.
async fn user_visible(auth: &dyn AuthProvider, id: Uuid) -> bool {
    if !auth.has_admin() {
        return true;
    }
    match auth.admin_get_user(id).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            warn!(user = %id, error = %e, "failed to verify auth user");
            false
        }
    }
}

async fn wait_for_commit(auth: &dyn AuthProvider, id: Uuid, wait: Duration) {
    tokio::time::sleep(wait).await;
    if !auth.has_admin() || user_visible(auth, id).await {
        return;
    }
    tokio::time::sleep(wait).await;
    if !user_visible(auth, id).await {
        error!(user = %id, "auth user not accessible even after retry");
    }
}

async fn create_or_restore_profile(
    pool: &PgPool,
    auth: &dyn AuthProvider,
    policy: RetryPolicy,
    id: Uuid,
    account: &NewAccount,
) -> Result<Profile, AppError> {
    if let Some(existing) = fetch_profile(pool, id).await? {
        if !existing.is_deleted {
            return Err(AppError::bad_request(USER_EXISTS));
        }
        info!(user = %id, "restoring soft-deleted profile");
        return restore_profile(pool, id, account).await;
    }

    let failure = match insert_with_retry(
        policy,
        || insert_profile(pool, id, account),
        || user_visible(auth, id),
    )
    .await
    {
        Ok(profile) => return Ok(profile),
        Err(failure) => failure,
    };

    warn!(user = %id, ?failure, "profile insert failed");
    match resolve(failure) {
        Resolution::Refetch(otherwise) => fetch_profile(pool, id)
            .await?
            .ok_or_else(|| AppError::bad_request(otherwise)),
        Resolution::Reject(message) => Err(AppError::bad_request(message)),
    }
}

/// Sign the new user in when the provider did not hand out a session, first
/// confirming their email through the admin API when possible.
async fn establish_session(
    auth: &dyn AuthProvider,
    id: Uuid,
    account: &NewAccount,
) -> Option<AuthSession> {
    if auth.has_admin() {
        if let Err(e) = auth.admin_confirm_email(id).await {
            error!(user = %id, error = %e, "failed to auto-confirm user");
        }
    }
    match auth.sign_in(&account.email, &account.password).await {
        Ok(session) => Some(session),
        Err(e) => {
            info!(user = %id, error = %e, "no session after signup");
            None
        }
    }
}

pub async fn register(
    pool: &PgPool,
    auth: &dyn AuthProvider,
    config: &SignupConfig,
    account: NewAccount,
) -> Result<SignupResponse, AppError> {
    if username_in_use(pool, &account.username).await? {
        return Err(AppError::bad_request(USERNAME_TAKEN));
    }

    let outcome = auth
        .sign_up(&account.email, &account.password)
        .await
        .map_err(|e| match e {
            AuthError::Rejected { message, .. } => {
                AppError::bad_request(describe_provider_rejection(&message))
            }
            other => AppError::from(other),
        })?;
    let user = outcome
        .user
        .ok_or_else(|| AppError::bad_request("Failed to create user"))?;
    info!(user = %user.id, "auth user created");

    wait_for_commit(auth, user.id, config.commit_wait()).await;

    let profile =
        create_or_restore_profile(pool, auth, RetryPolicy::from(config), user.id, &account).await?;

    activity::record(
        pool,
        NewActivity::new(user.id, Verb::Created, ObjectType::Profile, user.id),
    )
    .await;

    let session = match outcome.session {
        Some(session) => Some(session),
        None => establish_session(auth, user.id, &account).await,
    };

    Ok(SignupResponse {
        requires_email_confirmation: session.is_none(),
        user,
        profile,
        session,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_provider::SignUpOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn request(email: &str, password: &str, username: &str) -> SignupRequest {
        SignupRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            username: Some(username.to_string()),
            ..Default::default()
        }
    }

    fn message(err: AppError) -> String {
        err.to_string()
    }

    #[test]
    fn accepts_and_normalizes_a_valid_request() {
        let account = validate(request("Jane@Example.COM", "secret1", "jane_doe")).unwrap();
        assert_eq!(account.email, "jane@example.com");
        assert_eq!(account.display_name, "jane_doe");
        assert_eq!(account.bio, None);
    }

    #[test]
    fn display_name_and_bio_are_kept() {
        let mut req = request("a@b.co", "secret1", "abc");
        req.display_name = Some("Alice".to_string());
        req.bio = Some("hi".to_string());
        let account = validate(req).unwrap();
        assert_eq!(account.display_name, "Alice");
        assert_eq!(account.bio.as_deref(), Some("hi"));
    }

    #[test]
    fn reports_missing_fields_without_the_password() {
        let err = validate(SignupRequest {
            email: Some("a@b.co".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        match err {
            AppError::Hinted { error, hint } => {
                assert_eq!(error.to_string(), "Email, password, and username are required");
                assert_eq!(hint, "Missing: password, username");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_formats() {
        assert_eq!(message(validate(request("not-an-email", "secret1", "abc")).unwrap_err()), "Invalid email format");
        assert_eq!(message(validate(request("a b@c.d", "secret1", "abc")).unwrap_err()), "Invalid email format");
        assert_eq!(message(validate(request(" a@b.co", "secret1", "abc")).unwrap_err()), "Invalid email format");
        assert_eq!(
            message(validate(request("a@b.co", "12345", "abc")).unwrap_err()),
            "Password must be at least 6 characters long"
        );
        assert_eq!(message(validate(request("a@b.co", "secret1", "ab")).unwrap_err()), "Invalid username format");
        assert_eq!(
            message(validate(request("a@b.co", "secret1", "has-dash")).unwrap_err()),
            "Invalid username format"
        );
        assert_eq!(
            message(validate(request("a@b.co", "secret1", &"x".repeat(21))).unwrap_err()),
            "Invalid username format"
        );
    }

    #[test]
    fn password_length_counts_utf16_units() {
        // Each emoji is one char but two UTF-16 units.
        assert!(validate(request("a@b.co", "\u{1F600}\u{1F600}\u{1F600}", "abc")).is_ok());
        assert_eq!(
            message(validate(request("a@b.co", "\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}", "abc")).unwrap_err()),
            "Password must be at least 6 characters long"
        );
    }

    #[test]
    fn rewords_provider_rejections() {
        assert!(describe_provider_rejection("Email address \"x@example.com\" is invalid").starts_with("Invalid email address"));
        assert!(describe_provider_rejection("User already registered").starts_with("This email is already registered"));
        assert!(describe_provider_rejection("Password should be at least 6 characters").starts_with("Password does not meet"));
        assert_eq!(describe_provider_rejection("rate limited"), "rate limited");
    }

    #[test]
    fn resolves_final_failures() {
        assert_eq!(
            resolve(InsertFailure::Unique {
                constraint: Some("profiles_pkey".to_string()),
                message: String::new(),
            }),
            Resolution::Refetch(USER_EXISTS)
        );
        assert_eq!(
            resolve(InsertFailure::Unique {
                constraint: Some("profiles_username_key".to_string()),
                message: String::new(),
            }),
            Resolution::Reject(USERNAME_TAKEN.to_string())
        );
        assert_eq!(
            resolve(InsertFailure::Unique {
                constraint: None,
                message: "duplicate key value violates unique constraint".to_string(),
            }),
            Resolution::Reject(USER_EXISTS.to_string())
        );
        assert_eq!(resolve(InsertFailure::ForeignKey), Resolution::Refetch(PROFILE_NOT_READY));
        assert_eq!(
            resolve(InsertFailure::Other("boom".to_string())),
            Resolution::Reject("Profile creation failed: boom".to_string())
        );
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_waiting() {
        let start = Instant::now();
        let out: Result<u32, _> =
            insert_with_retry(policy(), || async { Ok(7) }, || async { true }).await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn non_foreign_key_errors_stop_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), _> = insert_with_retry(
            policy(),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(sqlx::Error::RowNotFound)
            },
            || async { true },
        )
        .await;
        assert!(matches!(out, Err(InsertFailure::Other(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_linearly_between_attempts() {
        // Attempts 1 and 2 fail, 3 succeeds: waits are 1s then 2s.
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let out = insert_with_retry(
            policy(),
            || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(foreign_key_error())
                } else {
                    Ok(n)
                }
            },
            || async { true },
        )
        .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let (call_count, check_count) = (AtomicU32::new(0), AtomicU32::new(0));
        let (calls, checks) = (&call_count, &check_count);
        let start = Instant::now();
        let out: Result<(), _> = insert_with_retry(
            policy(),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(foreign_key_error())
            },
            || async move {
                checks.fetch_add(1, Ordering::SeqCst);
                false
            },
        )
        .await;
        assert_eq!(out.unwrap_err(), InsertFailure::ForeignKey);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(checks.load(Ordering::SeqCst), 4);
        // 1 + 2 + 3 + 4 seconds of back-off plus one extra second per failed
        // visibility check.
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }

    #[derive(Debug)]
    struct FakeDbError(&'static str);

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("insert or update violates foreign key constraint")
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "insert or update violates foreign key constraint"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::ForeignKeyViolation
        }
    }

    fn foreign_key_error() -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError(FOREIGN_KEY_VIOLATION)))
    }

    #[test]
    fn classifies_database_errors_by_sqlstate() {
        assert_eq!(InsertFailure::from(&foreign_key_error()), InsertFailure::ForeignKey);
        assert!(matches!(
            InsertFailure::from(&sqlx::Error::Database(Box::new(FakeDbError(UNIQUE_VIOLATION)))),
            InsertFailure::Unique { constraint: None, .. }
        ));
        assert!(matches!(
            InsertFailure::from(&sqlx::Error::PoolTimedOut),
            InsertFailure::Other(_)
        ));
    }

    /// Provider double that records which calls reach it.
    struct ScriptedAuth {
        admin: bool,
        visible: bool,
        sign_in_ok: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedAuth {
        fn new(admin: bool) -> Self {
            Self {
                admin,
                visible: true,
                sign_in_ok: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn log(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthProvider for ScriptedAuth {
        async fn sign_up(&self, _email: &str, _password: &str) -> Result<SignUpOutcome, AuthError> {
            self.log("sign_up");
            Err(AuthError::AdminUnavailable)
        }

        async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthSession, AuthError> {
            self.log("sign_in");
            if !self.sign_in_ok {
                return Err(AuthError::Rejected {
                    status: 400,
                    message: "Email not confirmed".to_string(),
                });
            }
            Ok(AuthSession {
                access_token: "tok".to_string(),
                refresh_token: None,
                token_type: Some("bearer".to_string()),
                expires_in: Some(3600),
                user: None,
            })
        }

        async fn get_user(&self, _access_token: &str) -> Result<AuthUser, AuthError> {
            self.log("get_user");
            Err(AuthError::AdminUnavailable)
        }

        fn has_admin(&self) -> bool {
            self.admin
        }

        async fn admin_get_user(&self, id: Uuid) -> Result<Option<AuthUser>, AuthError> {
            self.log("admin_get_user");
            Ok(self.visible.then(|| AuthUser {
                id,
                email: None,
                created_at: None,
                email_confirmed_at: None,
            }))
        }

        async fn admin_confirm_email(&self, _id: Uuid) -> Result<(), AuthError> {
            self.log("admin_confirm_email");
            Ok(())
        }
    }

    fn account() -> NewAccount {
        validate(request("a@b.co", "secret1", "alice")).unwrap()
    }

    #[tokio::test]
    async fn confirms_email_before_signing_in_with_admin_key() {
        let auth = ScriptedAuth::new(true);
        let session = establish_session(&auth, Uuid::new_v4(), &account()).await;
        assert_eq!(session.unwrap().access_token, "tok");
        assert_eq!(auth.calls(), ["admin_confirm_email", "sign_in"]);
    }

    #[tokio::test]
    async fn signs_in_directly_without_admin_key() {
        let auth = ScriptedAuth::new(false);
        let session = establish_session(&auth, Uuid::new_v4(), &account()).await;
        assert!(session.is_some());
        assert_eq!(auth.calls(), ["sign_in"]);
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_no_session() {
        let auth = ScriptedAuth {
            sign_in_ok: false,
            ..ScriptedAuth::new(true)
        };
        let session = establish_session(&auth, Uuid::new_v4(), &account()).await;
        assert!(session.is_none());
        assert_eq!(auth.calls(), ["admin_confirm_email", "sign_in"]);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_wait_checks_visibility_once_when_user_is_visible() {
        let auth = ScriptedAuth::new(true);
        let start = Instant::now();
        wait_for_commit(&auth, Uuid::new_v4(), Duration::from_millis(500)).await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(auth.calls(), ["admin_get_user"]);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_wait_waits_again_for_invisible_user() {
        let auth = ScriptedAuth {
            visible: false,
            ..ScriptedAuth::new(true)
        };
        let start = Instant::now();
        wait_for_commit(&auth, Uuid::new_v4(), Duration::from_millis(500)).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        assert_eq!(auth.calls(), ["admin_get_user", "admin_get_user"]);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_wait_without_admin_key_only_sleeps() {
        let auth = ScriptedAuth::new(false);
        let start = Instant::now();
        wait_for_commit(&auth, Uuid::new_v4(), Duration::from_millis(500)).await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(auth.calls().is_empty());
    }
}
