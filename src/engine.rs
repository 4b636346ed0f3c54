//! Access authorization: decides whether a device already holds an active
//! grant and, if not, binds it to a freshly claimed credential.
//!
//! All three issuance policies share one skeleton:
//!
//! 1. resolve the active window,
//! 2. short-circuit if the device has an active grant,
//! 3. let the policy select a candidate credential (read-only),
//! 4. in one transaction, claim the candidate and upsert the device grant,
//!    rolling back if the device became active in the meantime.
//!
//! There is no in-process locking. Uniqueness of grants and single use of
//! vouchers rest on the store: the grant upsert is keyed by hardware address
//! and only overwrites a grant that has left the active window, and the
//! voucher claim is a conditional update that only succeeds while the row is
//! still unused.

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::Serialize;

use crate::errors::{GateError, IssueError};
use crate::settings::{IssuanceMode, Settings};
use crate::storage::{self, Login, NewGrant, Voucher};
use crate::validate::{self, AccessRequest, RawAccessRequest};
use crate::window::ActiveWindow;

/// How credentials are handed out. Chosen per deployment, never per request.
#[derive(Clone, PartialEq, Eq)]
pub enum IssuancePolicy {
    /// The guest names a pre-provisioned, active login.
    NamedLogin,
    /// Every guest receives the shared login, created on first use.
    DefaultLogin { username: String, password: String },
    /// Every guest consumes one single-use voucher from the pool.
    VoucherPool,
}

impl std::fmt::Debug for IssuancePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssuancePolicy::NamedLogin => f.write_str("NamedLogin"),
            IssuancePolicy::DefaultLogin { username, .. } => f
                .debug_struct("DefaultLogin")
                .field("username", username)
                .finish_non_exhaustive(),
            IssuancePolicy::VoucherPool => f.write_str("VoucherPool"),
        }
    }
}

impl IssuancePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.portal.mode {
            IssuanceMode::NamedLogin => IssuancePolicy::NamedLogin,
            IssuanceMode::DefaultLogin => IssuancePolicy::DefaultLogin {
                username: settings.portal.default_username.clone(),
                password: settings.portal.default_password.clone(),
            },
            IssuanceMode::Voucher => IssuancePolicy::VoucherPool,
        }
    }

    pub fn mode(&self) -> IssuanceMode {
        match self {
            IssuancePolicy::NamedLogin => IssuanceMode::NamedLogin,
            IssuancePolicy::DefaultLogin { .. } => IssuanceMode::DefaultLogin,
            IssuancePolicy::VoucherPool => IssuanceMode::Voucher,
        }
    }

    pub fn requires_username(&self) -> bool {
        matches!(self, IssuancePolicy::NamedLogin)
    }

    /// Picks the credential this request would receive. Reads only; business
    /// rule refusals surface here, before any write.
    async fn select(
        &self,
        db: &DatabaseConnection,
        request: &AccessRequest,
    ) -> Result<Candidate, IssueError> {
        match self {
            IssuancePolicy::NamedLogin => {
                let username = request.username.as_deref().unwrap_or_default();
                storage::find_active_login(db, username)
                    .await?
                    .map(Candidate::Login)
                    .ok_or(IssueError::LoginNotFound)
            }
            IssuancePolicy::DefaultLogin { username, password } => {
                storage::get_or_create_default_login(db, username, password)
                    .await?
                    .map(Candidate::Login)
                    .ok_or(IssueError::LoginNotFound)
            }
            IssuancePolicy::VoucherPool => storage::next_unused_voucher(db)
                .await?
                .map(Candidate::Voucher)
                .ok_or(IssueError::NoVouchersAvailable),
        }
    }
}

/// A credential selected for a request but not yet bound to the device.
enum Candidate {
    Login(Login),
    Voucher(Voucher),
}

impl Candidate {
    /// Claims the candidate inside the issuance transaction. Logins are
    /// shared and always claimable; a voucher claim fails if another request
    /// consumed it after selection.
    async fn claim<C: ConnectionTrait>(
        &self,
        conn: &C,
        mac: &str,
        now: i64,
    ) -> Result<bool, GateError> {
        match self {
            Candidate::Login(_) => Ok(true),
            Candidate::Voucher(voucher) => storage::claim_voucher(conn, voucher.id, mac, now).await,
        }
    }

    fn login_id(&self) -> Option<i32> {
        match self {
            Candidate::Login(login) => Some(login.id),
            Candidate::Voucher(_) => None,
        }
    }

    fn voucher_id(&self) -> Option<i32> {
        match self {
            Candidate::Login(_) => None,
            Candidate::Voucher(voucher) => Some(voucher.id),
        }
    }

    fn into_credential(self) -> Credential {
        match self {
            Candidate::Login(login) => Credential {
                username: login.username,
                password: login.password,
                voucher: None,
            },
            // The login portal expects a username/password pair; a voucher
            // code fills both.
            Candidate::Voucher(voucher) => Credential {
                username: voucher.code.clone(),
                password: voucher.code.clone(),
                voucher: Some(voucher.code),
            },
        }
    }
}

/// Secret handed to the guest on first issuance only.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub voucher: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuance {
    /// The device holds a grant inside the active window. The previously
    /// issued secret is deliberately not returned.
    AlreadyActive,
    Issued(Credential),
}

/// Engine inputs fixed at process start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: IssuancePolicy,
    pub active_window_minutes: Option<i64>,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            policy: IssuancePolicy::from_settings(settings),
            active_window_minutes: settings.portal.active_window_minutes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    db: DatabaseConnection,
    policy: IssuancePolicy,
    window: ActiveWindow,
}

impl Engine {
    pub fn new(db: DatabaseConnection, config: EngineConfig) -> Self {
        Self {
            db,
            policy: config.policy,
            window: ActiveWindow::new(config.active_window_minutes),
        }
    }

    pub fn policy(&self) -> &IssuancePolicy {
        &self.policy
    }

    pub fn window(&self) -> &ActiveWindow {
        &self.window
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Validates a submitted form and runs issuance for it.
    pub async fn issue(&self, raw: &RawAccessRequest, ip: &str) -> Result<Issuance, IssueError> {
        let request = validate::normalize(raw, self.policy.requires_username())?;
        self.issue_validated(&request, ip).await
    }

    pub async fn issue_validated(
        &self,
        request: &AccessRequest,
        ip: &str,
    ) -> Result<Issuance, IssueError> {
        let mac = request.mac.as_str();
        let window = self.window.resolve(&self.db).await;
        let now = Utc::now().timestamp();
        let since = now - i64::from(window) * 60;

        if storage::find_active_grant(&self.db, mac, since)
            .await?
            .is_some()
        {
            tracing::info!(mac, window_minutes = window, "Device already active");
            return Ok(Issuance::AlreadyActive);
        }

        // Only a lost voucher race loops, and every lost race means another
        // request consumed a voucher, so the pool bounds the retries.
        loop {
            let candidate = match self.policy.select(&self.db, request).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(mac, mode = ?self.policy.mode(), error = %e, "Issuance refused");
                    return Err(e);
                }
            };

            let txn = self.db.begin().await?;
            if !candidate.claim(&txn, mac, now).await? {
                txn.rollback().await?;
                tracing::debug!(mac, "Voucher claimed concurrently, retrying");
                continue;
            }

            let grant = NewGrant {
                mac: mac.to_string(),
                name: request.name.clone(),
                email: request.email.clone(),
                phone: request.phone.clone(),
                ip: ip.to_string(),
                login_id: candidate.login_id(),
                voucher_id: candidate.voucher_id(),
                issued_at: now,
            };
            // A concurrent request for this device may have committed a grant
            // since the check above; the claim is then undone.
            if !storage::upsert_grant(&txn, &grant, since).await? {
                txn.rollback().await?;
                tracing::info!(mac, window_minutes = window, "Device activated concurrently");
                return Ok(Issuance::AlreadyActive);
            }
            txn.commit().await?;

            tracing::info!(mac, ip, mode = ?self.policy.mode(), "Access granted");
            return Ok(Issuance::Issued(candidate.into_credential()));
        }
    }
}
