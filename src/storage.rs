use crate::entities;
use crate::errors::GateError;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

/// Primary key of the single configuration row.
pub const CONFIGURATION_ID: i32 = 1;

/// Voucher rows inserted per statement during bulk import.
const IMPORT_CHUNK: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Login {
    pub id: i32,
    pub username: String,
    pub password: String,
    pub active: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: i32,
    pub code: String,
    pub used: i64,
    pub mac: Option<String>,
    pub used_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGrant {
    pub mac: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub ip: String,
    pub login_id: Option<i32>,
    pub voucher_id: Option<i32>,
    pub created_at: i64,
    pub last_active_at: i64,
}

/// Fields written on every issuance; `created_at` is only set on first insert.
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub mac: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub ip: String,
    pub login_id: Option<i32>,
    pub voucher_id: Option<i32>,
    pub issued_at: i64,
}

impl From<entities::login::Model> for Login {
    fn from(model: entities::login::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            password: model.password,
            active: model.active,
            created_at: model.created_at,
        }
    }
}

impl From<entities::voucher::Model> for Voucher {
    fn from(model: entities::voucher::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            used: model.used,
            mac: model.mac,
            used_at: model.used_at,
        }
    }
}

impl From<entities::device_grant::Model> for DeviceGrant {
    fn from(model: entities::device_grant::Model) -> Self {
        Self {
            mac: model.mac,
            name: model.name,
            email: model.email,
            phone: model.phone,
            ip: model.ip,
            login_id: model.login_id,
            voucher_id: model.voucher_id,
            created_at: model.created_at,
            last_active_at: model.last_active_at,
        }
    }
}

/// Connects and brings the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, GateError> {
    let mut opts = ConnectOptions::new(cfg.url.clone());
    opts.sqlx_logging(false);
    let db = Database::connect(opts).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

// Credential catalog: logins

/// Provisions a named login. Operator-side only; issuance never creates
/// named logins.
pub async fn create_login(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    active: bool,
) -> Result<Login, GateError> {
    use entities::login::{ActiveModel, Entity};

    let created_at = Utc::now().timestamp();
    let login = ActiveModel {
        id: Default::default(),
        username: Set(username.to_string()),
        password: Set(password.to_string()),
        active: Set(if active { 1 } else { 0 }),
        created_at: Set(created_at),
    };

    let result = Entity::insert(login).exec(db).await?;

    Ok(Login {
        id: result.last_insert_id,
        username: username.to_string(),
        password: password.to_string(),
        active: if active { 1 } else { 0 },
        created_at,
    })
}

pub async fn get_login_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<Login>, GateError> {
    use entities::login::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?
        .map(Login::from))
}

/// Looks up a named login that is still enabled.
pub async fn find_active_login(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<Login>, GateError> {
    use entities::login::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Username.eq(username))
        .filter(Column::Active.eq(1))
        .one(db)
        .await?
        .map(Login::from))
}

/// Returns the shared default login, creating it on first use.
///
/// Creation is an insert that yields on a username conflict, followed by a
/// fetch, so concurrent first callers converge on the same row. Returns
/// `None` when the operator has deactivated the row.
pub async fn get_or_create_default_login(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<Login>, GateError> {
    use entities::login::{ActiveModel, Column, Entity};

    if let Some(existing) = get_login_by_username(db, username).await? {
        return Ok((existing.active == 1).then_some(existing));
    }

    let login = ActiveModel {
        id: Default::default(),
        username: Set(username.to_string()),
        password: Set(password.to_string()),
        active: Set(1),
        created_at: Set(Utc::now().timestamp()),
    };

    let inserted = Entity::insert(login)
        .on_conflict(OnConflict::column(Column::Username).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;
    if inserted > 0 {
        tracing::info!(username, "Created default login");
    }

    let login = get_login_by_username(db, username)
        .await?
        .ok_or_else(|| GateError::Other(format!("Default login `{username}` vanished after insert")))?;
    Ok((login.active == 1).then_some(login))
}

// Credential catalog: voucher pool

/// Imports codes as unused vouchers. Codes already present are skipped.
/// Returns how many rows were inserted.
pub async fn import_vouchers(
    db: &DatabaseConnection,
    codes: &[String],
) -> Result<u64, GateError> {
    use entities::voucher::{ActiveModel, Column, Entity};

    let mut inserted = 0;
    for chunk in codes.chunks(IMPORT_CHUNK) {
        let rows = chunk.iter().map(|code| ActiveModel {
            id: Default::default(),
            code: Set(code.clone()),
            used: Set(0),
            mac: Set(None),
            used_at: Set(None),
        });
        inserted += Entity::insert_many(rows)
            .on_conflict(OnConflict::column(Column::Code).do_nothing().to_owned())
            .exec_without_returning(db)
            .await?;
    }

    Ok(inserted)
}

pub async fn count_available_vouchers(db: &DatabaseConnection) -> Result<u64, GateError> {
    use entities::voucher::{Column, Entity};

    Ok(Entity::find().filter(Column::Used.eq(0)).count(db).await?)
}

pub async fn get_voucher(
    db: &DatabaseConnection,
    code: &str,
) -> Result<Option<Voucher>, GateError> {
    use entities::voucher::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Code.eq(code))
        .one(db)
        .await?
        .map(Voucher::from))
}

/// First unused voucher by insertion order. Only a candidate: it may be
/// claimed by someone else before [`claim_voucher`] runs.
pub async fn next_unused_voucher(db: &DatabaseConnection) -> Result<Option<Voucher>, GateError> {
    use entities::voucher::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Used.eq(0))
        .order_by_asc(Column::Id)
        .one(db)
        .await?
        .map(Voucher::from))
}

/// Marks a voucher used by `mac`, but only if it is still unused.
///
/// Returns `false` when another request got there first. Run it as the first
/// statement of the issuance transaction so the write lock is taken before
/// anything is read.
pub async fn claim_voucher<C: ConnectionTrait>(
    conn: &C,
    voucher_id: i32,
    mac: &str,
    used_at: i64,
) -> Result<bool, GateError> {
    use entities::voucher::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(Column::Used, Expr::value(1))
        .col_expr(Column::Mac, Expr::value(mac))
        .col_expr(Column::UsedAt, Expr::value(used_at))
        .filter(Column::Id.eq(voucher_id))
        .filter(Column::Used.eq(0))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

// Device activity store

pub async fn get_grant(db: &DatabaseConnection, mac: &str) -> Result<Option<DeviceGrant>, GateError> {
    use entities::device_grant::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Mac.eq(mac))
        .one(db)
        .await?
        .map(DeviceGrant::from))
}

/// Grant for `mac` whose last activity is at or after `since`.
pub async fn find_active_grant(
    db: &DatabaseConnection,
    mac: &str,
    since: i64,
) -> Result<Option<DeviceGrant>, GateError> {
    use entities::device_grant::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Mac.eq(mac))
        .filter(Column::LastActiveAt.gte(since))
        .one(db)
        .await?
        .map(DeviceGrant::from))
}

/// Inserts the grant, or overwrites the row for the same address if that
/// row went idle before `active_since`. `created_at` keeps its first value.
///
/// Returns `false` when the existing grant is still active and nothing was
/// written. The check and the write are one statement, so concurrent
/// requests for one device cannot both succeed.
pub async fn upsert_grant<C: ConnectionTrait>(
    conn: &C,
    grant: &NewGrant,
    active_since: i64,
) -> Result<bool, GateError> {
    use entities::device_grant::{ActiveModel, Column, Entity};

    let row = ActiveModel {
        mac: Set(grant.mac.clone()),
        name: Set(grant.name.clone()),
        email: Set(grant.email.clone()),
        phone: Set(grant.phone.clone()),
        ip: Set(grant.ip.clone()),
        login_id: Set(grant.login_id),
        voucher_id: Set(grant.voucher_id),
        created_at: Set(grant.issued_at),
        last_active_at: Set(grant.issued_at),
    };

    let written = Entity::insert(row)
        .on_conflict(
            OnConflict::column(Column::Mac)
                .update_columns([
                    Column::Name,
                    Column::Email,
                    Column::Phone,
                    Column::Ip,
                    Column::LoginId,
                    Column::VoucherId,
                    Column::LastActiveAt,
                ])
                .action_and_where(Expr::col((Entity, Column::LastActiveAt)).lt(active_since))
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    Ok(written == 1)
}

// Configuration row

pub async fn get_active_window_minutes(db: &DatabaseConnection) -> Result<Option<i64>, GateError> {
    use entities::configuration::Entity;

    Ok(Entity::find_by_id(CONFIGURATION_ID)
        .one(db)
        .await?
        .map(|row| row.active_window_minutes))
}

/// Creates the configuration row if missing; an existing row is left alone.
pub async fn ensure_configuration(db: &DatabaseConnection, minutes: i64) -> Result<(), GateError> {
    use entities::configuration::{ActiveModel, Column, Entity};

    let row = ActiveModel {
        id: Set(CONFIGURATION_ID),
        active_window_minutes: Set(minutes),
        updated_at: Set(Utc::now().timestamp()),
    };

    Entity::insert(row)
        .on_conflict(OnConflict::column(Column::Id).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    Ok(())
}

pub async fn set_active_window_minutes(
    db: &DatabaseConnection,
    minutes: i64,
) -> Result<(), GateError> {
    use entities::configuration::{ActiveModel, Column, Entity};

    let row = ActiveModel {
        id: Set(CONFIGURATION_ID),
        active_window_minutes: Set(minutes),
        updated_at: Set(Utc::now().timestamp()),
    };

    Entity::insert(row)
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([Column::ActiveWindowMinutes, Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(())
}
