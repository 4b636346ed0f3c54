use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device_grants")]
pub struct Model {
    /// Canonical hardware address, e.g. `aa:bb:cc:dd:ee:ff`
    #[sea_orm(primary_key, auto_increment = false)]
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

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
