use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create logins table
        // The unique username also covers the shared default login: a racing
        // second insert of the well-known username is rejected here.
        manager
            .create_table(
                Table::create()
                    .table(Logins::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Logins::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Logins::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Logins::Password))
                    .col(
                        ColumnDef::new(Logins::Active)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(big_integer(Logins::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create device_grants table, one row per hardware address
        manager
            .create_table(
                Table::create()
                    .table(DeviceGrants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceGrants::Mac)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(DeviceGrants::Name))
                    .col(string(DeviceGrants::Email))
                    .col(string(DeviceGrants::Phone))
                    .col(string(DeviceGrants::Ip))
                    .col(integer_null(DeviceGrants::LoginId))
                    .col(big_integer(DeviceGrants::CreatedAt))
                    .col(big_integer(DeviceGrants::LastActiveAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_device_grants_last_active_at")
                    .table(DeviceGrants::Table)
                    .col(DeviceGrants::LastActiveAt)
                    .to_owned(),
            )
            .await?;

        // Create configurations table (single row, id = 1)
        manager
            .create_table(
                Table::create()
                    .table(Configurations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Configurations::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Configurations::ActiveWindowMinutes)
                            .big_integer()
                            .not_null()
                            .default(15),
                    )
                    .col(big_integer(Configurations::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Configurations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeviceGrants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Logins::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Logins {
    Table,
    Id,
    Username,
    Password,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DeviceGrants {
    Table,
    Mac,
    Name,
    Email,
    Phone,
    Ip,
    LoginId,
    CreatedAt,
    LastActiveAt,
}

#[derive(DeriveIden)]
enum Configurations {
    Table,
    Id,
    ActiveWindowMinutes,
    UpdatedAt,
}
