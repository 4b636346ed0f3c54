use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create vouchers table
        manager
            .create_table(
                Table::create()
                    .table(Vouchers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vouchers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Vouchers::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Vouchers::Used)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(string_null(Vouchers::Mac))
                    .col(big_integer_null(Vouchers::UsedAt))
                    .to_owned(),
            )
            .await?;

        // Claims scan for the first unused voucher
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_vouchers_used")
                    .table(Vouchers::Table)
                    .col(Vouchers::Used)
                    .to_owned(),
            )
            .await?;

        // Grants issued from the pool reference the claimed voucher
        manager
            .alter_table(
                Table::alter()
                    .table(DeviceGrants::Table)
                    .add_column(integer_null(DeviceGrants::VoucherId))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(DeviceGrants::Table)
                    .drop_column(DeviceGrants::VoucherId)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Vouchers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Vouchers {
    Table,
    Id,
    Code,
    Used,
    Mac,
    UsedAt,
}

#[derive(DeriveIden)]
enum DeviceGrants {
    Table,
    VoucherId,
}
