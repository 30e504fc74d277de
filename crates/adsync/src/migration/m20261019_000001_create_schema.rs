//! Initial migration creating the connection, ad hierarchy and kv tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_connections(manager).await?;
        self.create_ad_accounts(manager).await?;
        self.create_ad_campaigns(manager).await?;
        self.create_ad_sets(manager).await?;
        self.create_ads(manager).await?;
        self.create_kv_entries(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KvEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Ads::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdSets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdCampaigns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdAccounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Connections::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_connections(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Connections::UserId).string().not_null())
                    .col(ColumnDef::new(Connections::Label).string().not_null())
                    // Credentials
                    .col(ColumnDef::new(Connections::AccessToken).text().not_null())
                    .col(ColumnDef::new(Connections::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(Connections::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::TokenRenewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    // Sync state
                    .col(
                        ColumnDef::new(Connections::LastSynced)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(Connections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connections_user")
                    .table(Connections::Table)
                    .col(Connections::UserId)
                    .to_owned(),
            )
            .await?;

        // Renewal scans filter on expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_token_expires")
                    .table(Connections::Table)
                    .col(Connections::TokenExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_ad_accounts(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdAccounts::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(AdAccounts::ExternalId).string().not_null())
                    .col(ColumnDef::new(AdAccounts::Name).string().not_null())
                    .col(ColumnDef::new(AdAccounts::Currency).string().null())
                    .col(ColumnDef::new(AdAccounts::AccountStatus).integer().null())
                    .col(ColumnDef::new(AdAccounts::BusinessId).string().null())
                    .col(ColumnDef::new(AdAccounts::TimezoneName).string().null())
                    .col(
                        ColumnDef::new(AdAccounts::TimezoneOffsetMinutes)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AdAccounts::Permissions)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(AdAccounts::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ad_accounts_connection")
                            .from(AdAccounts::Table, AdAccounts::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Upsert conflict target
        manager
            .create_index(
                Index::create()
                    .name("idx_ad_accounts_external_id")
                    .table(AdAccounts::Table)
                    .col(AdAccounts::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_accounts_connection")
                    .table(AdAccounts::Table)
                    .col(AdAccounts::ConnectionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_ad_campaigns(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdCampaigns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdCampaigns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdCampaigns::AdAccountId).uuid().not_null())
                    .col(ColumnDef::new(AdCampaigns::ExternalId).string().not_null())
                    .col(ColumnDef::new(AdCampaigns::Name).string().not_null())
                    .col(
                        ColumnDef::new(AdCampaigns::Status)
                            .string()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(ColumnDef::new(AdCampaigns::Objective).string().null())
                    .col(
                        ColumnDef::new(AdCampaigns::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdCampaigns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdCampaigns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ad_campaigns_ad_account")
                            .from(AdCampaigns::Table, AdCampaigns::AdAccountId)
                            .to(AdAccounts::Table, AdAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_campaigns_external_id")
                    .table(AdCampaigns::Table)
                    .col(AdCampaigns::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_campaigns_ad_account")
                    .table(AdCampaigns::Table)
                    .col(AdCampaigns::AdAccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_ad_sets(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdSets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AdSets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AdSets::AdCampaignId).uuid().not_null())
                    .col(ColumnDef::new(AdSets::ExternalId).string().not_null())
                    .col(ColumnDef::new(AdSets::Name).string().not_null())
                    .col(
                        ColumnDef::new(AdSets::Status)
                            .string()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(
                        ColumnDef::new(AdSets::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdSets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdSets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ad_sets_ad_campaign")
                            .from(AdSets::Table, AdSets::AdCampaignId)
                            .to(AdCampaigns::Table, AdCampaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_sets_external_id")
                    .table(AdSets::Table)
                    .col(AdSets::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_sets_ad_campaign")
                    .table(AdSets::Table)
                    .col(AdSets::AdCampaignId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_ads(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ads::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Ads::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Ads::AdSetId).uuid().not_null())
                    .col(ColumnDef::new(Ads::ExternalId).string().not_null())
                    .col(ColumnDef::new(Ads::Name).string().not_null())
                    .col(
                        ColumnDef::new(Ads::Status)
                            .string()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(
                        ColumnDef::new(Ads::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Ads::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Ads::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ads_ad_set")
                            .from(Ads::Table, Ads::AdSetId)
                            .to(AdSets::Table, AdSets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ads_external_id")
                    .table(Ads::Table)
                    .col(Ads::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ads_ad_set")
                    .table(Ads::Table)
                    .col(Ads::AdSetId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_kv_entries(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KvEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KvEntries::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KvEntries::Value).text().not_null())
                    .col(
                        ColumnDef::new(KvEntries::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(KvEntries::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_kv_entries_expires")
                    .table(KvEntries::Table)
                    .col(KvEntries::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
    UserId,
    Label,
    AccessToken,
    RefreshToken,
    TokenExpiresAt,
    TokenRenewedAt,
    LastSynced,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AdAccounts {
    Table,
    Id,
    ConnectionId,
    ExternalId,
    Name,
    Currency,
    AccountStatus,
    BusinessId,
    TimezoneName,
    TimezoneOffsetMinutes,
    Permissions,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AdCampaigns {
    Table,
    Id,
    AdAccountId,
    ExternalId,
    Name,
    Status,
    Objective,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AdSets {
    Table,
    Id,
    AdCampaignId,
    ExternalId,
    Name,
    Status,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Ads {
    Table,
    Id,
    AdSetId,
    ExternalId,
    Name,
    Status,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum KvEntries {
    Table,
    Key,
    Value,
    ExpiresAt,
    UpdatedAt,
}
