//! Per-type sync stages.
//!
//! Each level of the hierarchy implements [`EntitySyncStage`]: where its
//! records live upstream, which fields to request, how to normalize them and
//! how to upsert them. [`run_stage`] drives any of them the same way:
//!
//! ```text
//! parents (repository) → walk edge per parent → normalize page → upsert page
//! ```
//!
//! A failing parent is recorded and skipped; rate limits, auth failures and
//! a failed root walk abort the stage instead.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, sea_query::OnConflict,
};
use serde::de::DeserializeOwned;

use crate::entity::connection::Model as Connection;
use crate::entity::sync_type::SyncType;
use crate::entity::{ad, ad_account, ad_campaign, ad_set};
use crate::graph::types::{RawAd, RawAdAccount, RawAdSet, RawCampaign, fields};
use crate::graph::{GraphClient, short_error_message};
use crate::repository::{self, ParentRef};

use super::normalize;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{ParentFailure, Result, StageReport, SyncError};

/// External id standing in for the authenticated user at the root.
pub const ROOT_EXTERNAL_ID: &str = "me";

/// One level of the ad hierarchy as a sync stage.
pub trait EntitySyncStage: Send + Sync + 'static {
    const SYNC_TYPE: SyncType;

    /// Comma-separated field selection for the edge.
    const FIELDS: &'static str;

    type Raw: DeserializeOwned + Send;
    type Active: ActiveModelTrait + Clone + Send + Sync;

    /// Edge path listing the children of `parent`.
    fn edge(parent: &ParentRef) -> String;

    fn normalize(raw: Self::Raw, parent: &ParentRef, now: DateTime<Utc>) -> Self::Active;

    fn on_conflict() -> OnConflict;
}

/// Ad accounts visible to the connection's user.
pub struct AccountStage;

/// Campaigns under each stored ad account.
pub struct CampaignStage;

/// Ad sets under each stored campaign.
pub struct AdSetStage;

/// Ads under each stored ad set.
pub struct AdStage;

impl EntitySyncStage for AccountStage {
    const SYNC_TYPE: SyncType = SyncType::AdAccounts;
    const FIELDS: &'static str = fields::AD_ACCOUNT;
    type Raw = RawAdAccount;
    type Active = ad_account::ActiveModel;

    fn edge(parent: &ParentRef) -> String {
        format!("{}/adaccounts", parent.external_id)
    }

    fn normalize(raw: RawAdAccount, parent: &ParentRef, now: DateTime<Utc>) -> Self::Active {
        normalize::to_ad_account(raw, parent.id, now)
    }

    fn on_conflict() -> OnConflict {
        repository::ad_account_on_conflict()
    }
}

impl EntitySyncStage for CampaignStage {
    const SYNC_TYPE: SyncType = SyncType::Campaigns;
    const FIELDS: &'static str = fields::CAMPAIGN;
    type Raw = RawCampaign;
    type Active = ad_campaign::ActiveModel;

    fn edge(parent: &ParentRef) -> String {
        format!("{}/campaigns", parent.external_id)
    }

    fn normalize(raw: RawCampaign, parent: &ParentRef, now: DateTime<Utc>) -> Self::Active {
        normalize::to_ad_campaign(raw, parent.id, now)
    }

    fn on_conflict() -> OnConflict {
        repository::ad_campaign_on_conflict()
    }
}

impl EntitySyncStage for AdSetStage {
    const SYNC_TYPE: SyncType = SyncType::AdSets;
    const FIELDS: &'static str = fields::AD_SET;
    type Raw = RawAdSet;
    type Active = ad_set::ActiveModel;

    fn edge(parent: &ParentRef) -> String {
        format!("{}/adsets", parent.external_id)
    }

    fn normalize(raw: RawAdSet, parent: &ParentRef, now: DateTime<Utc>) -> Self::Active {
        normalize::to_ad_set(raw, parent.id, now)
    }

    fn on_conflict() -> OnConflict {
        repository::ad_set_on_conflict()
    }
}

impl EntitySyncStage for AdStage {
    const SYNC_TYPE: SyncType = SyncType::Ads;
    const FIELDS: &'static str = fields::AD;
    type Raw = RawAd;
    type Active = ad::ActiveModel;

    fn edge(parent: &ParentRef) -> String {
        format!("{}/ads", parent.external_id)
    }

    fn normalize(raw: RawAd, parent: &ParentRef, now: DateTime<Utc>) -> Self::Active {
        normalize::to_ad(raw, parent.id, now)
    }

    fn on_conflict() -> OnConflict {
        repository::ad_on_conflict()
    }
}

/// Everything a stage needs for one connection.
pub struct StageContext<'a> {
    pub db: &'a DatabaseConnection,
    pub client: &'a GraphClient,
    pub connection: &'a Connection,
    pub on_progress: Option<&'a ProgressCallback>,
}

/// Parent stand-in for the accounts walk.
pub fn root_parent(connection: &Connection) -> ParentRef {
    ParentRef {
        id: connection.id,
        external_id: ROOT_EXTERNAL_ID.to_string(),
        name: connection.label.clone(),
    }
}

/// Run the stage for `sync_type`.
pub async fn run_stage(sync_type: SyncType, ctx: &StageContext<'_>) -> Result<StageReport> {
    match sync_type {
        SyncType::AdAccounts => run::<AccountStage>(ctx).await,
        SyncType::Campaigns => run::<CampaignStage>(ctx).await,
        SyncType::AdSets => run::<AdSetStage>(ctx).await,
        SyncType::Ads => run::<AdStage>(ctx).await,
    }
}

/// Drive one stage to completion and advance `last_synced`.
pub async fn run<S>(ctx: &StageContext<'_>) -> Result<StageReport>
where
    S: EntitySyncStage,
    <<S::Active as ActiveModelTrait>::Entity as EntityTrait>::Model: IntoActiveModel<S::Active>,
{
    let connection_id = ctx.connection.id;
    let sync_type = S::SYNC_TYPE;
    let mut report = StageReport::new(sync_type);

    let is_root = sync_type.parent().is_none();
    let parents = if is_root {
        vec![root_parent(ctx.connection)]
    } else {
        repository::parent_refs(ctx.db, connection_id, sync_type)
            .await
            .map_err(|source| SyncError::ParentLoad { sync_type, source })?
    };

    tracing::info!(
        connection_id = %connection_id,
        sync_type = %sync_type,
        parents = parents.len(),
        "Starting sync stage"
    );
    emit(
        ctx.on_progress,
        SyncProgress::StageStarted {
            connection_id,
            sync_type,
            parents: parents.len(),
        },
    );

    if parents.is_empty() {
        tracing::info!(
            connection_id = %connection_id,
            sync_type = %sync_type,
            "No parents stored, nothing to fetch"
        );
    }

    for parent in &parents {
        report.parents += 1;
        let fetched_before = report.fetched;

        match sync_parent::<S>(ctx, parent, &mut report).await {
            Ok(()) if report.fetched == fetched_before => {
                report.parents_skipped += 1;
                tracing::info!(
                    sync_type = %sync_type,
                    parent_id = %parent.id,
                    external_id = %parent.external_id,
                    "No records upstream, skipping"
                );
                emit(
                    ctx.on_progress,
                    SyncProgress::ParentSkipped {
                        sync_type,
                        external_id: parent.external_id.clone(),
                    },
                );
            }
            Ok(()) => {}
            Err(e) if is_root || is_stage_fatal(&e) => return Err(e),
            Err(e) => {
                let error = short_error_message(&e);
                tracing::warn!(
                    sync_type = %sync_type,
                    parent_id = %parent.id,
                    external_id = %parent.external_id,
                    error = %error,
                    "Failed to sync children of parent, continuing"
                );
                emit(
                    ctx.on_progress,
                    SyncProgress::ParentFailed {
                        sync_type,
                        external_id: parent.external_id.clone(),
                        error: error.clone(),
                    },
                );
                report.failures.push(ParentFailure {
                    parent_id: parent.id,
                    external_id: parent.external_id.clone(),
                    error,
                });
            }
        }
    }

    report.completed_at =
        repository::connection::advance_last_synced(ctx.db, connection_id, sync_type, Utc::now())
            .await
            .map_err(|source| SyncError::Completion { sync_type, source })?;

    tracing::info!(
        connection_id = %connection_id,
        sync_type = %sync_type,
        pages = report.pages,
        fetched = report.fetched,
        upserted = report.upserted,
        failures = report.failures.len(),
        "Sync stage complete"
    );
    emit(
        ctx.on_progress,
        SyncProgress::StageComplete {
            connection_id,
            sync_type,
            upserted: report.upserted,
            failures: report.failures.len(),
        },
    );

    Ok(report)
}

/// Walk and persist the children of one parent, page by page.
async fn sync_parent<S>(
    ctx: &StageContext<'_>,
    parent: &ParentRef,
    report: &mut StageReport,
) -> Result<()>
where
    S: EntitySyncStage,
    <<S::Active as ActiveModelTrait>::Entity as EntityTrait>::Model: IntoActiveModel<S::Active>,
{
    emit(
        ctx.on_progress,
        SyncProgress::FetchingParent {
            sync_type: S::SYNC_TYPE,
            external_id: parent.external_id.clone(),
        },
    );

    let url = ctx.client.edge_url(&S::edge(parent), S::FIELDS)?;
    let walker = ctx.client.walker();
    let mut cursor = walker.pages::<S::Raw>(url);
    let mut page = 0;

    while let Some(records) = cursor.next_page().await? {
        page += 1;
        report.pages += 1;
        report.fetched += records.len();
        emit(
            ctx.on_progress,
            SyncProgress::FetchedPage {
                sync_type: S::SYNC_TYPE,
                parent: parent.external_id.clone(),
                page,
                count: records.len(),
            },
        );

        if records.is_empty() {
            continue;
        }

        let now = Utc::now();
        let models: Vec<S::Active> = records
            .into_iter()
            .map(|raw| S::normalize(raw, parent, now))
            .collect();
        let count = repository::upsert_with_retry(ctx.db, models, S::on_conflict()).await?;

        report.upserted += count;
        emit(
            ctx.on_progress,
            SyncProgress::Persisted {
                sync_type: S::SYNC_TYPE,
                count,
            },
        );
    }

    Ok(())
}

/// Errors that make every remaining parent pointless to try.
fn is_stage_fatal(err: &SyncError) -> bool {
    err.is_retryable() || err.is_auth_error()
}
