//! Provider queries: scheduling reads, the pass lock and sync health writes.

use dirsync_core::{AdapterType, FailureOutcome, Provider, SyncFailure};
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{PostgresError, Result};

const PROVIDER_COLUMNS: &str = "id, account_id, name, adapter, adapter_config, disabled_at, \
     sync_disabled_at, last_synced_at, last_sync_error, last_sync_error_reason, last_syncs_failed, \
     sync_error_emailed_at";

/// Predicate shared by the scheduler listing and the pass lock.
const SYNC_ENABLED: &str =
    "deleted_at IS NULL AND disabled_at IS NULL AND sync_disabled_at IS NULL";

type ProviderRow = (
    Uuid,
    Uuid,
    String,
    String,
    Value,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    Option<String>,
    Option<String>,
    i32,
    Option<OffsetDateTime>,
);

fn from_row(row: ProviderRow) -> Result<Provider> {
    let (
        id,
        account_id,
        name,
        adapter,
        adapter_config,
        disabled_at,
        sync_disabled_at,
        last_synced_at,
        last_sync_error,
        last_sync_error_reason,
        last_syncs_failed,
        sync_error_emailed_at,
    ) = row;

    let adapter = adapter
        .parse::<AdapterType>()
        .map_err(|e| PostgresError::decode(format!("provider {id}: {e}")))?;

    Ok(Provider {
        id,
        account_id,
        name,
        adapter,
        adapter_config,
        disabled_at,
        sync_disabled_at,
        last_synced_at,
        last_sync_error,
        last_sync_error_reason,
        last_syncs_failed: u32::try_from(last_syncs_failed).unwrap_or(0),
        sync_error_emailed_at,
    })
}

/// Lists providers of `adapter` the scheduler should pick up, oldest first.
pub async fn list_sync_enabled(pool: &PgPool, adapter: AdapterType) -> Result<Vec<Provider>> {
    let sql = format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers \
         WHERE adapter = $1 AND {SYNC_ENABLED} \
         ORDER BY inserted_at, id"
    );
    let rows: Vec<ProviderRow> = query_as(&sql)
        .bind(adapter.as_str())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(from_row).collect()
}

/// Locks the provider row for the rest of the transaction.
///
/// `NO KEY UPDATE` still lets foreign keys from identities and groups
/// reference the row. `SKIP LOCKED` makes a row held by another node look
/// absent instead of blocking.
pub async fn lock_for_sync(conn: &mut PgConnection, provider_id: Uuid) -> Result<Option<Provider>> {
    let sql = format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers \
         WHERE id = $1 AND {SYNC_ENABLED} \
         FOR NO KEY UPDATE SKIP LOCKED"
    );
    let row: Option<ProviderRow> = query_as(&sql)
        .bind(provider_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(from_row).transpose()
}

/// Inserts the provider unless a row with its id already exists.
///
/// Returns `true` if a row was inserted.
pub async fn insert_if_absent(pool: &PgPool, provider: &Provider) -> Result<bool> {
    let result = query(
        r#"
        INSERT INTO providers (id, account_id, name, adapter, adapter_config, disabled_at,
                               sync_disabled_at, last_synced_at, last_sync_error,
                               last_sync_error_reason, last_syncs_failed,
                               sync_error_emailed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(provider.id)
    .bind(provider.account_id)
    .bind(&provider.name)
    .bind(provider.adapter.as_str())
    .bind(&provider.adapter_config)
    .bind(provider.disabled_at)
    .bind(provider.sync_disabled_at)
    .bind(provider.last_synced_at)
    .bind(&provider.last_sync_error)
    .bind(&provider.last_sync_error_reason)
    .bind(i32::try_from(provider.last_syncs_failed).unwrap_or(i32::MAX))
    .bind(provider.sync_error_emailed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Stamps a successful pass and clears the failure streak.
pub async fn record_success(
    conn: &mut PgConnection,
    provider_id: Uuid,
    now: OffsetDateTime,
) -> Result<()> {
    query(
        r#"
        UPDATE providers
        SET last_synced_at = $2,
            last_sync_error = NULL,
            last_sync_error_reason = NULL,
            last_syncs_failed = 0,
            sync_error_emailed_at = NULL,
            updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(provider_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Stores a failed pass: reason and message, streak length, and the email and disable
/// stamps the failure policy decided on.
pub async fn record_failure(
    conn: &mut PgConnection,
    provider_id: Uuid,
    failure: &SyncFailure,
    outcome: &FailureOutcome,
    now: OffsetDateTime,
) -> Result<()> {
    query(
        r#"
        UPDATE providers
        SET last_sync_error = $2,
            last_sync_error_reason = $3,
            last_syncs_failed = $4,
            sync_error_emailed_at = CASE WHEN $5 THEN $7 ELSE sync_error_emailed_at END,
            sync_disabled_at = CASE WHEN $6 THEN $7 ELSE sync_disabled_at END,
            updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(provider_id)
    .bind(&failure.message)
    .bind(&failure.reason)
    .bind(i32::try_from(outcome.failures_in_streak).unwrap_or(i32::MAX))
    .bind(outcome.notify)
    .bind(outcome.disable)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
