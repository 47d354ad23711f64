//! Writes that carry out a [`SyncPlan`].
//!
//! Steps run in a fixed order so that memberships are written last, against
//! identities and groups that already reflect the plan:
//!
//! 1. insert identities and their actors
//! 2. refresh and update identities, propagating to actors
//! 3. soft-delete identities, then actors left without a live identity
//! 4. upsert groups
//! 5. delete groups and their memberships
//! 6. delete stale memberships, insert new ones
//!
//! The caller runs all of it inside one savepoint.

use dirsync_core::{ApplyOptions, GroupDeletion, IdentityAttrs, Provider, SyncPlan};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{PostgresError, Result};

/// Applies every step of `plan` on `conn`.
pub async fn apply_plan(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
    options: ApplyOptions,
    now: OffsetDateTime,
) -> Result<()> {
    insert_identities(conn, provider, plan, now).await?;
    update_identities(conn, provider, plan, now).await?;
    delete_identities(conn, provider, plan, now).await?;
    upsert_groups(conn, provider, plan, now).await?;
    delete_groups(conn, provider, plan, options, now).await?;
    delete_memberships(conn, provider, plan).await?;
    insert_memberships(conn, provider, plan).await?;
    Ok(())
}

fn attrs<'a>(plan: &'a SyncPlan, key: &str) -> Result<&'a IdentityAttrs> {
    plan.identities
        .get(key)
        .ok_or_else(|| PostgresError::integrity(format!("plan has no attributes for {key}")))
}

fn provider_state_json(attrs: &IdentityAttrs) -> Result<serde_json::Value> {
    serde_json::to_value(&attrs.provider_state)
        .map_err(|e| PostgresError::decode(format!("identity {}: {e}", attrs.provider_identifier)))
}

async fn insert_identities(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
    now: OffsetDateTime,
) -> Result<()> {
    for key in &plan.identity_insert_ids {
        let attrs = attrs(plan, key)?;
        let actor_id = Uuid::new_v4();

        query(
            r#"
            INSERT INTO actors (id, account_id, type, name, inserted_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(actor_id)
        .bind(provider.account_id)
        .bind(attrs.actor.kind.as_str())
        .bind(&attrs.actor.name)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        query(
            r#"
            INSERT INTO identities (id, account_id, provider_id, actor_id, provider_identifier,
                                    provider_state, email, last_synced_at, inserted_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider.account_id)
        .bind(provider.id)
        .bind(actor_id)
        .bind(key)
        .bind(provider_state_json(attrs)?)
        .bind(&attrs.provider_state.email)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn update_identities(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
    now: OffsetDateTime,
) -> Result<()> {
    if plan.identity_update_ids.is_empty() {
        return Ok(());
    }

    let keys: Vec<&str> = plan.identity_update_ids.iter().map(String::as_str).collect();
    let touched = query(
        r#"
        UPDATE identities
        SET last_synced_at = $3
        WHERE provider_id = $1 AND provider_identifier = ANY($2) AND deleted_at IS NULL
        "#,
    )
    .bind(provider.id)
    .bind(&keys)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if touched != keys.len() as u64 {
        return Err(PostgresError::integrity(format!(
            "expected {} live identities to refresh, found {touched}",
            keys.len()
        )));
    }

    for key in &plan.changed_identity_ids {
        let attrs = attrs(plan, key)?;

        let (actor_id,): (Uuid,) = query_as(
            r#"
            UPDATE identities
            SET provider_state = $3, email = $4, updated_at = $5
            WHERE provider_id = $1 AND provider_identifier = $2 AND deleted_at IS NULL
            RETURNING actor_id
            "#,
        )
        .bind(provider.id)
        .bind(key)
        .bind(provider_state_json(attrs)?)
        .bind(&attrs.provider_state.email)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        query("UPDATE actors SET type = $2, name = $3, updated_at = $4 WHERE id = $1")
            .bind(actor_id)
            .bind(attrs.actor.kind.as_str())
            .bind(&attrs.actor.name)
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn delete_identities(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
    now: OffsetDateTime,
) -> Result<()> {
    if plan.identity_delete_ids.is_empty() {
        return Ok(());
    }

    let keys: Vec<&str> = plan.identity_delete_ids.iter().map(String::as_str).collect();
    let actor_ids: Vec<(Uuid,)> = query_as(
        r#"
        UPDATE identities
        SET deleted_at = $3, updated_at = $3
        WHERE provider_id = $1 AND provider_identifier = ANY($2) AND deleted_at IS NULL
        RETURNING actor_id
        "#,
    )
    .bind(provider.id)
    .bind(&keys)
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;

    let actor_ids: Vec<Uuid> = actor_ids.into_iter().map(|(id,)| id).collect();
    query(
        r#"
        UPDATE actors a
        SET deleted_at = $2, updated_at = $2
        WHERE a.id = ANY($1)
          AND a.deleted_at IS NULL
          AND NOT EXISTS (
              SELECT 1 FROM identities i WHERE i.actor_id = a.id AND i.deleted_at IS NULL
          )
        "#,
    )
    .bind(&actor_ids)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn upsert_groups(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
    now: OffsetDateTime,
) -> Result<()> {
    let mut keys = Vec::with_capacity(plan.group_upsert_ids.len());
    let mut names = Vec::with_capacity(plan.group_upsert_ids.len());
    for key in &plan.group_upsert_ids {
        let group = plan.groups.get(key).ok_or_else(|| {
            PostgresError::integrity(format!("plan has no attributes for group {key}"))
        })?;
        keys.push(key.as_str());
        names.push(group.name.as_str());
    }
    if keys.is_empty() {
        return Ok(());
    }

    // Unchanged groups match the conflict target but are left untouched
    query(
        r#"
        INSERT INTO actor_groups (id, account_id, provider_id, provider_identifier, name,
                                  inserted_at, updated_at)
        SELECT gen_random_uuid(), $1, $2, t.key, t.name, $5, $5
        FROM UNNEST($3::text[], $4::text[]) AS t(key, name)
        ON CONFLICT (provider_id, provider_identifier) WHERE deleted_at IS NULL
        DO UPDATE SET name = EXCLUDED.name, updated_at = EXCLUDED.updated_at
        WHERE actor_groups.name IS DISTINCT FROM EXCLUDED.name
        "#,
    )
    .bind(provider.account_id)
    .bind(provider.id)
    .bind(&keys)
    .bind(&names)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn delete_groups(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
    options: ApplyOptions,
    now: OffsetDateTime,
) -> Result<()> {
    if plan.group_delete_ids.is_empty() {
        return Ok(());
    }

    let keys: Vec<&str> = plan.group_delete_ids.iter().map(String::as_str).collect();
    match options.group_deletion {
        GroupDeletion::Soft => {
            query(
                r#"
                WITH deleted AS (
                    UPDATE actor_groups
                    SET deleted_at = $3, updated_at = $3
                    WHERE provider_id = $1 AND provider_identifier = ANY($2)
                      AND deleted_at IS NULL
                    RETURNING id
                )
                DELETE FROM actor_group_memberships
                WHERE group_id IN (SELECT id FROM deleted)
                "#,
            )
            .bind(provider.id)
            .bind(&keys)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }
        GroupDeletion::Hard => {
            // Memberships go with the row through ON DELETE CASCADE
            query(
                r#"
                DELETE FROM actor_groups
                WHERE provider_id = $1 AND provider_identifier = ANY($2) AND deleted_at IS NULL
                "#,
            )
            .bind(provider.id)
            .bind(&keys)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

/// Splits membership tuples into parallel key arrays for `UNNEST`.
fn tuple_arrays<'a>(
    tuples: impl Iterator<Item = &'a dirsync_core::MembershipTuple>,
) -> (Vec<&'a str>, Vec<&'a str>) {
    tuples
        .map(|tuple| {
            (
                tuple.group_provider_identifier.as_str(),
                tuple.identity_provider_identifier.as_str(),
            )
        })
        .unzip()
}

async fn delete_memberships(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
) -> Result<()> {
    if plan.membership_delete_tuples.is_empty() {
        return Ok(());
    }

    let (group_keys, identity_keys) = tuple_arrays(plan.membership_delete_tuples.iter());
    query(
        r#"
        DELETE FROM actor_group_memberships m
        USING UNNEST($2::text[], $3::text[]) AS t(group_key, identity_key),
              actor_groups g,
              identities i
        WHERE g.provider_id = $1 AND g.provider_identifier = t.group_key
          AND i.provider_id = $1 AND i.provider_identifier = t.identity_key
          AND m.group_id = g.id
          AND m.actor_id = i.actor_id
        "#,
    )
    .bind(provider.id)
    .bind(&group_keys)
    .bind(&identity_keys)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_memberships(
    conn: &mut PgConnection,
    provider: &Provider,
    plan: &SyncPlan,
) -> Result<()> {
    if plan.membership_insert_tuples.is_empty() {
        return Ok(());
    }

    let (group_keys, identity_keys) = tuple_arrays(plan.membership_insert_tuples.iter());
    let inserted = query(
        r#"
        INSERT INTO actor_group_memberships (actor_id, group_id, account_id)
        SELECT i.actor_id, g.id, $2
        FROM UNNEST($3::text[], $4::text[]) AS t(group_key, identity_key)
        JOIN actor_groups g
          ON g.provider_id = $1 AND g.provider_identifier = t.group_key AND g.deleted_at IS NULL
        JOIN identities i
          ON i.provider_id = $1 AND i.provider_identifier = t.identity_key AND i.deleted_at IS NULL
        ON CONFLICT (actor_id, group_id) DO NOTHING
        "#,
    )
    .bind(provider.id)
    .bind(provider.account_id)
    .bind(&group_keys)
    .bind(&identity_keys)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    // Every tuple must resolve to a live identity and group
    if inserted != group_keys.len() as u64 {
        return Err(PostgresError::integrity(format!(
            "expected to insert {} memberships, inserted {inserted}",
            group_keys.len()
        )));
    }

    Ok(())
}
