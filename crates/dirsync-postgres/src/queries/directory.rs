//! Reads of a provider's live directory rows.

use dirsync_core::{
    ActorAttrs, ActorType, LocalGroup, LocalIdentity, LocalState, MembershipTuple, ProviderState,
};
use serde_json::Value;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgConnection;
use uuid::Uuid;

use crate::error::{PostgresError, Result};

type IdentityRow = (Uuid, Uuid, String, Value, String, String);

/// Loads live identities (with their actors), live groups and the
/// memberships between them for one provider.
pub async fn load_local_state(conn: &mut PgConnection, provider_id: Uuid) -> Result<LocalState> {
    let mut local = LocalState::default();

    let identities: Vec<IdentityRow> = query_as(
        r#"
        SELECT i.id, i.actor_id, i.provider_identifier, i.provider_state, a.type, a.name
        FROM identities i
        JOIN actors a ON a.id = i.actor_id
        WHERE i.provider_id = $1 AND i.deleted_at IS NULL
        "#,
    )
    .bind(provider_id)
    .fetch_all(&mut *conn)
    .await?;

    for (identity_id, actor_id, key, provider_state, kind, name) in identities {
        let provider_state: ProviderState = serde_json::from_value(provider_state)
            .map_err(|e| PostgresError::decode(format!("identity {identity_id}: {e}")))?;
        let kind = kind
            .parse::<ActorType>()
            .map_err(|e| PostgresError::decode(format!("actor {actor_id}: {e}")))?;
        local.identities.insert(
            key,
            LocalIdentity {
                identity_id,
                actor_id,
                provider_state,
                actor: ActorAttrs { kind, name },
            },
        );
    }

    let groups: Vec<(Uuid, String, String)> = query_as(
        r#"
        SELECT id, provider_identifier, name
        FROM actor_groups
        WHERE provider_id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(provider_id)
    .fetch_all(&mut *conn)
    .await?;

    for (group_id, key, name) in groups {
        local.groups.insert(key, LocalGroup { group_id, name });
    }

    let memberships: Vec<(String, String)> = query_as(
        r#"
        SELECT g.provider_identifier, i.provider_identifier
        FROM actor_group_memberships m
        JOIN actor_groups g ON g.id = m.group_id
        JOIN identities i ON i.actor_id = m.actor_id
             AND i.provider_id = g.provider_id
             AND i.deleted_at IS NULL
        WHERE g.provider_id = $1 AND g.deleted_at IS NULL
        "#,
    )
    .bind(provider_id)
    .fetch_all(&mut *conn)
    .await?;

    local.memberships = memberships
        .into_iter()
        .map(|(group, identity)| MembershipTuple::new(group, identity))
        .collect();

    Ok(local)
}

/// Distinct email addresses of the account's live administrators.
pub async fn admin_emails(conn: &mut PgConnection, account_id: Uuid) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = query_as(
        r#"
        SELECT DISTINCT i.email
        FROM identities i
        JOIN actors a ON a.id = i.actor_id
        WHERE a.account_id = $1
          AND a.type = 'account_admin_user'
          AND a.deleted_at IS NULL
          AND i.deleted_at IS NULL
          AND i.email IS NOT NULL
        ORDER BY i.email
        "#,
    )
    .bind(account_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(email,)| email).collect())
}
