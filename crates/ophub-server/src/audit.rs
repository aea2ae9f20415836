//! Audit trail: append-only events written next to business mutations, read
//! back through a filtered, paginated query.

use std::fmt::Display;

use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use ophub_db::entities::audit_events;
use ophub_domain::{DEFAULT_PAGE_SIZE, Page, PageRequest};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize, Serializer};

use crate::auth::{self, Principal};
use crate::error::ApiError;
use crate::state::AppState;

pub const EMPTY_METADATA: &str = "{}";

const MAX_SUMMARY_CHARS: usize = 255;

pub mod actions {
    pub const USER_CREATED: &str = "USER_CREATED";
    pub const USER_DISABLED: &str = "USER_DISABLED";
    pub const USER_ENABLED: &str = "USER_ENABLED";
    pub const USER_ROLE_CHANGED: &str = "USER_ROLE_CHANGED";
    pub const TASK_CREATED: &str = "TASK_CREATED";
    pub const TASK_STATUS_CHANGED: &str = "TASK_STATUS_CHANGED";
}

pub mod entity_types {
    pub const USER: &str = "USER";
    pub const TASK: &str = "TASK";
}

/// Serializes audit metadata. A value that cannot be serialized is recorded as
/// `{}` instead of failing the surrounding write.
pub fn metadata_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to serialize audit metadata");
        EMPTY_METADATA.to_string()
    })
}

fn normalize_metadata(raw: Option<&str>) -> String {
    match raw {
        Some(text) if !text.trim().is_empty() => {
            if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
                text.to_string()
            } else {
                tracing::warn!(metadata = text, "audit metadata is not valid JSON");
                EMPTY_METADATA.to_string()
            }
        }
        _ => EMPTY_METADATA.to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Appends one audit event on `conn`.
///
/// Pass the transaction that carries the business mutation: the event then
/// commits or rolls back together with it. Insert failures are returned so the
/// caller's transaction fails as a whole.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    actor_user_id: Option<i64>,
    action: &str,
    entity_type: &str,
    entity_id: impl Display,
    summary: &str,
    metadata_json: Option<&str>,
) -> Result<(), DbErr> {
    let entity_id = entity_id.to_string();

    let model = audit_events::ActiveModel {
        id: NotSet,
        occurred_at: Set(Utc::now().into()),
        actor_user_id: Set(actor_user_id),
        action: Set(action.to_string()),
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id.clone()),
        summary: Set(truncate_chars(summary, MAX_SUMMARY_CHARS)),
        metadata: Set(normalize_metadata(metadata_json)),
    };

    audit_events::Entity::insert(model).exec(conn).await?;
    tracing::debug!(action, entity_type, entity_id, ?actor_user_id, "audit event recorded");
    Ok(())
}

/// Optional criteria; every one that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub action: Option<String>,
    pub actor_user_id: Option<i64>,
}

impl AuditFilter {
    pub fn condition(&self) -> Condition {
        [
            self.entity_type
                .as_ref()
                .map(|v| audit_events::Column::EntityType.eq(v.as_str())),
            self.entity_id
                .as_ref()
                .map(|v| audit_events::Column::EntityId.eq(v.as_str())),
            self.action
                .as_ref()
                .map(|v| audit_events::Column::Action.eq(v.as_str())),
            self.actor_user_id
                .map(|v| audit_events::Column::ActorUserId.eq(v)),
        ]
        .into_iter()
        .flatten()
        .fold(Condition::all(), |cond, expr| cond.add(expr))
    }
}

/// Newest first. Events sharing a timestamp fall back to the store-assigned id,
/// so later inserts still come first.
pub async fn search<C: ConnectionTrait>(
    conn: &C,
    filter: &AuditFilter,
    page: i64,
    size: i64,
) -> Result<Page<AuditEventView>, DbErr> {
    let request = PageRequest::clamped(page, size);

    let paginator = audit_events::Entity::find()
        .filter(filter.condition())
        .order_by_desc(audit_events::Column::OccurredAt)
        .order_by_desc(audit_events::Column::Id)
        .paginate(conn, request.size);

    let total = paginator.num_items().await?;
    if request.is_past_end(total) {
        return Ok(Page::new(Vec::new(), total, request));
    }
    let rows = paginator.fetch_page(request.page).await?;

    Ok(Page::new(rows, total, request).map(AuditEventView::from))
}

/// Wire shape of an audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventView {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor_user_id: Option<i64>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub summary: String,
    #[serde(serialize_with = "raw_json")]
    pub metadata: String,
}

impl From<audit_events::Model> for AuditEventView {
    fn from(e: audit_events::Model) -> Self {
        Self {
            id: e.id,
            occurred_at: e.occurred_at.with_timezone(&Utc),
            actor_user_id: e.actor_user_id,
            action: e.action,
            entity_type: e.entity_type,
            entity_id: e.entity_id,
            summary: e.summary,
            metadata: e.metadata,
        }
    }
}

// Metadata goes out as a JSON value rather than a quoted string.
fn raw_json<S: Serializer>(text: &str, serializer: S) -> Result<S::Ok, S::Error> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value.serialize(serializer),
        Err(_) => serializer.serialize_str(text),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub action: Option<String>,
    pub actor_user_id: Option<i64>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AuditQuery {
    /// Empty form fields (`?entityType=`) do not restrict results.
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            entity_type: non_blank(self.entity_type.clone()),
            entity_id: non_blank(self.entity_id.clone()),
            action: non_blank(self.action.clone()),
            actor_user_id: self.actor_user_id,
        }
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> Result<Json<Page<AuditEventView>>, ApiError> {
    let principal = auth::require(principal)?;
    principal.ensure(principal.role.can_read_audit(), "read the audit log")?;
    let Query(query) = query?;

    let page = search(
        &*state.db,
        &query.filter(),
        query.page.unwrap_or(0),
        query.size.unwrap_or(DEFAULT_PAGE_SIZE),
    )
    .await?;

    Ok(Json(page))
}
