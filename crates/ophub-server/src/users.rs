use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use ophub_db::entities::users;
use ophub_domain::{Role, TransitionError, UserStatus};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait, sea_query::OnConflict,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{self, actions, entity_types};
use crate::auth::{self, Principal};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: UserStatus,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<users::Model> for UserView {
    type Error = DbErr;

    fn try_from(u: users::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            status: u.status.parse().map_err(|e| DbErr::Type(format!("{e}")))?,
            role: u.role.parse().map_err(|e| DbErr::Type(format!("{e}")))?,
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            created_at: u.created_at.with_timezone(&Utc),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl CreateUserRequest {
    fn validated(self) -> Result<Self, ApiError> {
        let email = self.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::BadRequest(format!("invalid email: {:?}", self.email)));
        }
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(ApiError::BadRequest("first and last name are required".into()));
        }
        Ok(Self {
            email,
            first_name,
            last_name,
            role: self.role,
        })
    }
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("User not found: id={id}"))
}

fn parse_status(user: &users::Model) -> Result<UserStatus, ApiError> {
    user.status
        .parse()
        .map_err(|e| ApiError::Db(DbErr::Type(format!("{e}"))))
}

pub async fn create_user(
    db: &DatabaseConnection,
    actor: &Principal,
    input: CreateUserRequest,
) -> Result<UserView, ApiError> {
    actor.ensure(actor.role.can_manage_users(), "manage users")?;
    let input = input.validated()?;

    let txn = db.begin().await?;

    let taken = users::Entity::find()
        .filter(users::Column::Email.eq(input.email.as_str()))
        .count(&txn)
        .await?
        > 0;
    if taken {
        return Err(ApiError::Conflict(format!(
            "User with email already exists: {}",
            input.email
        )));
    }

    let now = Utc::now();
    let inserted = users::ActiveModel {
        id: NotSet,
        email: Set(input.email),
        first_name: Set(input.first_name),
        last_name: Set(input.last_name),
        status: Set(UserStatus::Active.as_str().to_string()),
        role: Set(input.role.unwrap_or_default().as_str().to_string()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await;

    let user = match inserted {
        Ok(user) => user,
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            return Err(ApiError::Conflict("User with email already exists".into()));
        }
        Err(err) => return Err(err.into()),
    };

    audit::record(
        &txn,
        Some(actor.user_id),
        actions::USER_CREATED,
        entity_types::USER,
        user.id,
        &format!("User created: {}", user.email),
        Some(&audit::metadata_json(&json!({ "email": user.email }))),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(user_id = user.id, email = %user.email, actor = actor.user_id, "user created");

    Ok(UserView::try_from(user)?)
}

pub async fn list_users(
    db: &DatabaseConnection,
    status: Option<UserStatus>,
) -> Result<Vec<UserView>, ApiError> {
    let mut query = users::Entity::find().order_by_asc(users::Column::Id);
    if let Some(status) = status {
        query = query.filter(users::Column::Status.eq(status.as_str()));
    }

    let rows = query.all(db).await?;
    Ok(rows
        .into_iter()
        .map(UserView::try_from)
        .collect::<Result<Vec<_>, DbErr>>()?)
}

pub async fn get_user(db: &DatabaseConnection, id: i64) -> Result<UserView, ApiError> {
    let user = users::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(UserView::try_from(user)?)
}

pub async fn disable_user(
    db: &DatabaseConnection,
    actor: &Principal,
    id: i64,
) -> Result<UserView, ApiError> {
    change_status(db, actor, id, UserStatus::disable, actions::USER_DISABLED, "disabled").await
}

pub async fn enable_user(
    db: &DatabaseConnection,
    actor: &Principal,
    id: i64,
) -> Result<UserView, ApiError> {
    change_status(db, actor, id, UserStatus::enable, actions::USER_ENABLED, "enabled").await
}

async fn change_status(
    db: &DatabaseConnection,
    actor: &Principal,
    id: i64,
    transition: fn(UserStatus) -> Result<UserStatus, TransitionError>,
    action: &str,
    verb: &str,
) -> Result<UserView, ApiError> {
    actor.ensure(actor.role.can_manage_users(), "manage users")?;

    let txn = db.begin().await?;
    let user = users::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| not_found(id))?;

    let next = transition(parse_status(&user)?)?;
    let email = user.email.clone();

    let mut active: users::ActiveModel = user.into();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let user = active.update(&txn).await?;

    audit::record(
        &txn,
        Some(actor.user_id),
        action,
        entity_types::USER,
        id,
        &format!("User {verb}: {email}"),
        Some(&audit::metadata_json(&json!({ "email": email }))),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(user_id = id, status = %next, actor = actor.user_id, "user status changed");

    Ok(UserView::try_from(user)?)
}

pub async fn change_role(
    db: &DatabaseConnection,
    actor: &Principal,
    id: i64,
    role: Role,
) -> Result<UserView, ApiError> {
    actor.ensure(actor.role.can_manage_users(), "manage users")?;

    let txn = db.begin().await?;
    let user = users::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| not_found(id))?;

    let current: Role = user
        .role
        .parse()
        .map_err(|e| ApiError::Db(DbErr::Type(format!("{e}"))))?;
    let next = current.change_to(role)?;
    let email = user.email.clone();

    let mut active: users::ActiveModel = user.into();
    active.role = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let user = active.update(&txn).await?;

    audit::record(
        &txn,
        Some(actor.user_id),
        actions::USER_ROLE_CHANGED,
        entity_types::USER,
        id,
        &format!("User role changed: {email} {current} -> {next}"),
        Some(&audit::metadata_json(
            &json!({ "email": email, "from": current, "to": next }),
        )),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(user_id = id, from = %current, to = %next, actor = actor.user_id, "user role changed");

    Ok(UserView::try_from(user)?)
}

/// Seeds the bootstrap admin. Running it again is a no-op.
pub async fn ensure_admin(db: &DatabaseConnection, email: &str) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    let now = Utc::now();
    let inserted = users::Entity::insert(users::ActiveModel {
        id: NotSet,
        email: Set(email.to_string()),
        first_name: Set("Admin".to_string()),
        last_name: Set("User".to_string()),
        status: Set(UserStatus::Active.as_str().to_string()),
        role: Set(Role::Admin.as_str().to_string()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    })
    .on_conflict(
        OnConflict::column(users::Column::Email)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&txn)
    .await?;

    if inserted == 0 {
        return txn.commit().await;
    }

    let admin = users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(&txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("bootstrap admin {email}")))?;

    // System-initiated, so there is no actor.
    audit::record(
        &txn,
        None,
        actions::USER_CREATED,
        entity_types::USER,
        admin.id,
        &format!("User created: {email}"),
        Some(&audit::metadata_json(&json!({ "email": email, "bootstrap": true }))),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(user_id = admin.id, email, "bootstrap admin created");
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

pub async fn list(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    auth::require(principal)?;
    let Query(query) = query?;
    Ok(Json(list_users(&state.db, query.status).await?))
}

pub async fn me(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
) -> Result<Json<UserView>, ApiError> {
    let principal = auth::require(principal)?;
    Ok(Json(get_user(&state.db, principal.user_id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let principal = auth::require(principal)?;
    let Json(input) = body?;
    let user = create_user(&state.db, &principal, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn disable(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let principal = auth::require(principal)?;
    disable_user(&state.db, &principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn enable(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let principal = auth::require(principal)?;
    enable_user(&state.db, &principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_role(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    Path(id): Path<i64>,
    body: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> Result<Json<UserView>, ApiError> {
    let principal = auth::require(principal)?;
    let Json(input) = body?;
    Ok(Json(change_role(&state.db, &principal, id, input.role).await?))
}
