use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use ophub_db::entities::{tasks, users};
use ophub_domain::{DEFAULT_PAGE_SIZE, Page, PageRequest, TaskPriority, TaskStatus, UserStatus};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, NotSet,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{self, actions, entity_types};
use crate::auth::{self, Principal};
use crate::error::ApiError;
use crate::state::AppState;

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_by: i64,
    pub assignee_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<tasks::Model> for TaskView {
    type Error = DbErr;

    fn try_from(t: tasks::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            status: t.status.parse().map_err(|e| DbErr::Type(format!("{e}")))?,
            priority: t.priority.parse().map_err(|e| DbErr::Type(format!("{e}")))?,
            id: t.id,
            title: t.title,
            description: t.description,
            created_by: t.created_by,
            assignee_id: t.assignee_id,
            due_date: t.due_date,
            created_at: t.created_at.with_timezone(&Utc),
            updated_at: t.updated_at.with_timezone(&Utc),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Admins and managers see every task; everyone else only what is assigned to them.
pub async fn list_tasks(
    db: &DatabaseConnection,
    principal: &Principal,
    status: Option<TaskStatus>,
    page: i64,
    size: i64,
) -> Result<Page<TaskView>, ApiError> {
    let request = PageRequest::clamped(page, size);

    let mut cond = Condition::all();
    if let Some(status) = status {
        cond = cond.add(tasks::Column::Status.eq(status.as_str()));
    }
    if !principal.role.can_manage_tasks() {
        cond = cond.add(tasks::Column::AssigneeId.eq(principal.user_id));
    }

    let paginator = tasks::Entity::find()
        .filter(cond)
        .order_by_desc(tasks::Column::UpdatedAt)
        .order_by_desc(tasks::Column::Id)
        .paginate(db, request.size);

    let total = paginator.num_items().await?;
    if request.is_past_end(total) {
        return Ok(Page::new(Vec::new(), total, request));
    }
    let rows = paginator
        .fetch_page(request.page)
        .await?
        .into_iter()
        .map(TaskView::try_from)
        .collect::<Result<Vec<_>, DbErr>>()?;

    Ok(Page::new(rows, total, request))
}

pub async fn create_task(
    db: &DatabaseConnection,
    actor: &Principal,
    input: CreateTaskRequest,
) -> Result<TaskView, ApiError> {
    actor.ensure(actor.role.can_manage_tasks(), "create tasks")?;

    let title = input.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "title is longer than {MAX_TITLE_CHARS} characters"
        )));
    }
    let description = input.description.filter(|d| !d.trim().is_empty());
    let priority = input.priority.unwrap_or_default();

    let txn = db.begin().await?;

    if let Some(assignee_id) = input.assignee_id {
        let assignee = users::Entity::find_by_id(assignee_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("assignee not found: id={assignee_id}")))?;
        if assignee.status != UserStatus::Active.as_str() {
            return Err(ApiError::BadRequest(format!(
                "assignee is not active: id={assignee_id}"
            )));
        }
    }

    let now = Utc::now();
    let task = tasks::ActiveModel {
        id: NotSet,
        title: Set(title),
        description: Set(description),
        status: Set(TaskStatus::default().as_str().to_string()),
        priority: Set(priority.as_str().to_string()),
        created_by: Set(actor.user_id),
        assignee_id: Set(input.assignee_id),
        due_date: Set(input.due_date),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    audit::record(
        &txn,
        Some(actor.user_id),
        actions::TASK_CREATED,
        entity_types::TASK,
        task.id,
        &format!("Task created: {}", task.title),
        Some(&audit::metadata_json(&json!({
            "title": task.title,
            "priority": priority,
            "assigneeId": task.assignee_id,
        }))),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(task_id = task.id, actor = actor.user_id, "task created");

    Ok(TaskView::try_from(task)?)
}

/// Managers move any task; a plain user only the tasks assigned to them.
pub async fn change_task_status(
    db: &DatabaseConnection,
    actor: &Principal,
    id: i64,
    to: TaskStatus,
) -> Result<TaskView, ApiError> {
    let txn = db.begin().await?;
    let task = tasks::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task not found: id={id}")))?;

    let is_assignee = task.assignee_id == Some(actor.user_id);
    actor.ensure(
        actor.role.can_manage_tasks() || is_assignee,
        "change the status of this task",
    )?;

    let from: TaskStatus = task
        .status
        .parse()
        .map_err(|e| ApiError::Db(DbErr::Type(format!("{e}"))))?;
    let next = from.transition_to(to)?;
    let title = task.title.clone();

    let mut active: tasks::ActiveModel = task.into();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let task = active.update(&txn).await?;

    audit::record(
        &txn,
        Some(actor.user_id),
        actions::TASK_STATUS_CHANGED,
        entity_types::TASK,
        id,
        &format!("Task {title}: {from} -> {next}"),
        Some(&audit::metadata_json(&json!({ "from": from, "to": next }))),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(task_id = id, %from, to = %next, terminal = next.is_terminal(), "task status changed");

    Ok(TaskView::try_from(task)?)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: TaskStatus,
}

pub async fn list(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<Page<TaskView>>, ApiError> {
    let principal = auth::require(principal)?;
    let Query(query) = query?;
    let page = list_tasks(
        &state.db,
        &principal,
        query.status,
        query.page.unwrap_or(0),
        query.size.unwrap_or(DEFAULT_PAGE_SIZE),
    )
    .await?;
    Ok(Json(page))
}

pub async fn create(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskView>), ApiError> {
    let principal = auth::require(principal)?;
    let Json(input) = body?;
    let task = create_task(&state.db, &principal, input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn change_status(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    Path(id): Path<i64>,
    body: Result<Json<ChangeStatusRequest>, JsonRejection>,
) -> Result<Json<TaskView>, ApiError> {
    let principal = auth::require(principal)?;
    let Json(input) = body?;
    Ok(Json(change_task_status(&state.db, &principal, id, input.status).await?))
}
