use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{delete, get, patch},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::AppState;
use crate::{audit, auth, security, tasks, users};

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    version: &'static str,
    database: bool,
    error: Option<String>,
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthzResponse>) {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthzResponse {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                database: true,
                error: None,
            }),
        ),
        Err(err) => {
            tracing::warn!(%err, "database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthzResponse {
                    status: "degraded",
                    version: env!("CARGO_PKG_VERSION"),
                    database: false,
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

pub fn router(state: AppState, config: &Config) -> Router {
    // Every /api route sees the dev-auth principal when one was resolved.
    let api = Router::new()
        .route("/audit", get(audit::list_events))
        .route("/users", get(users::list).post(users::create))
        .route("/users/me", get(users::me))
        .route("/users/:id", delete(users::disable))
        .route("/users/:id/enable", patch(users::enable))
        .route("/users/:id/role", patch(users::update_role))
        .route("/tasks", get(tasks::list).post(tasks::create))
        .route("/tasks/:id/status", patch(tasks::change_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth::dev_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(security::cors_layer(&config.allowed_origins))
        .layer(middleware::from_fn(security::request_id))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request, header},
        response::Response,
    };
    use ophub_domain::{Role, UserStatus};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::USER_ID_HEADER;
    use crate::security::REQUEST_ID_HEADER;
    use crate::testing;

    fn test_config() -> Config {
        Config {
            database_url: "sqlite::memory:".into(),
            bind_addr: ([127, 0, 0, 1], 0).into(),
            allowed_origins: vec!["http://localhost:5173".into()],
            admin_email: "admin@localhost".into(),
        }
    }

    async fn setup() -> (Router, i64) {
        let db = testing::test_db().await;
        let admin = testing::insert_user(&db, "root@ops.test", Role::Admin, UserStatus::Active).await;
        let state = AppState { db: Arc::new(db) };
        (router(state, &test_config()), admin.id)
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_as(uri: &str, user_id: Option<i64>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(id) = user_id {
            builder = builder.header(USER_ID_HEADER, id.to_string());
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_as(method: Method, uri: &str, user_id: i64, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, user_id.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_ok_and_request_id() {
        let (app, _) = setup().await;

        let response = send(&app, get_as("/healthz", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], true);
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let (app, _) = setup().await;

        let req = Request::builder()
            .uri("/healthz")
            .header(REQUEST_ID_HEADER, "trace-123")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "trace-123");
    }

    #[tokio::test]
    async fn audit_requires_an_admin() {
        let (app, admin_id) = setup().await;

        let response = send(&app, get_as("/api/audit", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["status"], 401);

        // Malformed ids leave the request anonymous.
        let req = Request::builder()
            .uri("/api/audit")
            .header(USER_ID_HEADER, "abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let created = send(
            &app,
            json_as(
                Method::POST,
                "/api/users",
                admin_id,
                json!({"email": "mgr@ops.test", "firstName": "M", "lastName": "Gr", "role": "MANAGER"}),
            ),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let manager_id = body_json(created).await["id"].as_i64().unwrap();

        let response = send(&app, get_as("/api/audit", Some(manager_id))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn created_user_shows_up_in_audit_page() {
        let (app, admin_id) = setup().await;

        let response = send(
            &app,
            json_as(
                Method::POST,
                "/api/users",
                admin_id,
                json!({"email": "a@b.com", "firstName": "A", "lastName": "B"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let user = body_json(response).await;
        assert_eq!(user["status"], "ACTIVE");
        assert_eq!(user["role"], "USER");
        let user_id = user["id"].as_i64().unwrap();

        let uri = format!("/api/audit?entityType=USER&entityId={user_id}&action=&page=0&size=20");
        let response = send(&app, get_as(&uri, Some(admin_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_json(response).await;

        assert_eq!(page["totalElements"], 1);
        assert_eq!(page["totalPages"], 1);
        assert_eq!(page["number"], 0);
        assert_eq!(page["size"], 20);
        let event = &page["content"][0];
        assert_eq!(event["action"], "USER_CREATED");
        assert_eq!(event["entityType"], "USER");
        assert_eq!(event["entityId"], user_id.to_string());
        assert_eq!(event["actorUserId"], admin_id);
        assert_eq!(event["summary"], "User created: a@b.com");
        assert_eq!(event["metadata"], json!({"email": "a@b.com"}));
        assert!(event["occurredAt"].is_string());
    }

    #[tokio::test]
    async fn audit_paging_is_clamped_not_rejected() {
        let (app, admin_id) = setup().await;

        let response = send(&app, get_as("/api/audit?page=-1&size=500", Some(admin_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_json(response).await;
        assert_eq!(page["number"], 0);
        assert_eq!(page["size"], 100);
        assert_eq!(page["totalElements"], 0);
        assert_eq!(page["content"], json!([]));
    }

    #[tokio::test]
    async fn huge_audit_page_is_an_empty_page() {
        let (app, admin_id) = setup().await;

        let uri = format!("/api/audit?page={}&size=100", i64::MAX);
        let response = send(&app, get_as(&uri, Some(admin_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_json(response).await;
        assert_eq!(page["content"], json!([]));
        assert_eq!(page["size"], 100);
    }

    #[tokio::test]
    async fn malformed_actor_filter_is_a_bad_request() {
        let (app, admin_id) = setup().await;

        let response = send(&app, get_as("/api/audit?actorUserId=nope", Some(admin_id))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn disabled_user_loses_access_and_is_audited() {
        let (app, admin_id) = setup().await;

        let created = send(
            &app,
            json_as(
                Method::POST,
                "/api/users",
                admin_id,
                json!({"email": "u@ops.test", "firstName": "U", "lastName": "Ser"}),
            ),
        )
        .await;
        let user_id = body_json(created).await["id"].as_i64().unwrap();

        let response = send(&app, get_as("/api/users/me", Some(user_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["email"], "u@ops.test");

        let req = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/users/{user_id}"))
            .header(USER_ID_HEADER, admin_id.to_string())
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::NO_CONTENT);

        let response = send(&app, get_as("/api/users/me", Some(user_id))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&app, get_as("/api/users?status=DISABLED", Some(admin_id))).await;
        let users = body_json(response).await;
        assert_eq!(users.as_array().unwrap().len(), 1);
        assert_eq!(users[0]["id"], user_id);

        let uri = format!("/api/audit?action=USER_DISABLED&entityId={user_id}");
        let page = body_json(send(&app, get_as(&uri, Some(admin_id))).await).await;
        assert_eq!(page["totalElements"], 1);

        let req = Request::builder()
            .method(Method::PATCH)
            .uri(format!("/api/users/{user_id}/enable"))
            .header(USER_ID_HEADER, admin_id.to_string())
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn task_flow_over_http() {
        let (app, admin_id) = setup().await;

        let response = send(
            &app,
            json_as(
                Method::POST,
                "/api/tasks",
                admin_id,
                json!({"title": "Patch servers", "priority": "HIGH", "dueDate": "2026-12-01"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let task = body_json(response).await;
        assert_eq!(task["status"], "OPEN");
        assert_eq!(task["priority"], "HIGH");
        assert_eq!(task["dueDate"], "2026-12-01");
        let task_id = task["id"].as_i64().unwrap();

        let response = send(
            &app,
            json_as(
                Method::PATCH,
                &format!("/api/tasks/{task_id}/status"),
                admin_id,
                json!({"status": "DONE"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &app,
            json_as(
                Method::PATCH,
                &format!("/api/tasks/{task_id}/status"),
                admin_id,
                json!({"status": "CANCELLED"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "CANCELLED");

        let response = send(&app, get_as("/api/tasks?status=CANCELLED&size=5", Some(admin_id))).await;
        let page = body_json(response).await;
        assert_eq!(page["totalElements"], 1);
        assert_eq!(page["size"], 5);
        assert_eq!(page["content"][0]["id"], task_id);
    }

    #[tokio::test]
    async fn invalid_json_body_is_a_bad_request() {
        let (app, admin_id) = setup().await;

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/users")
            .header(USER_ID_HEADER, admin_id.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"email\": 1"))
            .unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
