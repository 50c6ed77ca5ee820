use crate::infra::{AppState, Components};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use hr_desk::auth::auth_router;
use hr_desk::workflows::interviews::interview_router;
use hr_desk::workflows::{query_router, report_router};
use serde_json::json;

pub(crate) fn app_router(components: &Components) -> Router {
    Router::new()
        .merge(auth_router(components.auth.clone()))
        .merge(interview_router(components.interviews.clone()))
        .merge(query_router(components.queries.clone()))
        .merge(report_router(components.reports.clone()))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::initialize_database;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use hr_desk::config::{
        AppConfig, AppEnvironment, CacheConfig, DatabaseConfig, ServerConfig, SessionConfig,
        TelemetryConfig,
    };
    use hr_desk::web::SESSION_HEADER;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn repo_path(relative: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..").join(relative)
    }

    struct TestApp {
        router: Router,
        state: AppState,
        _dir: TempDir,
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "warn".to_string(),
            },
            database: DatabaseConfig {
                path: dir.path().join("hr.sqlite3"),
                scripts_dir: repo_path("sql"),
                debug: false,
            },
            cache: CacheConfig {
                enabled: true,
                ttl: Duration::from_secs(60),
            },
            session: SessionConfig {
                idle_timeout: Duration::from_secs(600),
            },
            access_policy_path: repo_path("config/access.json"),
            catalog_path: repo_path("config/catalog.json"),
        };
        initialize_database(&config.database, Some(&repo_path("sql/seed.sql")))
            .expect("database initializes");

        let components = Components::assemble(&config).expect("components assemble");
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let router = app_router(&components).layer(Extension(state.clone()));
        TestApp {
            router,
            state,
            _dir: dir,
        }
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn post(uri: &str, token: Option<&str>, payload: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(SESSION_HEADER, token);
        }
        builder
            .body(Body::from(payload.to_string()))
            .expect("request builds")
    }

    fn get_with(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header(SESSION_HEADER, token)
            .body(Body::empty())
            .expect("request builds")
    }

    async fn login(app: &TestApp, login: &str) -> String {
        let response = app
            .router
            .clone()
            .oneshot(post(
                "/auth/login",
                None,
                json!({ "login": login, "password": login }),
            ))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await["token"]
            .as_str()
            .expect("token present")
            .to_string()
    }

    #[tokio::test]
    async fn health_and_readiness_report_status() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);

        app.state
            .readiness
            .store(false, std::sync::atomic::Ordering::Relaxed);
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(read_json(response).await["status"], "initializing");
    }

    #[tokio::test]
    async fn recruiter_schedules_interviews_against_sqlite() {
        let app = test_app();
        let token = login(&app, "recruiter").await;

        let menu = read_json(
            app.router
                .clone()
                .oneshot(get_with("/api/v1/menu", &token))
                .await
                .expect("route executes"),
        )
        .await;
        assert_eq!(menu["sections"], json!(["interviews", "queries"]));

        for candidate in [3, 4] {
            let response = app
                .router
                .clone()
                .oneshot(post(
                    "/api/v1/interviews/basket/add",
                    Some(&token),
                    json!({ "vacancy_id": 2, "date": "2024-05-14", "interviewer_id": 2, "candidate_id": candidate }),
                ))
                .await
                .expect("route executes");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .router
            .clone()
            .oneshot(post(
                "/api/v1/interviews/confirm",
                Some(&token),
                json!({ "vacancy_id": 2, "date": "2024-05-14" }),
            ))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);
        let receipt = read_json(response).await;
        assert_eq!(receipt["created"], 2);
        assert_eq!(receipt["interviewer_id"], 2);

        let flashes = read_json(
            app.router
                .clone()
                .oneshot(get_with("/api/v1/session/flashes", &token))
                .await
                .expect("route executes"),
        )
        .await;
        assert_eq!(flashes[0]["level"], "success");
    }

    #[tokio::test]
    async fn recruiter_cannot_open_reports() {
        let app = test_app();
        let token = login(&app, "recruiter").await;

        let response = app
            .router
            .clone()
            .oneshot(get_with("/api/v1/reports", &token))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).map(|v| v.as_bytes()),
            Some("/api/v1/menu".as_bytes())
        );
    }

    #[tokio::test]
    async fn manager_builds_a_report_and_finds_it_in_history() {
        let app = test_app();
        let token = login(&app, "manager").await;
        let period = json!({ "report_id": "monthly_recruiting", "p_month": 4, "p_year": 2024 });

        let mut view = period.clone();
        view["action"] = json!("view");
        let response = app
            .router
            .clone()
            .oneshot(post("/api/v1/reports/run", Some(&token), view.clone()))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let mut create = period.clone();
        create["action"] = json!("create");
        let response = app
            .router
            .clone()
            .oneshot(post("/api/v1/reports/run", Some(&token), create))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let built = read_json(response).await;
        assert_eq!(built["built"], true);
        let log_id = built["log_id"].as_i64().expect("logged");

        let response = app
            .router
            .clone()
            .oneshot(get_with(&format!("/api/v1/reports/history/{log_id}"), &token))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let replay = read_json(response).await;
        assert_eq!(replay["rows"], built["rows"]);
    }

    #[tokio::test]
    async fn analyst_runs_a_catalog_query() {
        let app = test_app();
        let token = login(&app, "analyst").await;

        let response = app
            .router
            .clone()
            .oneshot(post(
                "/api/v1/queries/run",
                Some(&token),
                json!({ "query_id": "new_employees", "start_date": "2024-01-01", "end_date": "2024-12-31" }),
            ))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let result = read_json(response).await;
        assert_eq!(result["rows"].as_array().map(Vec::len), Some(2));
        assert_eq!(result["headers"][0], "employee_id");
    }
}
