// Contract Registry - Web Server
// REST API with Axum. Browser forms call /api/masks on every keystroke and
// /api/validate on submit; writes go through the registry service.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use contract_registry::{
    db, validate_cnpj, validate_cpf, validate_json, Config, Entity, Listing, MaskKind,
    PermissionPolicy, Record, RegistryError, RegistryKind, RegistryService,
    Session, SessionUser, VERSION,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    policy: Arc<PermissionPolicy>,
    /// Bearer token → session
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))
    }

    /// Session for the request's bearer token; logged-out when absent.
    fn session(&self, headers: &HeaderMap) -> Result<Session, AppError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(Session::new());
        };
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| AppError::internal("session lock poisoned"))?;
        Ok(sessions.get(token).cloned().unwrap_or_default())
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// ============================================================================
// Responses
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiErrorBody>,
}

#[derive(Serialize)]
struct ApiErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

#[derive(Serialize)]
struct FieldError {
    field: String,
    message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Registry errors mapped onto HTTP statuses
struct AppError(RegistryError);

impl AppError {
    fn internal(message: &str) -> Self {
        AppError(RegistryError::Store(anyhow::anyhow!(message.to_string())))
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RegistryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::Duplicate { .. } => StatusCode::CONFLICT,
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Forbidden { .. } => StatusCode::FORBIDDEN,
            RegistryError::Authentication | RegistryError::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
            RegistryError::Store(e) => {
                warn!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let fields = match &self.0 {
            RegistryError::Validation(errors) => errors
                .iter()
                .map(|e| FieldError {
                    field: e.field.clone(),
                    message: e.message.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                code: self.0.code(),
                message: self.0.to_string(),
                fields,
            }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn parse_kind(name: &str) -> Result<RegistryKind, AppError> {
    RegistryKind::parse(name).ok_or_else(|| {
        AppError(RegistryError::NotFound {
            kind: "registry".to_string(),
            id: name.to_string(),
        })
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(VERSION))
}

#[derive(Deserialize)]
struct LoginRequest {
    cpf: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: SessionUser,
}

/// POST /api/login - Exchange CPF + password for a bearer token
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let session = {
        let conn = state.conn()?;
        Session::login(&conn, &body.cpf, &body.password)?
    };
    let Some(user) = session.current_user().cloned() else {
        return Err(AppError(RegistryError::Authentication));
    };

    let token = uuid::Uuid::new_v4().to_string();
    state
        .sessions
        .lock()
        .map_err(|_| AppError::internal("session lock poisoned"))?
        .insert(token.clone(), session);

    Ok(Json(ApiResponse::ok(LoginResponse { token, user })))
}

/// POST /api/logout - Drop the caller's token
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<bool> {
    let removed = match bearer_token(&headers) {
        Some(token) => state
            .sessions
            .lock()
            .map_err(|_| AppError::internal("session lock poisoned"))?
            .remove(token)
            .is_some(),
        None => false,
    };
    Ok(Json(ApiResponse::ok(removed)))
}

/// GET /api/counts - Dashboard totals
async fn counts(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<BTreeMap<String, i64>> {
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);
    Ok(Json(ApiResponse::ok(registry.counts()?)))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    search: String,
}

/// GET /api/entities?search= - List entities
async fn list_entities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Entity>> {
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);
    Ok(Json(ApiResponse::ok(registry.search::<Entity>(&params.search)?)))
}

/// POST /api/entities - Create an entity
async fn create_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(entity): Json<Entity>,
) -> Result<(StatusCode, Json<ApiResponse<Entity>>), AppError> {
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);
    let saved = registry.create(entity)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(saved))))
}

/// PUT /api/entities/:id - Update an entity
async fn update_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(mut entity): Json<Entity>,
) -> ApiResult<Entity> {
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);
    entity.meta.id = id;
    Ok(Json(ApiResponse::ok(registry.update(entity)?)))
}

/// DELETE /api/entities/:id - Delete an entity
async fn delete_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);
    registry.delete(Entity::KIND, &id)?;
    Ok(Json(ApiResponse::ok(id)))
}

/// GET /api/registries/:kind - Display listing of any registry
async fn registry_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Listing> {
    let kind = parse_kind(&kind)?;
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);
    Ok(Json(ApiResponse::ok(registry.listing(kind, &params.search)?)))
}

/// GET /api/registries/:kind/search/:term - Listing filtered by a path term
/// (`Path` has already percent-decoded it)
async fn registry_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, term)): Path<(String, String)>,
) -> ApiResult<Listing> {
    let kind = parse_kind(&kind)?;
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);
    Ok(Json(ApiResponse::ok(registry.listing(kind, &term)?)))
}

/// GET /api/registries/:kind/print - CSV listing
async fn registry_print(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Response, AppError> {
    let kind = parse_kind(&kind)?;
    let session = state.session(&headers)?;
    let conn = state.conn()?;
    let registry = RegistryService::new(&conn, &session, &state.policy);

    let mut csv = Vec::new();
    registry.print_kind(kind, &mut csv, Some(&params.search))?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        csv,
    )
        .into_response())
}

#[derive(Deserialize)]
struct MaskParams {
    #[serde(default)]
    value: String,
}

/// GET /api/masks/:kind?value= - Apply an input mask
async fn apply_mask(Path(kind): Path<String>, Query(params): Query<MaskParams>) -> ApiResult<String> {
    let mask = MaskKind::parse(&kind).ok_or_else(|| {
        AppError(RegistryError::NotFound {
            kind: "mask".to_string(),
            id: kind.clone(),
        })
    })?;
    Ok(Json(ApiResponse::ok(mask.apply(&params.value))))
}

#[derive(Serialize)]
struct ValidationOutcome {
    valid: bool,
}

/// POST /api/validate/:kind - Check a CPF/CNPJ (`{"value": ...}`) or run a
/// registry form schema against a JSON record
async fn validate(
    Path(kind): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<ValidationOutcome> {
    let document =
        |check: fn(&str) -> bool| body.get("value").and_then(|v| v.as_str()).is_some_and(check);

    let valid = match kind.to_lowercase().as_str() {
        "cpf" => document(validate_cpf),
        "cnpj" => document(validate_cnpj),
        other => {
            validate_json(parse_kind(other)?, body.clone())?;
            true
        }
    };
    Ok(Json(ApiResponse::ok(ValidationOutcome { valid })))
}

// ============================================================================
// Main Server
// ============================================================================

fn setup_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/counts", get(counts))
        .route("/entities", get(list_entities).post(create_entity))
        .route("/entities/:id", put(update_entity).delete(delete_entity))
        .route("/registries/:kind", get(registry_listing))
        .route("/registries/:kind/search/:term", get(registry_search))
        .route("/registries/:kind/print", get(registry_print))
        .route("/masks/:kind", get(apply_mask))
        .route("/validate/:kind", post(validate))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "contract-registry.toml".to_string());
    let config = Config::load_or_default(std::path::Path::new(&config_path))?;

    let conn = db::open_database(&config.database_path)?;
    info!(path = %config.database_path.display(), "database opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        policy: Arc::new(config.policy.clone()),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(address = %config.server.bind_address, "registry server listening");

    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use contract_registry::{bootstrap_admin, BiddingModality, User};
    use tower::ServiceExt;

    const ADMIN_CPF: &str = "111.444.777-35";

    fn state_with_token() -> (AppState, String) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        bootstrap_admin(
            &conn,
            User::new("Administrador", ADMIN_CPF, "01/01/1980"),
            "segredo1",
            "segredo1",
        )
        .unwrap();

        let session = Session::login(&conn, ADMIN_CPF, "segredo1").unwrap();
        let policy = PermissionPolicy::new();
        let registry = RegistryService::new(&conn, &session, &policy);
        registry.create(BiddingModality::new("Cota 10%41 reservada", "")).unwrap();
        registry.create(BiddingModality::new("Cota 10A", "")).unwrap();

        let token = "test-token".to_string();
        let state = AppState {
            db: Arc::new(Mutex::new(conn)),
            policy: Arc::new(policy),
            sessions: Arc::new(Mutex::new(HashMap::from([(token.clone(), session)]))),
        };
        (state, token)
    }

    async fn get_json(state: AppState, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = app(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_search_term_decoded_once() {
        let (state, token) = state_with_token();
        let (status, body) =
            get_json(state, "/api/registries/modality/search/10%2541", Some(token.as_str())).await;

        assert_eq!(status, StatusCode::OK);
        let rows = body["data"]["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "Cota 10%41 reservada");
    }

    #[tokio::test]
    async fn test_listing_without_token_is_unauthorized() {
        let (state, _) = state_with_token();
        let (status, body) = get_json(state, "/api/registries/modality", None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "NOT_AUTHENTICATED");
    }
}
