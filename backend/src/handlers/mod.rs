//! HTTP delivery layer. Handlers only unpack requests, attach a per-request
//! deadline and translate errors into responses.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthService, Claims, JwtSigner};
use crate::error::Error;
use crate::house::HouseService;
use crate::models::{
    ConfirmLoginRequest, CreateFlatRequest, CreateHouseRequest, EditFlatRequest, FlatView,
    HouseView, LoginAck, LoginRequest, RegisterRequest, RegisterResponse, Role, TokenResponse,
    UpdateFlatRequest,
};
use crate::moderation::FlatWorkflow;
use crate::store::Deadline;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub flats: Arc<FlatWorkflow>,
    pub houses: Arc<HouseService>,
    pub tokens: Arc<JwtSigner>,
    pub request_timeout: Duration,
}

impl AppState {
    fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }
}

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    if err.is_deadline() {
        return StatusCode::GATEWAY_TIMEOUT;
    }
    match err {
        Error::Validation(_) | Error::BadStatus(_) => StatusCode::BAD_REQUEST,
        Error::BadCredentials(_) | Error::BadCode(_) | Error::CodeExpired(_) | Error::Token(_) => {
            StatusCode::UNAUTHORIZED
        }
        Error::NotAuthorized(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidTransition { .. } | Error::CapacityExceeded { .. } => StatusCode::CONFLICT,
        Error::Store { .. } | Error::Delivery(_) | Error::Hash(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
            log::error!("request failed: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn authenticate(
    headers: HeaderMap,
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| Error::Token("missing Authorization header".into()))?;
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| Error::Token("invalid Authorization header format".into()))?;
    let claims = state.tokens.validate(token)?;
    log::info!("Authenticated user: {} ({})", claims.sub, claims.role);
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    let user_id = state.auth.register(&state.deadline(), &req).await?;
    Ok(Json(RegisterResponse { user_id }))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginAck> {
    Ok(Json(state.auth.start(&state.deadline(), req.id, &req.password).await?))
}

async fn confirm_login(
    State(state): State<AppState>,
    Json(req): Json<ConfirmLoginRequest>,
) -> ApiResult<TokenResponse> {
    let token = state.auth.finish(&state.deadline(), req.id, req.code).await?;
    Ok(Json(TokenResponse { token }))
}

#[derive(Deserialize)]
struct DummyLoginQuery {
    #[serde(default)]
    user_type: String,
}

async fn dummy_login(
    State(state): State<AppState>,
    Query(query): Query<DummyLoginQuery>,
) -> ApiResult<TokenResponse> {
    let token = state.auth.dummy_login(&state.deadline(), &query.user_type).await?;
    Ok(Json(TokenResponse { token }))
}

async fn create_house(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateHouseRequest>,
) -> ApiResult<HouseView> {
    if claims.role != Role::Moderator {
        return Err(Error::NotAuthorized("only moderators create houses".into()).into());
    }
    Ok(Json(state.houses.create_house(&state.deadline(), &req).await?))
}

async fn house_flats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<i64>,
) -> ApiResult<Vec<FlatView>> {
    Ok(Json(state.houses.list_flats(&state.deadline(), house_id, claims.role).await?))
}

async fn subscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.houses.subscribe(&state.deadline(), house_id, claims.sub).await?;
    Ok(StatusCode::OK)
}

async fn create_flat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateFlatRequest>,
) -> ApiResult<FlatView> {
    Ok(Json(state.flats.create(&state.deadline(), claims.sub, &req).await?))
}

async fn update_flat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateFlatRequest>,
) -> ApiResult<FlatView> {
    Ok(Json(state.flats.decide(&state.deadline(), claims.sub, &req).await?))
}

async fn edit_flat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditFlatRequest>,
) -> ApiResult<FlatView> {
    Ok(Json(state.flats.update_details(&state.deadline(), claims.sub, &req).await?))
}

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/house/create", post(create_house))
        .route("/house/:id", get(house_flats))
        .route("/house/:id/subscribe", post(subscribe))
        .route("/flat/create", post(create_flat))
        .route("/flat/update", post(update_flat))
        .route("/flat/edit", post(edit_flat))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/login/confirm", post(confirm_login))
        .route("/dummyLogin", get(dummy_login))
        .merge(protected_routes)
        .with_state(state)
}
