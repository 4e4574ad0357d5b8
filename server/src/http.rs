use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use greennet_shared::{lua, OutboundMessage, RegisterResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;

use crate::config::WireFormat;
use crate::error::RelayError;
use crate::relay::Relay;

/// Shared app state passed to each HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub wire_format: WireFormat,
}

/// Form body of `/listen`.
///
/// Fields default to empty so a missing field is reported the same way as a
/// bad one. A body that is not form-encoded at all is rejected with the same
/// status, see `form_body`.
#[derive(Debug, Deserialize)]
pub struct SessionForm {
    #[serde(default)]
    pub user: String,
}

/// Form body of `/open` and `/transmit`: a token plus a JSON document.
#[derive(Debug, Deserialize)]
pub struct DataForm {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub data: String,
}

/// Build the relay router. `client_script`, when given, is served at `/`.
pub fn router(app_state: AppState, client_script: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/register", get(register))
        .route("/open", post(open))
        .route("/listen", post(listen))
        .route("/transmit", post(transmit));

    if let Some(path) = client_script {
        router = router.route_service("/", ServeFile::new(path));
    }

    router.layer(CorsLayer::permissive()).with_state(app_state)
}

fn form_body<T>(form: Result<Form<T>, FormRejection>) -> Result<T, RelayError> {
    form.map(|Form(body)| body)
        .map_err(|rejection| RelayError::InvalidInput(rejection.body_text()))
}

/// Encode a response body in the configured wire format.
fn encode<T: Serialize>(format: WireFormat, value: &T) -> Result<Response, RelayError> {
    match format {
        WireFormat::Lua => {
            let body = lua::to_string(value).map_err(|e| RelayError::Encode(e.to_string()))?;
            Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
        }
        WireFormat::Json => Ok(Json(value).into_response()),
    }
}

fn decode_data<T: DeserializeOwned>(raw: &str) -> Result<T, RelayError> {
    serde_json::from_str(raw).map_err(|e| RelayError::InvalidInput(e.to_string()))
}

async fn register(State(app_state): State<AppState>) -> Result<Response, RelayError> {
    let token = app_state.relay.register()?;
    encode(app_state.wire_format, &RegisterResponse { user: token.into() })
}

async fn open(
    State(app_state): State<AppState>,
    form: Result<Form<DataForm>, FormRejection>,
) -> Result<&'static str, RelayError> {
    let form = form_body(form)?;
    app_state.relay.registry().lookup(&form.user)?;
    let channels: Vec<u16> = decode_data(&form.data)?;
    app_state.relay.open(&form.user, &channels)?;
    Ok("ok")
}

async fn listen(
    State(app_state): State<AppState>,
    form: Result<Form<SessionForm>, FormRejection>,
) -> Result<Response, RelayError> {
    let form = form_body(form)?;
    let messages = app_state.relay.listen(&form.user).await?;
    encode(app_state.wire_format, &messages)
}

async fn transmit(
    State(app_state): State<AppState>,
    form: Result<Form<DataForm>, FormRejection>,
) -> Result<&'static str, RelayError> {
    let form = form_body(form)?;
    app_state.relay.registry().lookup(&form.user)?;
    // Decode the whole batch before anything is delivered.
    let messages: Vec<OutboundMessage> = decode_data(&form.data)?;
    app_state.relay.transmit(&form.user, &messages)?;
    Ok("ok")
}
