//! Sample plugin exercising every hook
//!
//! - `GET /hello/{name}` public route
//! - `/restapi/hello` generic REST object type (`GET`, `GET visits`, `POST {name}`)
//! - `("user", "created")` trigger counting welcomed users
//! - message handler replying with the configured greeting

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use axum::Json;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use serde_json::{Map, Value, json};

use crate::db::{ColumnType, Model, ModelAttribute, ModelDefinition};
use crate::plugins::{
    Capabilities, ConfDescription, CoreModule, DataType, Plugin, PluginConfig, PluginInitResponse,
    PluginMessage, PublicHandler, RestApiRequest, RestResponse, RouteParams, SessionType,
    StaticFolder, Trigger,
};
use crate::status::Status;

#[derive(Clone)]
struct HelloState {
    core: CoreModule,
    greeting: String,
    visits: Model,
}

/// Greets people
#[derive(Default)]
pub struct HelloPlugin {
    state: RwLock<Option<HelloState>>,
}

impl HelloPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Option<HelloState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: Option<HelloState>) -> Option<HelloState> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, state)
    }
}

fn visits_model() -> ModelDefinition {
    ModelDefinition::new()
        .attribute(ModelAttribute::new("name", ColumnType::Text).primary_key())
        .attribute(ModelAttribute::new("count", ColumnType::Integer).not_null())
}

/// Bump the visit counter for `name`, returning the new count
fn record_visit(visits: &Model, name: &str) -> crate::Result<i64> {
    let key = Value::String(name.to_string());
    let count = visits
        .find(&key)?
        .and_then(|r| r.get("count").and_then(Value::as_i64))
        .unwrap_or(0)
        + 1;
    let mut record = Map::new();
    record.insert("name".to_string(), key);
    record.insert("count".to_string(), Value::from(count));
    visits.upsert(&record)?;
    Ok(count)
}

#[async_trait]
impl Plugin for HelloPlugin {
    fn name(&self) -> &str {
        "hello"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn conf_descriptions(&self) -> Vec<ConfDescription> {
        vec![
            ConfDescription::new("greeting", "Greeting", DataType::String).default_value("Hello"),
            ConfDescription::new("apiKey", "Upstream API key", DataType::String).secret(),
            ConfDescription::new("staticDir", "Static asset folder", DataType::String)
                .default_value(""),
        ]
    }

    fn init(&self, core: CoreModule, config: &PluginConfig) -> anyhow::Result<PluginInitResponse> {
        let greeting = config.get_str("greeting").unwrap_or("Hello").to_string();
        let visits = core.plugins().define_db_model("visits", visits_model())?;

        let route_greeting = greeting.clone();
        let trigger_core = core.clone();
        let mut response = PluginInitResponse::new()
            .handler(PublicHandler::new(
                Method::GET,
                "/hello/{name}",
                move |req: Request| {
                    let greeting = route_greeting.clone();
                    async move {
                        let name = req
                            .extensions()
                            .get::<RouteParams>()
                            .and_then(|p| p.get("name"))
                            .unwrap_or("world")
                            .to_string();
                        Json(json!({ "message": format!("{greeting}, {name}!") })).into_response()
                    }
                },
            ))
            .trigger(Trigger::new("user", "created", move |params: Vec<Value>| {
                let core = trigger_core.clone();
                async move {
                    let total = core.send_command("INCR", &["hello:welcomed"]).await?;
                    Ok(json!({
                        "welcomed": params.first().cloned().unwrap_or(Value::Null),
                        "total": total.as_integer(),
                    }))
                }
            }))
            .session_type(SessionType::new("hello", "Greeting session"));

        if let Some(dir) = config.get_str("staticDir").filter(|d| !d.is_empty()) {
            response = response.static_folder(StaticFolder::new(dir, "/hello/static"));
        }

        core.logger().info(&format!("ready, greeting \"{greeting}\""));
        self.set_state(Some(HelloState {
            core,
            greeting,
            visits,
        }));
        Ok(response)
    }

    fn deinit(&self) -> anyhow::Result<()> {
        if let Some(state) = self.set_state(None) {
            state.core.logger().info("stopped");
        }
        Ok(())
    }

    async fn handle_message(&self, message: PluginMessage) -> anyhow::Result<Value> {
        let state = self
            .snapshot()
            .ok_or_else(|| anyhow::anyhow!("hello plugin is not initialized"))?;
        Ok(json!({
            "reply": format!("{}, {}!", state.greeting, message.from),
            "echo": message.body,
        }))
    }

    async fn handle_rest_api_request(
        &self,
        request: &RestApiRequest,
        response: &mut RestResponse,
    ) -> anyhow::Result<bool> {
        if request.object_type != "hello" {
            return Ok(false);
        }
        let Some(state) = self.snapshot() else {
            return Ok(false);
        };

        if request.method == Method::GET && request.arg1.is_empty() {
            response.json(&json!({ "status": Status::Ok.code(), "message": state.greeting }))?;
        } else if request.method == Method::GET && request.arg1 == "visits" {
            let visits = state.visits.clone();
            let count = tokio::task::spawn_blocking(move || visits.count()).await??;
            response.json(&json!({ "status": Status::Ok.code(), "visits": count }))?;
        } else if request.method == Method::POST && !request.arg1.is_empty() {
            if request.admin_login.is_none() {
                response.set_status(StatusCode::UNAUTHORIZED);
                response.send_status(Status::ExpiredLoginToken, "login required");
                return Ok(true);
            }
            let visits = state.visits.clone();
            let name = request.arg1.clone();
            let count = tokio::task::spawn_blocking(move || record_visit(&visits, &name)).await??;
            response.json(&json!({
                "status": Status::Ok.code(),
                "message": format!("{}, {}!", state.greeting, request.arg1),
                "visits": count,
            }))?;
        } else {
            response.send_status(Status::InvalidResource, "unsupported hello operation");
        }
        Ok(true)
    }
}
