//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::Method;
use axum::response::IntoResponse;
use serde_json::{Map, Value, json};
use tenant_host::plugins::{
    Capabilities, ConfDescription, CoreModule, HostServices, Plugin, PluginConfig,
    PluginInitResponse, PluginMessage, PluginRegistry, PublicHandler, RestApiRequest,
    RestResponse, RouteParams, SessionType, StaticFolder, Trigger,
};

/// Registry with fully in-memory services
#[must_use]
pub fn registry() -> PluginRegistry {
    PluginRegistry::new(HostServices::in_memory().expect("failed to init services"))
}

/// Registry whose message timeout is `timeout`
#[must_use]
pub fn registry_with_timeout(timeout: Duration) -> PluginRegistry {
    PluginRegistry::new(
        HostServices::in_memory()
            .expect("failed to init services")
            .message_timeout(timeout),
    )
}

/// JSON object literal as a config map
#[must_use]
pub fn config(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[derive(Debug, Clone, Copy)]
pub enum RestBehavior {
    Claim,
    Decline,
    Fail,
    Panic,
    CommitThenFail,
    /// Relay the request to the `forward_to` plugin and return its reply
    Forward,
}

#[derive(Debug, Clone, Copy)]
pub enum InitFault {
    Error,
    Panic,
}

#[derive(Debug, Clone)]
pub enum TriggerBehavior {
    Reply(Value),
    Fail,
    Panic,
    /// Message the named plugin with the trigger params
    Forward(String),
}

/// Configurable plugin used across integration tests
pub struct MockPlugin {
    name: String,
    rest: Vec<(String, RestBehavior)>,
    init_fault: Option<InitFault>,
    routes: Vec<(Method, String)>,
    mounts: Vec<StaticFolder>,
    triggers: Vec<(String, String, TriggerBehavior)>,
    session_types: Vec<SessionType>,
    conf: Vec<ConfDescription>,
    message_delay: Option<Duration>,
    forward_to: Option<String>,
    core: Mutex<Option<CoreModule>>,
    pub rest_calls: Arc<AtomicUsize>,
    pub messages: Arc<AtomicUsize>,
    pub deinits: Arc<AtomicUsize>,
}

impl MockPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rest: Vec::new(),
            init_fault: None,
            routes: Vec::new(),
            mounts: Vec::new(),
            triggers: Vec::new(),
            session_types: Vec::new(),
            conf: Vec::new(),
            message_delay: None,
            forward_to: None,
            core: Mutex::new(None),
            rest_calls: Arc::new(AtomicUsize::new(0)),
            messages: Arc::new(AtomicUsize::new(0)),
            deinits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn object_type(mut self, object_type: &str, behavior: RestBehavior) -> Self {
        self.rest.push((object_type.to_string(), behavior));
        self
    }

    pub const fn init_fault(mut self, fault: InitFault) -> Self {
        self.init_fault = Some(fault);
        self
    }

    pub fn route(mut self, method: Method, path: &str) -> Self {
        self.routes.push((method, path.to_string()));
        self
    }

    pub fn mount(mut self, folder: impl Into<std::path::PathBuf>, path: &str) -> Self {
        self.mounts.push(StaticFolder::new(folder, path));
        self
    }

    pub fn trigger(mut self, object_type: &str, action: &str, behavior: TriggerBehavior) -> Self {
        self.triggers
            .push((object_type.to_string(), action.to_string(), behavior));
        self
    }

    pub fn session_type(mut self, name: &str) -> Self {
        self.session_types.push(SessionType::new(name, ""));
        self
    }

    pub fn conf(mut self, desc: ConfDescription) -> Self {
        self.conf.push(desc);
        self
    }

    pub const fn message_delay(mut self, delay: Duration) -> Self {
        self.message_delay = Some(delay);
        self
    }

    pub fn forward_to(mut self, target: &str) -> Self {
        self.forward_to = Some(target.to_string());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn conf_descriptions(&self) -> Vec<ConfDescription> {
        self.conf.clone()
    }

    fn init(&self, core: CoreModule, _config: &PluginConfig) -> anyhow::Result<PluginInitResponse> {
        match self.init_fault {
            Some(InitFault::Error) => anyhow::bail!("cannot reach upstream"),
            Some(InitFault::Panic) => panic!("init exploded"),
            None => {}
        }

        let mut response = PluginInitResponse::new();
        for (method, path) in &self.routes {
            let owner = self.name.clone();
            response = response.handler(PublicHandler::new(
                method.clone(),
                path.as_str(),
                move |req: Request| {
                    let owner = owner.clone();
                    async move {
                        let id = req
                            .extensions()
                            .get::<RouteParams>()
                            .and_then(|p| p.get("id"))
                            .unwrap_or("")
                            .to_string();
                        if id == "panic" {
                            panic!("route handler exploded");
                        }
                        format!("{owner}:{id}").into_response()
                    }
                },
            ));
        }
        for mount in &self.mounts {
            response = response.static_folder(mount.clone());
        }
        for (object_type, action, behavior) in &self.triggers {
            let behavior = behavior.clone();
            let core = core.clone();
            response = response.trigger(Trigger::new(
                object_type.as_str(),
                action.as_str(),
                move |params: Vec<Value>| {
                    let behavior = behavior.clone();
                    let core = core.clone();
                    async move {
                        match behavior {
                            TriggerBehavior::Reply(value) => Ok(json!({"value": value, "params": params})),
                            TriggerBehavior::Fail => anyhow::bail!("trigger failed"),
                            TriggerBehavior::Panic => panic!("trigger exploded"),
                            TriggerBehavior::Forward(target) => {
                                let reply = core
                                    .plugins()
                                    .send_message_to_plugin(&target, json!({"params": params}))
                                    .await?;
                                Ok(json!({"forwarded": reply}))
                            }
                        }
                    }
                },
            ));
        }
        for session_type in &self.session_types {
            response = response.session_type(session_type.clone());
        }

        *self.core.lock().unwrap() = Some(core);
        Ok(response)
    }

    fn deinit(&self) -> anyhow::Result<()> {
        self.deinits.fetch_add(1, Ordering::SeqCst);
        *self.core.lock().unwrap() = None;
        Ok(())
    }

    async fn handle_message(&self, message: PluginMessage) -> anyhow::Result<Value> {
        self.messages.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.message_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(target) = &self.forward_to {
            let core = self.core.lock().unwrap().clone();
            let core = core.ok_or_else(|| anyhow::anyhow!("not initialized"))?;
            let reply = core
                .plugins()
                .send_message_to_plugin(target, message.body)
                .await?;
            return Ok(json!({"forwarded": reply}));
        }
        Ok(json!({"from": message.from, "to": self.name, "body": message.body}))
    }

    async fn handle_rest_api_request(
        &self,
        request: &RestApiRequest,
        response: &mut RestResponse,
    ) -> anyhow::Result<bool> {
        self.rest_calls.fetch_add(1, Ordering::SeqCst);
        let Some((_, behavior)) = self.rest.iter().find(|(t, _)| *t == request.object_type) else {
            return Ok(false);
        };
        match behavior {
            RestBehavior::Claim => {
                let email = request
                    .admin_login
                    .as_ref()
                    .map(|l| l.params().email.clone());
                response.json(&json!({
                    "plugin": self.name,
                    "objectType": request.object_type,
                    "arg1": request.arg1,
                    "method": request.method.as_str(),
                    "login": email,
                }))?;
                Ok(true)
            }
            RestBehavior::Decline => Ok(false),
            RestBehavior::Fail => anyhow::bail!("handler failed"),
            RestBehavior::Panic => panic!("handler exploded"),
            RestBehavior::CommitThenFail => {
                response.send("partial");
                anyhow::bail!("failed after writing")
            }
            RestBehavior::Forward => {
                let target = self
                    .forward_to
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("no forward target"))?;
                let core = self.core.lock().unwrap().clone();
                let core = core.ok_or_else(|| anyhow::anyhow!("not initialized"))?;
                let reply = core
                    .plugins()
                    .send_message_to_plugin(&target, json!({"objectType": request.object_type}))
                    .await?;
                response.json(&json!({"plugin": self.name, "forwarded": reply}))?;
                Ok(true)
            }
        }
    }
}
