//! Request dispatch for the Stash MCP server.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

use super::metrics::CallMetrics;
use super::prompts::PromptCatalog;
use super::protocol::{JsonRpcError, McpRequest, McpResponse, ToolResult, PROTOCOL_VERSION};
use super::resources::{self, RESOURCES, TEMPLATES};
use super::tools::{self, ToolCatalog};
use super::transport::McpHandler;
use crate::analysis::{AnalysisEngine, AnalysisOptions, ProfileSummary};
use crate::filter::{compile_performer_filters, compile_scene_filters};
use crate::types::{Error, Result};

pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP server over the analysis engine and its catalogue.
#[derive(Debug)]
pub struct StashServer {
    engine: Arc<AnalysisEngine>,
    tools: ToolCatalog,
    prompts: PromptCatalog,
    metrics: Mutex<CallMetrics>,
    started: Instant,
}

impl StashServer {
    pub fn new(engine: Arc<AnalysisEngine>) -> Result<Self> {
        let tools = tools::stash_tools(engine.config())?;
        Ok(Self {
            engine,
            tools,
            prompts: PromptCatalog::new(),
            metrics: Mutex::new(CallMetrics::default()),
            started: Instant::now(),
        })
    }

    pub fn tools(&self) -> &ToolCatalog {
        &self.tools
    }

    /// Dispatch one request. Notifications yield `None`.
    pub async fn handle(&self, request: McpRequest) -> Option<McpResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification");
            return None;
        }
        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize(&request)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool_request(&request).await,
            "prompts/list" => Ok(json!({ "prompts": self.prompts.list() })),
            "prompts/get" => self.get_prompt(&request),
            "resources/list" => Ok(json!({ "resources": RESOURCES })),
            "resources/templates/list" => Ok(json!({ "resourceTemplates": TEMPLATES })),
            "resources/read" => self.read_resource(&request).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };
        Some(match outcome {
            Ok(result) => McpResponse::success(id, result),
            Err(error) => McpResponse::error(id, error),
        })
    }

    fn initialize(&self, request: &McpRequest) -> Value {
        let protocol = request.param_str("protocolVersion").unwrap_or(PROTOCOL_VERSION);
        if let Some(client) = request
            .params
            .as_ref()
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
        {
            tracing::info!(client, protocol, "client initialized");
        }
        json!({
            "protocolVersion": protocol,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            },
            "capabilities": {
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
            },
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self.tools.list_entries().iter().map(|t| t.to_listing()).collect();
        json!({ "tools": tools })
    }

    async fn call_tool_request(&self, request: &McpRequest) -> std::result::Result<Value, JsonRpcError> {
        let name = request
            .param_str("name")
            .ok_or_else(|| JsonRpcError::invalid_params("tools/call requires a tool name"))?;
        let arguments = request
            .params
            .as_ref()
            .and_then(|p| p.get("arguments"))
            .cloned()
            .filter(|a| !a.is_null())
            .unwrap_or_else(|| json!({}));
        Ok(self.call_tool(name, arguments).await?.into_value())
    }

    /// Validate arguments and run a tool.
    ///
    /// Unknown tools and arguments that do not match the schema are protocol
    /// errors; anything that goes wrong while running is a tool result with
    /// `isError` set.
    pub async fn call_tool(&self, name: &str, mut arguments: Value) -> std::result::Result<ToolResult, JsonRpcError> {
        if !self.tools.has_tool(name) {
            return Err(JsonRpcError::invalid_params(format!("Unknown tool: {name}")));
        }
        let problems = self
            .tools
            .validate_params(name, &arguments)
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        if !problems.is_empty() {
            tracing::debug!(tool = name, ?problems, "arguments rejected");
            return Err(JsonRpcError::invalid_params(format!("Invalid arguments for {name}"))
                .with_data(json!({ "errors": problems })));
        }
        self.tools
            .fill_defaults(name, &mut arguments)
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;
        let args = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let started = Instant::now();
        let outcome = self.run_tool(name, &args).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let error_kind = outcome.as_ref().err().map(Error::kind);
        self.metrics.lock().record(name, elapsed_ms, error_kind);

        match outcome {
            Ok(record) => {
                tracing::info!(tool = name, elapsed_ms, is_error = false, "tool call");
                Ok(ToolResult::success(record))
            }
            Err(err) => {
                tracing::warn!(tool = name, elapsed_ms, is_error = true, kind = err.kind(), error = %err, "tool call");
                Ok(ToolResult::failure(&err))
            }
        }
    }

    async fn run_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        let catalog = self.engine.catalog();
        match name {
            tools::GET_PERFORMER_INFO => {
                let performer_name = str_arg(args, "performer_name")?;
                let performer = catalog
                    .performer(performer_name)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("performer '{}'", performer_name.trim())))?;
                Ok(serde_json::to_value(ProfileSummary::from(performer.as_ref()))?)
            }
            tools::GET_ALL_PERFORMERS => {
                let filters =
                    compile_performer_filters(args, self.engine.config().favorites_only_default)?;
                let performers = catalog.performers(&filters).await?;
                let listed: Vec<ProfileSummary> = performers.iter().map(ProfileSummary::from).collect();
                Ok(json!({
                    "count": listed.len(),
                    "filters": filters.describe(),
                    "performers": listed,
                }))
            }
            tools::GET_ALL_SCENES => {
                let query = compile_scene_filters(args)?;
                let scenes = catalog.scenes(&query).await?;
                Ok(json!({
                    "count": scenes.len(),
                    "filters": query.filters().describe(),
                    "tags": query.tags(),
                    "scenes": scenes.as_slice(),
                }))
            }
            tools::GET_ALL_SCENES_FROM_PERFORMER => {
                let performer_name = str_arg(args, "performer_name")?;
                let organized_only = bool_arg(args, "organized_only")?;
                let scenes = catalog.performer_scenes(performer_name, organized_only).await?;
                Ok(json!({
                    "performer_name": performer_name.trim(),
                    "organized_only": organized_only,
                    "count": scenes.len(),
                    "scenes": scenes.as_slice(),
                }))
            }
            tools::HEALTH_CHECK => Ok(self.health_check().await),
            tools::CLEAR_CACHE => {
                let cleared = catalog.clear_cache();
                Ok(json!({ "cleared": cleared, "cache": catalog.cache_stats() }))
            }
            tools::ADVANCED_PERFORMER_ANALYSIS => {
                let performer_name = str_arg(args, "performer_name")?;
                let options = AnalysisOptions {
                    include_similar: bool_arg(args, "include_similar")?,
                    deep_scene_analysis: bool_arg(args, "deep_scene_analysis")?,
                };
                let report = self
                    .engine
                    .analyze_performer(performer_name, options)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("performer '{}'", performer_name.trim())))?;
                Ok(serde_json::to_value(report)?)
            }
            tools::BATCH_PERFORMER_INSIGHTS => {
                let names: Vec<String> = args
                    .get("performer_names")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let max = count_arg(args, "max_performers")?;
                Ok(serde_json::to_value(self.engine.batch_insights(&names, max).await)?)
            }
            tools::LIBRARY_STATISTICS => Ok(serde_json::to_value(self.engine.library_statistics().await?)?),
            tools::RECOMMEND_PERFORMERS => {
                let preferences = str_arg(args, "preferences")?;
                let limit = count_arg(args, "limit")?;
                Ok(serde_json::to_value(self.engine.recommend(preferences, limit).await?)?)
            }
            other => Err(Error::internal(format!("no dispatch for tool '{other}'"))),
        }
    }

    /// Connectivity, cache and per-tool call statistics. Never fails.
    async fn health_check(&self) -> Value {
        let catalog = self.engine.catalog();
        let (connected, version, error) = match catalog.ping().await {
            Ok(version) => (true, Some(version), None),
            Err(err) => {
                tracing::warn!(error = %err, "health check probe failed");
                (false, None, Some(err.to_string()))
            }
        };
        json!({
            "connected": connected,
            "endpoint": catalog.endpoint(),
            "stash_version": version,
            "error": error,
            "cache": catalog.cache_stats(),
            "tools": self.metrics.lock().report(),
            "uptime_seconds": self.started.elapsed().as_secs(),
        })
    }

    fn get_prompt(&self, request: &McpRequest) -> std::result::Result<Value, JsonRpcError> {
        let name = request
            .param_str("name")
            .ok_or_else(|| JsonRpcError::invalid_params("prompts/get requires a prompt name"))?;
        let args = request
            .params
            .as_ref()
            .and_then(|p| p.get("arguments"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        self.prompts.render(name, &args).map_err(|e| rpc_error(&e))
    }

    async fn read_resource(&self, request: &McpRequest) -> std::result::Result<Value, JsonRpcError> {
        let uri = request
            .param_str("uri")
            .ok_or_else(|| JsonRpcError::invalid_params("resources/read requires a uri"))?;
        resources::read(&self.engine, uri).await.map_err(|e| {
            tracing::warn!(uri, error = %e, "resource read failed");
            rpc_error(&e)
        })
    }
}

#[async_trait]
impl McpHandler for StashServer {
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        self.handle(request).await
    }
}

/// Protocol error for failures outside `tools/call`.
fn rpc_error(err: &Error) -> JsonRpcError {
    let data = json!({ "kind": err.kind(), "retryable": err.is_retryable() });
    match err.kind() {
        "validation" | "not_found" => JsonRpcError::invalid_params(err.to_string()).with_data(data),
        _ => JsonRpcError::internal_error(err.to_string()).with_data(data),
    }
}

// Arguments below have already been checked against the tool schema and had
// defaults filled in.

fn str_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation(format!("missing string argument '{name}'")))
}

fn bool_arg(args: &Map<String, Value>, name: &str) -> Result<bool> {
    args.get(name)
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::validation(format!("missing boolean argument '{name}'")))
}

/// Positive count argument.
fn count_arg(args: &Map<String, Value>, name: &str) -> Result<usize> {
    match args.get(name).and_then(Value::as_i64) {
        Some(n) if n > 0 => Ok(n as usize),
        Some(n) => Err(Error::validation(format!("'{name}' must be positive, got {n}"))),
        None => Err(Error::validation(format!("missing integer argument '{name}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{engine, performer, scene, FakeGateway};
    use pretty_assertions::assert_eq;

    fn server(gateway: FakeGateway) -> (StashServer, Arc<FakeGateway>) {
        let (engine, gateway) = engine(gateway);
        (StashServer::new(Arc::new(engine)).unwrap(), gateway)
    }

    fn library() -> FakeGateway {
        FakeGateway {
            performers: vec![
                performer("1", "Ava", json!({"favorite": true, "country": "USA", "height_cm": 170})),
                performer("2", "Mia", json!({"favorite": true, "country": "Brazil"})),
                performer("3", "Kim", json!({"favorite": false, "country": "USA"})),
            ],
            scenes: vec![
                scene("10", Some(95), true, "Ava", &["Outdoor"]),
                scene("11", None, false, "Ava", &["Indoor"]),
            ],
            ..FakeGateway::default()
        }
    }

    async fn call(server: &StashServer, name: &str, args: Value) -> McpResponse {
        server
            .handle(McpRequest::new("tools/call").with_id(1).with_params(json!({
                "name": name,
                "arguments": args,
            })))
            .await
            .unwrap()
    }

    fn structured(response: &McpResponse) -> &Value {
        &response.result.as_ref().unwrap()["structuredContent"]
    }

    #[tokio::test]
    async fn test_initialize_echoes_protocol_version() {
        let (server, _) = server(library());
        let response = server
            .handle(McpRequest::new("initialize").with_id(0).with_params(json!({
                "protocolVersion": "2025-03-26",
                "clientInfo": {"name": "test", "version": "1"},
            })))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["resources"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let (server, _) = server(library());
        assert!(server.handle(McpRequest::new("notifications/initialized")).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (server, _) = server(library());
        let response = server.handle(McpRequest::new("tools/run").with_id(3)).await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_list_has_schemas() {
        let (server, _) = server(library());
        let response = server.handle(McpRequest::new("tools/list").with_id(1)).await.unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 10);
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments_are_invalid_params() {
        let (server, gateway) = server(library());
        let response = call(&server, "drop_everything", json!({})).await;
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_PARAMS);

        let response = call(&server, tools::GET_ALL_PERFORMERS, json!({"hair_length": "long"})).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert_eq!(error.data.unwrap()["errors"], json!(["Unknown parameter: hair_length"]));
        assert_eq!(gateway.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filter_errors_are_tool_errors() {
        let (server, gateway) = server(library());
        let response = call(
            &server,
            tools::GET_ALL_PERFORMERS,
            json!({"height_cm": 160, "height_cm_modifier": "BETWEEN"}),
        )
        .await;
        let result = response.result.as_ref().unwrap();
        assert_eq!(result["isError"], true);
        let error = &structured(&response)["error"];
        assert_eq!(error["kind"], "validation");
        assert_eq!(error["code"], "MissingOperandError");
        assert_eq!(error["field"], "height_cm");
        assert_eq!(gateway.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_modifier_not_applicable_reaches_compiler() {
        let (server, gateway) = server(library());
        let response = call(
            &server,
            tools::GET_ALL_PERFORMERS,
            json!({"country": "USA", "country_modifier": "GREATER_THAN"}),
        )
        .await;
        assert!(response.error.is_none());
        assert_eq!(response.result.as_ref().unwrap()["isError"], true);
        let error = &structured(&response)["error"];
        assert_eq!(error["kind"], "validation");
        assert_eq!(error["code"], "InvalidModifierError");
        assert_eq!(error["field"], "country");
        assert_eq!(gateway.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_value_reaches_compiler() {
        let (server, gateway) = server(library());
        let response = call(&server, tools::GET_ALL_PERFORMERS, json!({"height_cm": "tall"})).await;
        assert!(response.error.is_none());
        let error = &structured(&response)["error"];
        assert_eq!(error["code"], "InvalidValueError");
        assert_eq!(error["field"], "height_cm");

        let response = call(&server, tools::GET_ALL_PERFORMERS, json!({"height_cm": "170"})).await;
        assert_eq!(response.result.as_ref().unwrap()["isError"], false);
        assert_eq!(structured(&response)["filters"], "favorites, height_cm EQUALS 170");
        assert_eq!(gateway.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_all_performers_defaults_to_favorites_and_caches() {
        let (server, gateway) = server(library());
        let first = call(&server, tools::GET_ALL_PERFORMERS, json!({"country": "USA"})).await;
        call(&server, tools::GET_ALL_PERFORMERS, json!({"country": "USA", "favorites_only": true})).await;

        let record = structured(&first);
        assert_eq!(record["count"], 1);
        assert_eq!(record["performers"][0]["name"], "Ava");
        assert_eq!(gateway.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_performer_info_not_found() {
        let (server, _) = server(library());
        let found = call(&server, tools::GET_PERFORMER_INFO, json!({"performer_name": "mia"})).await;
        assert_eq!(structured(&found)["country"], "Brazil");

        let missing = call(&server, tools::GET_PERFORMER_INFO, json!({"performer_name": "Nobody"})).await;
        assert_eq!(missing.result.as_ref().unwrap()["isError"], true);
        assert_eq!(structured(&missing)["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_performer_scenes_default_organized() {
        let (server, _) = server(library());
        let response = call(
            &server,
            tools::GET_ALL_SCENES_FROM_PERFORMER,
            json!({"performer_name": "Ava"}),
        )
        .await;
        let record = structured(&response);
        assert_eq!(record["organized_only"], true);
        assert_eq!(record["count"], 1);
        assert_eq!(record["scenes"][0]["id"], "10");
    }

    #[tokio::test]
    async fn test_connectivity_failure_is_retryable_tool_error() {
        let (server, _) = server(FakeGateway {
            fail_listings: true,
            ..library()
        });
        let response = call(&server, tools::LIBRARY_STATISTICS, json!({})).await;
        let error = &structured(&response)["error"];
        assert_eq!(error["kind"], "connectivity");
        assert_eq!(error["retryable"], true);
        assert_eq!(error["stage"], "favorite_performers");
    }

    #[tokio::test]
    async fn test_health_check_reports_cache_and_calls() {
        let (server, _) = server(library());
        call(&server, tools::GET_PERFORMER_INFO, json!({"performer_name": "Ava"})).await;
        call(&server, tools::GET_PERFORMER_INFO, json!({"performer_name": "ava"})).await;

        let response = call(&server, tools::HEALTH_CHECK, json!({})).await;
        let record = structured(&response);
        assert_eq!(record["connected"], true);
        assert_eq!(record["stash_version"], "fake");
        assert_eq!(record["cache"]["entries"], 1);
        assert_eq!(record["cache"]["hits"], 1);
        assert_eq!(record["cache"]["resident"], 1);
        assert_eq!(record["tools"][0]["tool"], tools::GET_PERFORMER_INFO);
        assert_eq!(record["tools"][0]["total_calls"], 2);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let (server, gateway) = server(library());
        call(&server, tools::GET_PERFORMER_INFO, json!({"performer_name": "Ava"})).await;
        let cleared = call(&server, tools::CLEAR_CACHE, json!({})).await;
        assert_eq!(structured(&cleared)["cleared"], 1);
        call(&server, tools::GET_PERFORMER_INFO, json!({"performer_name": "Ava"})).await;
        assert_eq!(gateway.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_and_recommend_defaults() {
        let (server, _) = server(library());
        let batch = call(
            &server,
            tools::BATCH_PERFORMER_INSIGHTS,
            json!({"performer_names": ["Ava", "Nobody"]}),
        )
        .await;
        let record = structured(&batch);
        assert_eq!(record["max_performers"], 10);
        assert_eq!(record["summary"]["analyzed"], 1);
        assert_eq!(record["summary"]["not_found"], 1);

        let zero = call(
            &server,
            tools::RECOMMEND_PERFORMERS,
            json!({"preferences": "brazil", "limit": 0}),
        )
        .await;
        assert_eq!(structured(&zero)["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_prompts_and_resources() {
        let (server, _) = server(library());
        let prompt = server
            .handle(McpRequest::new("prompts/get").with_id(1).with_params(json!({
                "name": "analyze-performer",
                "arguments": {"performer_name": "Ava"},
            })))
            .await
            .unwrap();
        assert!(prompt.is_success());

        let missing = server
            .handle(McpRequest::new("prompts/get").with_id(2).with_params(json!({"name": "analyze-performer"})))
            .await
            .unwrap();
        assert_eq!(missing.error.unwrap().code, JsonRpcError::INVALID_PARAMS);

        let templates = server
            .handle(McpRequest::new("resources/templates/list").with_id(3))
            .await
            .unwrap();
        assert_eq!(templates.result.unwrap()["resourceTemplates"].as_array().unwrap().len(), 3);

        let read = server
            .handle(McpRequest::new("resources/read").with_id(4).with_params(json!({"uri": "stash://performers/stats"})))
            .await
            .unwrap();
        assert!(read.is_success());

        let unknown = server
            .handle(McpRequest::new("resources/read").with_id(5).with_params(json!({"uri": "stash://nothing"})))
            .await
            .unwrap();
        let error = unknown.error.unwrap();
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert_eq!(error.data.unwrap()["kind"], "not_found");
    }
}
