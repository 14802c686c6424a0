//! GraphQL client for the Stash HTTP API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;

use super::records::{Performer, Scene, Tag};
use super::StashGateway;
use crate::filter::Predicate;
use crate::types::{Error, Result, StashConfig};

const USER_AGENT: &str = concat!("stash-mcp/", env!("CARGO_PKG_VERSION"));

const PERFORMER_FIELDS: &str = "id name alias_list country details ethnicity eye_color hair_color \
     height_cm measurements piercings tattoos weight favorite scene_count tags { id name }";

const SCENE_FIELDS: &str =
    "id title details rating100 organized performers { id name } tags { id name }";

const TAG_FIELDS: &str = "id name aliases scene_count";

/// Stash GraphQL gateway over `reqwest`.
#[derive(Debug, Clone)]
pub struct GraphqlGateway {
    http: reqwest::Client,
    endpoint: String,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct VersionData {
    version: VersionInfo,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PerformersData {
    #[serde(rename = "findPerformers")]
    page: PerformerPage,
}

#[derive(Debug, Deserialize)]
struct PerformerPage {
    performers: Vec<Performer>,
}

#[derive(Debug, Deserialize)]
struct ScenesData {
    #[serde(rename = "findScenes")]
    page: ScenePage,
}

#[derive(Debug, Deserialize)]
struct ScenePage {
    scenes: Vec<Scene>,
}

#[derive(Debug, Deserialize)]
struct TagsData {
    #[serde(rename = "findTags")]
    page: TagPage,
}

#[derive(Debug, Deserialize)]
struct TagPage {
    tags: Vec<Tag>,
}

impl GraphqlGateway {
    pub fn new(config: &StashConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))?;
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            url: format!("{endpoint}/graphql"),
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &str,
        variables: Value,
    ) -> Result<T> {
        let started = Instant::now();
        let response = self
            .http
            .post(&self.url)
            .header("ApiKey", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(operation, status, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::remote(format!("{operation}: malformed response: {e}")))?;
        tracing::debug!(
            operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stash query complete"
        );
        unwrap_envelope(operation, envelope)
    }

    async fn performers_where(&self, predicate: Value) -> Result<Vec<Performer>> {
        let query = format!(
            "query FindPerformers($performer_filter: PerformerFilterType, $filter: FindFilterType) {{ \
             findPerformers(performer_filter: $performer_filter, filter: $filter) {{ performers {{ {PERFORMER_FIELDS} }} }} }}"
        );
        let data: PerformersData = self
            .query("findPerformers", &query, json!({ "performer_filter": predicate, "filter": all_pages("name") }))
            .await?;
        Ok(data.page.performers)
    }

    async fn tags_where(&self, predicate: Value) -> Result<Vec<Tag>> {
        let query = format!(
            "query FindTags($tag_filter: TagFilterType, $filter: FindFilterType) {{ \
             findTags(tag_filter: $tag_filter, filter: $filter) {{ tags {{ {TAG_FIELDS} }} }} }}"
        );
        let data: TagsData = self
            .query("findTags", &query, json!({ "tag_filter": predicate, "filter": all_pages("name") }))
            .await?;
        Ok(data.page.tags)
    }
}

#[async_trait]
impl StashGateway for GraphqlGateway {
    async fn version(&self) -> Result<String> {
        let data: VersionData = self
            .query("version", "query Version { version { version } }", json!({}))
            .await?;
        Ok(data.version.version.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn find_performer(&self, name: &str) -> Result<Option<Performer>> {
        let exact = self.performers_where(name_criterion("name", name)).await?;
        if let Some(found) = exact.into_iter().find(|p| p.answers_to(name)) {
            return Ok(Some(found));
        }
        let by_alias = self.performers_where(name_criterion("aliases", name)).await?;
        Ok(by_alias.into_iter().find(|p| p.answers_to(name)))
    }

    async fn find_performers(&self, predicate: &Predicate) -> Result<Vec<Performer>> {
        let performers = self.performers_where(predicate.as_json()).await?;
        tracing::debug!(count = performers.len(), "performers fetched");
        Ok(performers)
    }

    async fn find_scenes(&self, predicate: &Predicate) -> Result<Vec<Scene>> {
        let query = format!(
            "query FindScenes($scene_filter: SceneFilterType, $filter: FindFilterType) {{ \
             findScenes(scene_filter: $scene_filter, filter: $filter) {{ scenes {{ {SCENE_FIELDS} }} }} }}"
        );
        let data: ScenesData = self
            .query(
                "findScenes",
                &query,
                json!({ "scene_filter": predicate.as_json(), "filter": all_pages("title") }),
            )
            .await?;
        tracing::debug!(count = data.page.scenes.len(), "scenes fetched");
        Ok(data.page.scenes)
    }

    async fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        let exact = self.tags_where(name_criterion("name", name)).await?;
        if let Some(found) = exact.into_iter().find(|t| t.answers_to(name)) {
            return Ok(Some(found));
        }
        let by_alias = self.tags_where(name_criterion("aliases", name)).await?;
        Ok(by_alias.into_iter().find(|t| t.answers_to(name)))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

fn all_pages(sort: &str) -> Value {
    json!({ "per_page": -1, "sort": sort, "direction": "ASC" })
}

fn name_criterion(key: &str, name: &str) -> Value {
    let modifier = if key == "name" { "EQUALS" } else { "INCLUDES" };
    json!({ key: { "value": name.trim(), "modifier": modifier } })
}

fn transport_error(operation: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::connectivity(format!("{operation}: request timed out"))
    } else {
        Error::connectivity(format!("{operation}: {err}"))
    }
}

fn status_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let detail = body.trim().chars().take(200).collect::<String>();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::connectivity(format!(
            "{operation}: authentication rejected (HTTP {})",
            status.as_u16()
        )),
        s if s.is_server_error() => {
            Error::connectivity(format!("{operation}: HTTP {} {detail}", s.as_u16()))
        }
        s => Error::remote(format!("{operation}: HTTP {} {detail}", s.as_u16())),
    }
}

fn unwrap_envelope<T>(operation: &str, envelope: Envelope<T>) -> Result<T> {
    if !envelope.errors.is_empty() {
        let messages: Vec<&str> = envelope.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(Error::remote(format!("{operation}: {}", messages.join("; "))));
    }
    envelope
        .data
        .ok_or_else(|| Error::remote(format!("{operation}: response carried no data")))
}
