//! Minimal neuPrint client: custom Cypher queries over HTTP.

use super::http::{build_client, send};
use crate::error::{BuildError, BuildResult};
use crate::frame::{Frame, Row};
use crate::rois::RoiHierarchy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
pub struct CypherResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

/// Which side of the type's neurons to query partners for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Downstream,
    Upstream,
}

/// One weighted edge between two bodies, with their types when annotated.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjacency {
    pub pre: u64,
    pub post: u64,
    pub weight: u64,
    pub pre_type: Option<String>,
    pub post_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NeuprintClient {
    server: String,
    dataset: String,
    token: Option<String>,
    client: Client,
}

impl NeuprintClient {
    pub fn new(server: &str, dataset: &str, token: Option<String>) -> BuildResult<Self> {
        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            dataset: dataset.to_string(),
            token,
            client: build_client()?,
        })
    }

    pub async fn custom_query(&self, cypher: &str) -> BuildResult<CypherResult> {
        let url = format!("{}/api/custom/custom", self.server);
        let body = json!({ "cypher": cypher, "dataset": self.dataset });
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = self.token.as_ref() {
            request = request.bearer_auth(token);
        }
        let resp = send(&url, request).await?;
        resp.json().await.map_err(|source| BuildError::Http { url, source })
    }

    /// All neurons with the given status, one row per neuron.
    pub async fn fetch_neurons(&self, status: &str) -> BuildResult<Frame> {
        let cypher = format!(
            "MATCH (n :Neuron) WHERE n.status = {} RETURN n",
            cypher_string(status)
        );
        let result = self.custom_query(&cypher).await?;
        let mut rows = Vec::with_capacity(result.data.len());
        for record in result.data {
            match record.into_iter().next() {
                Some(Value::Object(props)) => rows.push(normalize_neuron(props)),
                Some(other) => {
                    return Err(BuildError::decode(
                        "neuPrint neuron",
                        format!("expected node properties, got {other}"),
                    ));
                }
                None => continue,
            }
        }
        Ok(Frame::new(rows))
    }

    pub async fn fetch_adjacencies(
        &self,
        body_ids: &[u64],
        direction: Direction,
    ) -> BuildResult<Vec<Adjacency>> {
        if body_ids.is_empty() {
            return Ok(Vec::new());
        }
        let anchor = match direction {
            Direction::Downstream => "a",
            Direction::Upstream => "b",
        };
        let cypher = format!(
            "MATCH (a :Neuron)-[w :ConnectsTo]->(b :Neuron) WHERE {anchor}.bodyId IN {} \
             RETURN a.bodyId, b.bodyId, w.weight, a.type, b.type",
            cypher_id_list(body_ids)
        );
        let result = self.custom_query(&cypher).await?;
        result.data.iter().map(|record| parse_adjacency(record)).collect()
    }

    pub async fn fetch_roi_hierarchy(&self) -> BuildResult<RoiHierarchy> {
        let result = self
            .custom_query("MATCH (m :Meta) RETURN m.roiHierarchy, m.primaryRois")
            .await?;
        let record = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BuildError::decode("ROI hierarchy", "no Meta node returned"))?;
        let mut fields = record.into_iter();
        let hierarchy = match fields.next() {
            Some(Value::String(raw)) => serde_json::from_str(&raw)
                .map_err(|e| BuildError::decode("ROI hierarchy", e))?,
            Some(value @ Value::Object(_)) => value,
            other => {
                return Err(BuildError::decode(
                    "ROI hierarchy",
                    format!("unexpected value {other:?}"),
                ));
            }
        };
        let primary: Vec<String> = match fields.next() {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        RoiHierarchy::from_tree(&hierarchy, &primary)
    }
}

fn cypher_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn cypher_id_list(ids: &[u64]) -> String {
    let joined = ids
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

fn parse_adjacency(record: &[Value]) -> BuildResult<Adjacency> {
    let id = |idx: usize| {
        record
            .get(idx)
            .and_then(Value::as_u64)
            .ok_or_else(|| BuildError::decode("neuPrint adjacency", format!("column {idx} is not an ID")))
    };
    let label = |idx: usize| {
        record
            .get(idx)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Ok(Adjacency {
        pre: id(0)?,
        post: id(1)?,
        weight: id(2)?,
        pre_type: label(3),
        post_type: label(4),
    })
}

/// Keep scalars, parse `roiInfo`, stringify everything else.
pub fn normalize_neuron(props: Row) -> Row {
    props
        .into_iter()
        .map(|(key, value)| {
            let value = match (key.as_str(), value) {
                ("roiInfo", Value::String(raw)) => {
                    serde_json::from_str(&raw).unwrap_or(Value::Null)
                }
                ("roiInfo", value @ Value::Object(_)) => value,
                (_, value @ (Value::Array(_) | Value::Object(_))) => {
                    Value::String(value.to_string())
                }
                (_, value) => value,
            };
            (key, value)
        })
        .collect()
}
