//! FlyWire annotation table client.

use super::http::{build_client, send};
use crate::error::{BuildError, BuildResult};
use crate::frame::{Frame, Row};
use reqwest::Client;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct AnnotationClient {
    url: String,
    token: Option<String>,
    client: Client,
}

impl AnnotationClient {
    pub fn new(url: &str, token: Option<String>) -> BuildResult<Self> {
        Ok(Self {
            url: url.to_string(),
            token,
            client: build_client()?,
        })
    }

    /// The live annotation table, one row per root ID.
    pub async fn fetch_annotations(&self) -> BuildResult<Frame> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = self.token.as_ref() {
            request = request.bearer_auth(token);
        }
        let resp = send(&self.url, request).await?;
        let body: Value = resp.json().await.map_err(|source| BuildError::Http {
            url: self.url.clone(),
            source,
        })?;
        parse_annotations(body)
    }
}

/// Accepts either a list of records or a `{"columns": [...], "data": [[...]]}`
/// table.
pub fn parse_annotations(body: Value) -> BuildResult<Frame> {
    match body {
        Value::Array(records) => records
            .into_iter()
            .map(|record| match record {
                Value::Object(row) => Ok(flatten(row)),
                other => Err(BuildError::decode(
                    "FlyWire annotations",
                    format!("expected object record, got {other}"),
                )),
            })
            .collect::<BuildResult<Vec<_>>>()
            .map(Frame::new),
        Value::Object(mut table) => {
            let columns: Vec<String> = match table.remove("columns") {
                Some(Value::Array(cols)) => cols
                    .into_iter()
                    .map(|c| c.as_str().map(str::to_string))
                    .collect::<Option<_>>()
                    .ok_or_else(|| {
                        BuildError::decode("FlyWire annotations", "non-string column name")
                    })?,
                _ => {
                    return Err(BuildError::decode(
                        "FlyWire annotations",
                        "table is missing its column list",
                    ));
                }
            };
            let Some(Value::Array(data)) = table.remove("data") else {
                return Err(BuildError::decode(
                    "FlyWire annotations",
                    "table is missing its data",
                ));
            };
            let mut rows = Vec::with_capacity(data.len());
            for record in data {
                let Value::Array(values) = record else {
                    return Err(BuildError::decode(
                        "FlyWire annotations",
                        "table rows must be arrays",
                    ));
                };
                let row: Row = columns.iter().cloned().zip(values).collect();
                rows.push(flatten(row));
            }
            Ok(Frame::new(rows))
        }
        other => Err(BuildError::decode(
            "FlyWire annotations",
            format!("unexpected payload {other}"),
        )),
    }
}

fn flatten(row: Row) -> Row {
    row.into_iter()
        .map(|(key, value)| match value {
            Value::Array(_) | Value::Object(_) => (key, Value::String(value.to_string())),
            value => (key, value),
        })
        .collect()
}
