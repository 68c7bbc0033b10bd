use super::Dataset;
use crate::connectivity::{Connectivity, TypeEdge};
use crate::error::BuildResult;
use crate::render::Renderer;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Heaviest partners kept per direction.
pub const TOP_N: usize = 5;
pub const GRAPH_TEMPLATE: &str = "graph.html";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    /// The type the graph is about.
    pub focus: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

pub fn graph_data(edges: &[TypeEdge], focus: &str) -> GraphData {
    let names: BTreeSet<&str> = edges
        .iter()
        .flat_map(|e| [e.pre_type.as_str(), e.post_type.as_str()])
        .collect();
    GraphData {
        nodes: names
            .into_iter()
            .map(|name| GraphNode {
                id: name.to_string(),
                focus: name == focus,
            })
            .collect(),
        links: edges
            .iter()
            .map(|e| GraphLink {
                source: e.pre_type.clone(),
                target: e.post_type.clone(),
                weight: e.weight,
            })
            .collect(),
    }
}

/// Write the force-directed graph of the top partners to `path`.
pub fn write_graph(
    renderer: &Renderer,
    connectivity: &Connectivity,
    type_name: &str,
    dataset: Dataset,
    path: &Path,
) -> BuildResult<()> {
    let data = graph_data(&connectivity.top(TOP_N), type_name);
    let graph_json = serde_json::to_string(&data)
        .map_err(|e| crate::error::BuildError::decode("graph data", e))?;
    let mut context = tera::Context::new();
    context.insert("title", &format!("{type_name} ({})", dataset.label()));
    context.insert("graph_json", &graph_json);
    context.insert("node_color", dataset.node_color());
    context.insert("width", &400);
    context.insert("height", &400);
    renderer.render_to_file(GRAPH_TEMPLATE, &context, path)
}
