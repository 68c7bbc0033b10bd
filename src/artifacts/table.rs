use super::Dataset;
use crate::connectivity::{Connectivity, TypeEdge};
use crate::error::BuildResult;
use crate::render::Renderer;
use serde::Serialize;
use std::path::Path;

pub const TABLE_TEMPLATE: &str = "connections_table.html";

/// One partner row of the connection table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartnerRow {
    pub direction: &'static str,
    pub partner: String,
    pub weight: u64,
    /// Share of all synapses in this direction, in percent.
    pub percent: f64,
}

fn rows_for(edges: &[TypeEdge], direction: &'static str, partner_of: fn(&TypeEdge) -> &str) -> Vec<PartnerRow> {
    let total: u64 = edges.iter().map(|e| e.weight).sum();
    edges
        .iter()
        .map(|e| PartnerRow {
            direction,
            partner: partner_of(e).to_string(),
            weight: e.weight,
            percent: if total == 0 {
                0.0
            } else {
                (e.weight as f64 * 1000.0 / total as f64).round() / 10.0
            },
        })
        .collect()
}

pub fn partner_rows(connectivity: &Connectivity) -> Vec<PartnerRow> {
    let mut rows = rows_for(&connectivity.upstream, "upstream", |e| e.pre_type.as_str());
    rows.extend(rows_for(&connectivity.downstream, "downstream", |e| e.post_type.as_str()));
    rows
}

pub fn write_table(
    renderer: &Renderer,
    connectivity: &Connectivity,
    type_name: &str,
    dataset: Dataset,
    path: &Path,
) -> BuildResult<()> {
    let mut context = tera::Context::new();
    context.insert("title", &format!("{type_name} ({})", dataset.label()));
    context.insert("type_name", type_name);
    context.insert("dataset", dataset.label());
    context.insert("rows", &partner_rows(connectivity));
    renderer.render_to_file(TABLE_TEMPLATE, &context, path)
}
