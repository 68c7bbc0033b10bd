//! Deep links into the neuPrint web UI.

use reqwest::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeuprintLinks {
    server: String,
    dataset: String,
}

impl NeuprintLinks {
    pub fn new(server: &str, dataset: &str) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            dataset: dataset.to_string(),
        }
    }

    fn results_url(&self, params: &[(&str, &str)]) -> Option<String> {
        Url::parse_with_params(&format!("{}/results", self.server), params)
            .ok()
            .map(String::from)
    }

    /// "Find neurons" query for a type name.
    pub fn search_url(&self, neuron_name: &str) -> Option<String> {
        let ds = self.dataset.as_str();
        self.results_url(&[
            ("dataset", ds),
            ("qt", "findneurons"),
            ("q", "1"),
            ("tab", "0"),
            ("qr[0][code]", "fn"),
            ("qr[0][ds]", ds),
            ("qr[0][pm][dataset]", ds),
            ("qr[0][pm][all_segments]", "false"),
            ("qr[0][pm][enable_contains]", "true"),
            ("qr[0][visProps][rowsPerPage]", "50"),
            ("qr[0][pm][neuron_name]", neuron_name),
        ])
    }

    /// "Simple connections" query listing partners of a type.
    pub fn connectivity_url(&self, neuron_name: &str) -> Option<String> {
        let ds = self.dataset.as_str();
        self.results_url(&[
            ("dataset", ds),
            ("qt", "simpleconnection"),
            ("q", "1"),
            ("tab", "0"),
            ("qr[0][code]", "sc"),
            ("qr[0][ds]", ds),
            ("qr[0][pm][dataset]", ds),
            ("qr[0][pm][find_inputs]", "false"),
            ("qr[0][pm][enable_contains]", "true"),
            ("qr[0][pm][neuron_name]", neuron_name),
        ])
    }
}
