//! Tera environment for pages and artifacts.

use crate::error::{BuildError, BuildResult};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// Refuse to write anything larger than this; a runaway loop in a template
/// should fail the page, not fill the disk.
pub const MAX_OUTPUT_SIZE: usize = 50 * 1024 * 1024;

pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Load every template under `dir`.
    pub fn from_directory(dir: &Path) -> BuildResult<Self> {
        let pattern = format!("{}/**/*", dir.display());
        let mut tera = Tera::new(&pattern).map_err(|source| BuildError::Template {
            name: pattern.clone(),
            source,
        })?;
        register_filters(&mut tera);
        debug!(templates = tera.get_template_names().count(), dir = %dir.display(), "loaded templates");
        Ok(Self { tera })
    }

    /// Build from in-memory templates.
    pub fn from_templates<'a>(templates: impl IntoIterator<Item = (&'a str, &'a str)>) -> BuildResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates).map_err(|source| BuildError::Template {
            name: "<raw>".to_string(),
            source,
        })?;
        register_filters(&mut tera);
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn render(&self, name: &str, context: &Context) -> BuildResult<String> {
        let output = self.tera.render(name, context).map_err(|source| BuildError::Template {
            name: name.to_string(),
            source,
        })?;
        if output.len() > MAX_OUTPUT_SIZE {
            return Err(BuildError::decode(
                format!("template {name}"),
                format!("output of {} bytes exceeds {MAX_OUTPUT_SIZE}", output.len()),
            ));
        }
        Ok(output)
    }

    pub fn render_to_file(&self, name: &str, context: &Context, path: &Path) -> BuildResult<()> {
        let output = self.render(name, context)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(path, output).map_err(|e| BuildError::io(path, e))
    }
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("thousands", thousands);
}

/// `1234567` → `1,234,567`; non-numbers pass through.
fn thousands(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let Some(n) = value.as_u64() else {
        return Ok(value.clone());
    };
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_raw_templates_to_disk() {
        let renderer = Renderer::from_templates([("hello.md", "# {{ name }} ({{ n | thousands }})")])
            .expect("renderer");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/hello.md");
        let mut context = Context::new();
        context.insert("name", "aSP-a");
        context.insert("n", &1234567u64);
        renderer.render_to_file("hello.md", &context, &path).expect("render");
        assert_eq!(fs::read_to_string(path).expect("read"), "# aSP-a (1,234,567)");
    }

    #[test]
    fn missing_template_is_a_template_error() {
        let renderer = Renderer::from_templates([("a.md", "x")]).expect("renderer");
        let err = renderer.render("b.md", &Context::new()).expect_err("missing");
        assert_eq!(err.category(), "template");
        assert!(renderer.has_template("a.md"));
    }

    #[test]
    fn thousands_leaves_strings_alone() {
        let out = thousands(&json!("N/A"), &HashMap::new()).expect("filter");
        assert_eq!(out, json!("N/A"));
        assert_eq!(thousands(&json!(999), &HashMap::new()).expect("filter"), json!("999"));
    }
}
