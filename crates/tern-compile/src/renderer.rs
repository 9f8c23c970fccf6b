//! The rendering seam and the built-in relation renderer.
//!
//! Real templating lives outside this system; the scheduler only needs
//! `compile(node, manifest) -> compiled node`. The built-in renderer
//! resolves `{{ ref('...') }}` and `{{ source('...', '...') }}` placeholders
//! against the manifest and attaches ephemeral dependencies as CTEs.

use crate::error::{CompileError, CompileResult};
use crate::inline::{cte_name, inline_ephemeral_ctes};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tern_core::manifest::{Manifest, ManifestNode, SourceDefinition};
use tern_core::node::ResourceType;

/// Templating collaborator seam. Implementations must be pure: the compiled
/// node is returned, never written back in place.
pub trait Renderer: Send + Sync {
    /// Render a node's raw SQL into its executable form.
    fn compile(&self, node: &ManifestNode, manifest: &Manifest) -> CompileResult<ManifestNode>;
}

fn ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*ref\(\s*'(?P<name>[^']*)'\s*\)\s*\}\}").expect("ref regex is valid")
    })
}

fn source_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*source\(\s*'(?P<source>[^']*)'\s*,\s*'(?P<table>[^']*)'\s*\)\s*\}\}")
            .expect("source regex is valid")
    })
}

/// Renderer that substitutes relation names for ref/source placeholders.
#[derive(Debug, Default)]
pub struct RelationRenderer;

impl RelationRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Find the node a `ref('name')` points at: same package wins, then any
    /// other package with a refable node of that name.
    fn resolve_ref<'m>(
        &self,
        node: &ManifestNode,
        manifest: &'m Manifest,
        name: &str,
    ) -> Option<&'m ManifestNode> {
        let candidates = || {
            manifest
                .nodes
                .values()
                .filter(|n| n.name == name && ResourceType::refable().contains(&n.resource_type))
        };
        candidates()
            .find(|n| n.package_name == node.package_name)
            .or_else(|| candidates().next())
    }

    fn render_body(
        &self,
        node: &ManifestNode,
        manifest: &Manifest,
    ) -> CompileResult<(String, Vec<(String, String)>)> {
        let mut ctes: Vec<(String, String)> = Vec::new();

        let body = replace_all(ref_regex(), &node.raw_sql, |caps| {
            let name = &caps["name"];
            let target = self.resolve_ref(node, manifest, name).ok_or_else(|| {
                CompileError::UnresolvedRef {
                    node: node.unique_id.to_string(),
                    reference: name.to_string(),
                }
            })?;
            if target.is_ephemeral_model() {
                let alias = cte_name(&target.name);
                if !ctes.iter().any(|(existing, _)| *existing == alias) {
                    // ephemeral deps compile recursively; the DAG was
                    // validated acyclic before any rendering happens
                    let compiled = self.compile(target, manifest)?;
                    let sql = compiled.compiled_sql.unwrap_or_default();
                    ctes.push((alias.clone(), sql));
                }
                Ok(alias)
            } else {
                Ok(target.relation_name())
            }
        })?;

        let body = replace_all(source_regex(), &body, |caps| {
            let source = &caps["source"];
            let table = &caps["table"];
            let target = manifest
                .sources
                .values()
                .find(|s| s.source_name == source && s.name == table)
                .ok_or_else(|| CompileError::UnresolvedSource {
                    node: node.unique_id.to_string(),
                    source_name: source.to_string(),
                    table: table.to_string(),
                })?;
            Ok(source_relation_name(target))
        })?;

        Ok((body, ctes))
    }
}

impl Renderer for RelationRenderer {
    fn compile(&self, node: &ManifestNode, manifest: &Manifest) -> CompileResult<ManifestNode> {
        let (body, ctes) = self.render_body(node, manifest)?;
        let mut compiled = node.clone();
        compiled.compiled_sql = Some(inline_ephemeral_ctes(&body, &ctes));
        Ok(compiled)
    }
}

/// The relation a source table reads as (`database.schema.identifier`).
pub fn source_relation_name(source: &SourceDefinition) -> String {
    let identifier = source.identifier.as_deref().unwrap_or(&source.name);
    match (&source.database, &source.schema) {
        (Some(db), Some(schema)) => format!("{}.{}.{}", db, schema, identifier),
        (None, Some(schema)) => format!("{}.{}", schema, identifier),
        _ => identifier.to_string(),
    }
}

/// `Regex::replace_all` with a fallible replacement closure.
fn replace_all(
    re: &Regex,
    text: &str,
    mut replacement: impl FnMut(&Captures) -> CompileResult<String>,
) -> CompileResult<String> {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0 always exists");
        output.push_str(&text[last..whole.start()]);
        output.push_str(&replacement(&caps)?);
        last = whole.end();
    }
    output.push_str(&text[last..]);
    Ok(output)
}

#[cfg(test)]
#[path = "renderer_test.rs"]
mod tests;
