//! Prompt templates and the prompt-template server.
//!
//! Templates are plain text with `{name}` placeholders. Substitution is a
//! single left-to-right pass: inserted values are never re-scanned, so text
//! containing braces (search snippets often do) lands verbatim.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{
    GetPromptResult, PromptArgument, PromptCapabilities, PromptDefinition, PromptMessage,
    ServerCapabilities, ServerInfo,
};
use crate::server::McpHandler;

/// Name of the research summary template.
pub const RESEARCH_PROMPT: &str = "researchPrompt";

const RESEARCH_PROMPT_TEXT: &str = "You are a research assistant.
The user asked: {query}

Using the search results below, write a concise summary of the most relevant information.

Search Results:
{search_results}

Summary:";

/// A named prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,
    pub text: String,
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            text: text.into(),
        }
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        scan(&self.text, |segment| {
            if let Segment::Placeholder(name) = segment {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            Ok(())
        })
        .ok();
        names
    }

    /// Substitute every placeholder. A placeholder without a value is an error.
    pub fn fill(&self, args: &HashMap<String, String>) -> Result<String> {
        substitute(&self.text, args, true)
    }

    /// Substitute the placeholders that have values and leave the rest intact.
    pub fn render(&self, args: &HashMap<String, String>) -> String {
        // Lenient substitution never fails.
        substitute(&self.text, args, false).unwrap_or_else(|_| self.text.clone())
    }

    fn definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self
                .placeholders()
                .into_iter()
                .map(|name| PromptArgument {
                    name,
                    required: true,
                })
                .collect(),
        }
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split template text into literal runs and placeholders.
fn scan<'a>(text: &'a str, mut visit: impl FnMut(Segment<'a>) -> Result<()>) -> Result<()> {
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        visit(Segment::Literal(&rest[..start]))?;
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if is_placeholder_name(&after[..end]) => {
                visit(Segment::Placeholder(&after[..end]))?;
                rest = &after[end + 1..];
            }
            _ => {
                visit(Segment::Literal("{"))?;
                rest = after;
            }
        }
    }
    visit(Segment::Literal(rest))
}

fn substitute(text: &str, args: &HashMap<String, String>, strict: bool) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    scan(text, |segment| {
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Placeholder(name) => match args.get(name) {
                Some(value) => out.push_str(value),
                None if strict => {
                    return Err(Error::InvalidParams(format!(
                        "missing prompt argument: {}",
                        name
                    )))
                }
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            },
        }
        Ok(())
    })?;
    Ok(out)
}

/// Fixed set of prompt templates.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    /// Library holding the built-in templates.
    pub fn builtin() -> Self {
        let mut library = Self::default();
        library.insert(PromptTemplate::new(
            RESEARCH_PROMPT,
            "Summarize web and paper search results for a research query.",
            RESEARCH_PROMPT_TEXT,
        ));
        library
    }

    pub fn insert(&mut self, template: PromptTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Result<PromptTemplate> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("prompt template: {}", name)))
    }

    /// All templates, sorted by name.
    pub fn list(&self) -> Vec<&PromptTemplate> {
        let mut all: Vec<_> = self.templates.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// Prompt-template server role.
pub struct PromptServer {
    library: PromptLibrary,
}

impl PromptServer {
    pub fn new(library: PromptLibrary) -> Self {
        Self { library }
    }
}

impl Default for PromptServer {
    fn default() -> Self {
        Self::new(PromptLibrary::builtin())
    }
}

#[derive(Debug, Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: HashMap<String, String>,
}

#[async_trait::async_trait]
impl McpHandler for PromptServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo::named("research-prompt-server")
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            prompts: Some(PromptCapabilities { list_changed: false }),
            ..Default::default()
        }
    }

    fn methods(&self) -> &'static [&'static str] {
        &["prompts/list", "prompts/get"]
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "prompts/list" => {
                let prompts: Vec<_> = self.library.list().iter().map(|t| t.definition()).collect();
                Ok(json!({ "prompts": prompts }))
            }
            "prompts/get" => {
                let params: GetPromptParams = serde_json::from_value(params)
                    .map_err(|e| Error::InvalidParams(e.to_string()))?;
                let template = self.library.get(&params.name)?;

                debug!(prompt = %template.name, "Serving prompt template");

                let result = GetPromptResult {
                    description: template.description.clone(),
                    template: template.text.clone(),
                    messages: vec![PromptMessage::user(template.render(&params.arguments))],
                };
                Ok(serde_json::to_value(result)?)
            }
            other => Err(Error::Protocol(format!("unsupported method: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_builtin_placeholders() {
        let template = PromptLibrary::builtin().get(RESEARCH_PROMPT).unwrap();
        assert_eq!(template.placeholders(), vec!["query", "search_results"]);
    }

    #[test]
    fn test_unknown_template_is_not_found() {
        let err = PromptLibrary::builtin().get("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_fill_keeps_snippets_in_order() {
        let template = PromptLibrary::builtin().get(RESEARCH_PROMPT).unwrap();
        let snippets = ["first {query} hit", "second", "third }{ odd"];
        let joined = snippets.join("\n\n");
        let filled = template
            .fill(&args(&[
                ("query", "weather in Paris"),
                ("search_results", joined.as_str()),
            ]))
            .unwrap();

        let positions: Vec<usize> = snippets
            .iter()
            .map(|s| filled.find(s).expect("snippet dropped"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        // The literal "{query}" inside a snippet is not substituted again.
        assert!(filled.contains("first {query} hit"));
    }

    #[test]
    fn test_fill_requires_every_argument() {
        let template = PromptTemplate::new("t", "", "a {x} b {y}");
        let err = template.fill(&args(&[("x", "1")])).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[test]
    fn test_render_leaves_missing_placeholders() {
        let template = PromptTemplate::new("t", "", "a {x} b {y} {not a name} {");
        assert_eq!(
            template.render(&args(&[("x", "1")])),
            "a 1 b {y} {not a name} {"
        );
    }

    #[tokio::test]
    async fn test_prompts_get_returns_raw_template() {
        let server = PromptServer::default();
        let value = server
            .handle("prompts/get", json!({"name": RESEARCH_PROMPT}))
            .await
            .unwrap();
        let result: GetPromptResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.template, RESEARCH_PROMPT_TEXT);
        assert_eq!(result.messages[0].content.as_text(), RESEARCH_PROMPT_TEXT);
    }

    #[tokio::test]
    async fn test_prompts_get_with_arguments() {
        let server = PromptServer::default();
        let value = server
            .handle(
                "prompts/get",
                json!({"name": RESEARCH_PROMPT, "arguments": {"query": "rust"}}),
            )
            .await
            .unwrap();
        let text = value["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("The user asked: rust"));
        assert!(text.contains("{search_results}"));
    }

    #[tokio::test]
    async fn test_prompts_list() {
        let server = PromptServer::default();
        let value = server.handle("prompts/list", json!({})).await.unwrap();
        assert_eq!(value["prompts"][0]["name"], RESEARCH_PROMPT);
        assert_eq!(value["prompts"][0]["arguments"][1]["name"], "search_results");
    }
}
