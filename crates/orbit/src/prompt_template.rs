use serde::Serialize;
use std::fs;
use std::path::Path;
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::Tool;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const REASONING_TEMPLATE: &str = include_str!("prompts/reasoning.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl AsRef<Path>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_content = fs::read_to_string(template_file.as_ref())
        .map_err(|e| TeraError::chain("Failed to read template file", e))?;
    load_prompt(&template_content, context_data)
}

#[derive(Serialize)]
struct SystemContext<'a> {
    date: String,
    tools: &'a [Tool],
}

#[derive(Serialize)]
struct ReasoningContext<'a> {
    date: String,
    tasks: &'a [String],
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Render the generation system prompt, from `template_file` when given
pub fn system_prompt(
    template_file: Option<&Path>,
    tools: &[Tool],
) -> Result<String, TeraError> {
    let context = SystemContext {
        date: today(),
        tools,
    };
    match template_file {
        Some(path) => load_prompt_file(path, &context),
        None => load_prompt(SYSTEM_TEMPLATE, &context),
    }
}

pub fn reasoning_prompt(tasks: &[String]) -> Result<String, TeraError> {
    load_prompt(
        REASONING_TEMPLATE,
        &ReasoningContext {
            date: today(),
            tasks,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_prompt() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        context.insert("age".to_string(), 30.to_string());

        let result = load_prompt(template, &context).unwrap();
        assert_eq!(result, "Hello, Alice! You are 30 years old.");
    }

    #[test]
    fn test_load_prompt_missing_variable() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());

        assert!(load_prompt(template, &context).is_err());
    }

    #[test]
    fn test_system_prompt_lists_tools() {
        let tools = vec![Tool::new(
            "web_search",
            "Search the web",
            json!({"type": "object"}),
        )];
        let prompt = system_prompt(None, &tools).unwrap();
        assert!(prompt.contains("**web_search**: Search the web"));

        let prompt = system_prompt(None, &[]).unwrap();
        assert!(prompt.contains("No tools are available"));
    }

    #[test]
    fn test_system_prompt_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{% for tool in tools %}}{{{{ tool.name }}}};{{% endfor %}}").unwrap();

        let tools = vec![
            Tool::new("a", "", json!({})),
            Tool::new("b", "", json!({})),
        ];
        let prompt = system_prompt(Some(file.path()), &tools).unwrap();
        assert_eq!(prompt, "a;b;");
    }

    #[test]
    fn test_reasoning_prompt_numbers_tasks() {
        let prompt =
            reasoning_prompt(&["find sources".to_string(), "compare".to_string()]).unwrap();
        assert!(prompt.contains("1. find sources"));
        assert!(prompt.contains("2. compare"));
    }
}
