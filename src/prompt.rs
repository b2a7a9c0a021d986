//! Instruction templating.
//!
//! Templates reference upstream outputs with `{key}` placeholders. Use `{{`
//! for a literal `{` and `}}` for a literal `}`. Only identifier-shaped
//! placeholders (`[A-Za-z_][A-Za-z0-9_]*`) are recognised, so JSON examples
//! inside a template don't need escaping unless they look like one.

use crate::context::NamedContext;
use crate::error::Result;
use crate::PipelineError;

/// A piece of a scanned template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// Literal text, with `{{` / `}}` already collapsed.
    Text(&'a str),
    /// An identifier-shaped `{key}`.
    Placeholder(&'a str),
}

/// Split a template into literal text and placeholders in one left-to-right
/// pass.
fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        if pos > 0 {
            out.push(Segment::Text(&rest[..pos]));
        }
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push(Segment::Text(&tail[..1]));
            rest = &tail[2..];
        } else if let Some(key) = placeholder_at(tail) {
            out.push(Segment::Placeholder(key));
            rest = &tail[key.len() + 2..];
        } else {
            out.push(Segment::Text(&tail[..1]));
            rest = &tail[1..];
        }
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    out
}

/// The key of a `{key}` at the start of `tail`, if there is one.
fn placeholder_at(tail: &str) -> Option<&str> {
    let body = tail.strip_prefix('{')?;
    let key = &body[..body.find('}')?];
    is_identifier(key).then_some(key)
}

/// List the placeholders a template references, in order of first use.
///
/// ```
/// use leftover_chef::prompt::placeholders;
///
/// let keys = placeholders("Use {leftover_list} and {recipe}, not {{this}}.");
/// assert_eq!(keys, vec!["leftover_list", "recipe"]);
/// ```
pub fn placeholders(template: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for segment in segments(template) {
        if let Segment::Placeholder(key) = segment {
            if !found.iter().any(|k| k == key) {
                found.push(key.to_string());
            }
        }
    }
    found
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render an instruction for `stage`, substituting each declared input.
///
/// Every key in `inputs` must be present in `context`; a missing one is a
/// [`PipelineError::MissingInput`] attributed to the stage. Substituted
/// values are inserted as-is and never scanned for placeholders themselves.
/// Placeholders that are not declared inputs stay verbatim.
pub fn render(
    stage: &str,
    template: &str,
    inputs: &[String],
    context: &NamedContext,
) -> Result<String> {
    if let Some(key) = inputs.iter().find(|key| !context.contains(key)) {
        return Err(PipelineError::MissingInput {
            stage: stage.to_string(),
            key: key.clone(),
        });
    }

    let mut rendered = String::with_capacity(template.len());
    for segment in segments(template) {
        match segment {
            Segment::Text(text) => rendered.push_str(text),
            Segment::Placeholder(key) => match context.get(key) {
                Some(value) if inputs.iter().any(|k| k == key) => {
                    rendered.push_str(&value.as_prompt_text())
                }
                _ => {
                    rendered.push('{');
                    rendered.push_str(key);
                    rendered.push('}');
                }
            },
        }
    }
    Ok(rendered)
}
