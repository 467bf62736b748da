// sentinel-core/src/template.rs
// Placeholder substitution for rule explanations and recommendations
//
// Syntax: `{ident}` is replaced, `{{` and `}}` are literal braces, anything
// else is copied verbatim. `ident` is ASCII alphanumerics and underscores.

use std::collections::HashMap;
use thiserror::Error;

/// A placeholder that had no value in the parameter map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing template parameter '{0}'")]
pub struct MissingPlaceholder(pub String);

/// Parameter lookup used by the renderer.
pub trait Params {
    fn get_param(&self, key: &str) -> Option<&str>;
}

impl Params for HashMap<String, String> {
    fn get_param(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl Params for [(&str, &str)] {
    fn get_param(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }
}

impl<const N: usize> Params for [(&str, &str); N] {
    fn get_param(&self, key: &str) -> Option<&str> {
        self.as_slice().get_param(key)
    }
}

/// Renders `template`, failing on the first unknown placeholder.
pub fn render_strict<P: Params + ?Sized>(template: &str, params: &P) -> Result<String, MissingPlaceholder> {
    let mut missing = None;
    let rendered = render_with(template, |key| match params.get_param(key) {
        Some(value) => Some(value),
        None => {
            missing.get_or_insert_with(|| key.to_string());
            None
        }
    });
    match missing {
        Some(key) => Err(MissingPlaceholder(key)),
        None => Ok(rendered),
    }
}

/// Renders `template`, leaving unknown placeholders as literal `{ident}` text.
pub fn render_lenient<P: Params + ?Sized>(template: &str, params: &P) -> String {
    render_with(template, |key| params.get_param(key))
}

fn render_with<'a, F>(template: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{') {
            if let Some(end) = placeholder_end(tail) {
                let key = &tail[1..end];
                match lookup(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
                continue;
            }
        }

        // lone brace
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Index of the closing brace if `text` starts with `{ident}`.
fn placeholder_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut idx = 1;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    if idx > 1 && idx < bytes.len() && bytes[idx] == b'}' {
        Some(idx)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_known_placeholders() {
        let params = [("name", "Telnet"), ("state", "Running")];
        assert_eq!(
            render_lenient("Service {name} is {state}.", &params),
            "Service Telnet is Running."
        );
    }

    #[test]
    fn test_lenient_keeps_unknown_placeholders() {
        let params = [("name", "Telnet")];
        assert_eq!(
            render_lenient("{name} at {path} ({unknown})", &params),
            "Telnet at {path} ({unknown})"
        );
    }

    #[test]
    fn test_strict_reports_first_missing() {
        let params = [("value", "Running")];
        let err = render_strict("{value} then {alternative} and {other}", &params).unwrap_err();
        assert_eq!(err, MissingPlaceholder("alternative".to_string()));
    }

    #[test]
    fn test_missing_placeholder_message() {
        let err: Box<dyn std::error::Error> = Box::new(MissingPlaceholder("days".to_string()));
        assert_eq!(err.to_string(), "missing template parameter 'days'");
    }

    #[test]
    fn test_escaped_and_stray_braces() {
        let params = [("x", "1")];
        assert_eq!(render_strict("{{x}} = {x}", &params).unwrap(), "{x} = 1");
        assert_eq!(render_lenient("a { b } {x:>3} }", &params), "a { b } {x:>3} }");
        assert_eq!(render_lenient("{", &params), "{");
        assert_eq!(render_lenient("{}", &params), "{}");
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let params = [("a", "{b}"), ("b", "nope")];
        assert_eq!(render_lenient("{a}", &params), "{b}");
    }

    #[test]
    fn test_non_ascii_text_survives() {
        let params = [("state", "⚠️ DISABLED")];
        assert_eq!(render_lenient("État: {state} ✓", &params), "État: ⚠️ DISABLED ✓");
    }
}
