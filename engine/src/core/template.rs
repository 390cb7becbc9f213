//! Mustache-style placeholder expansion against resolved parameters.
//!
//! Only variable tags are recognized: `{{name}}`, `{{ name }}`, `{{{name}}}`
//! and `{{& name}}`. Values are inserted verbatim. Anything that is not a
//! variable tag passes through unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::types::ResolvedParameters;
use crate::error::{LabError, LabResult};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}\}|\{\{&?\s*([A-Za-z0-9_.-]+)\s*\}\}")
        .expect("placeholder regex is valid")
});

/// How unresolved placeholders are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Unknown placeholders render as the empty string.
    #[default]
    Permissive,
    /// Unknown placeholders are a configuration error.
    Strict,
}

/// Render `template`; unknown placeholders become empty.
pub fn render(template: &str, params: &ResolvedParameters) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            params
                .get(placeholder_name(caps))
                .map(|value| value.to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Render `template`, failing on the first placeholder with no value.
pub fn render_strict(template: &str, params: &ResolvedParameters) -> LabResult<String> {
    if let Some(name) = unresolved_placeholders(template, params).into_iter().next() {
        return Err(LabError::UnresolvedPlaceholder {
            name: name.to_string(),
        });
    }
    Ok(render(template, params))
}

/// Render under the given mode.
pub fn render_with(
    template: &str,
    params: &ResolvedParameters,
    mode: RenderMode,
) -> LabResult<String> {
    match mode {
        RenderMode::Permissive => Ok(render(template, params)),
        RenderMode::Strict => render_strict(template, params),
    }
}

/// Placeholder names in `template` that `params` cannot satisfy, in order of
/// first appearance.
pub fn unresolved_placeholders<'t>(template: &'t str, params: &ResolvedParameters) -> Vec<&'t str> {
    let mut missing: Vec<&str> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let name = placeholder_name(&caps);
        if !params.contains(name) && !missing.contains(&name) {
            missing.push(name);
        }
    }
    missing
}

fn placeholder_name<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ParamValue;

    fn params() -> ResolvedParameters {
        let mut params = ResolvedParameters::with_seed("feedface");
        params.insert("FLAG_ID".to_string(), ParamValue::Text("3fa1c09e".to_string()));
        params.insert("PORT".to_string(), ParamValue::Int(8081));
        params
    }

    #[test]
    fn substitutes_known_placeholders() {
        let rendered = render("OMNIHACK{{FLAG_ID}} on :{{ PORT }} ({{SEED}})", &params());
        assert_eq!(rendered, "OMNIHACK3fa1c09e on :8081 (feedface)");
        assert!(!rendered.contains("{{"));
        assert!(!rendered.contains("}}"));
    }

    #[test]
    fn unescaped_forms_render_the_same() {
        assert_eq!(render("{{{FLAG_ID}}}", &params()), "3fa1c09e");
        assert_eq!(render("{{& FLAG_ID}}", &params()), "3fa1c09e");
    }

    #[test]
    fn unknown_placeholder_renders_empty() {
        let rendered = render("flag={{FLGA_ID}};", &params());
        assert_eq!(rendered, "flag=;");
        assert!(!rendered.contains("FLGA_ID"));
    }

    #[test]
    fn non_variable_text_passes_through() {
        assert_eq!(render("{ {x} } {{#list}}", &params()), "{ {x} } {{#list}}");
        assert_eq!(render("plain text", &params()), "plain text");
    }

    #[test]
    fn strict_mode_rejects_unknown_placeholders() {
        let err = render_strict("{{FLAG_ID}}-{{TYPO}}", &params()).expect_err("strict");
        assert!(matches!(err, LabError::UnresolvedPlaceholder { ref name } if name == "TYPO"));
        assert_eq!(
            render_with("{{FLAG_ID}}", &params(), RenderMode::Strict).expect("render"),
            "3fa1c09e"
        );
        assert_eq!(
            render_with("{{TYPO}}", &params(), RenderMode::Permissive).expect("render"),
            ""
        );
    }

    #[test]
    fn lists_unresolved_once() {
        let missing = unresolved_placeholders("{{A}}{{FLAG_ID}}{{B}}{{A}}", &params());
        assert_eq!(missing, vec!["A", "B"]);
    }
}
