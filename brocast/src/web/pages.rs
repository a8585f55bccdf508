//! Landing page rendering.
//!
//! `root.html` extends `base.html`; both are loaded from the template
//! directory at startup and rendered with an empty context.

use tera::{Context, Tera};
use tracing::info;

use crate::mail::RenderError;

const ROOT_TEMPLATE: &str = "root.html";

/// Static page templates.
pub struct Pages {
    engine: Tera,
}

impl Pages {
    /// Load every `*.html` file in `dir`. Fails if `root.html` is not among them.
    pub fn load(dir: &str) -> Result<Self, RenderError> {
        let engine = Tera::new(&format!("{}/*.html", dir.trim_end_matches('/')))?;
        if !engine.get_template_names().any(|name| name == ROOT_TEMPLATE) {
            return Err(tera::Error::msg(format!(
                "template '{}' not found in {}",
                ROOT_TEMPLATE, dir
            ))
            .into());
        }
        info!(
            template_dir = %dir,
            template_count = engine.get_template_names().count(),
            "pages_loaded"
        );
        Ok(Self { engine })
    }

    /// Build from in-memory `(name, source)` pairs.
    pub fn from_raw(templates: Vec<(&str, &str)>) -> Result<Self, RenderError> {
        let mut engine = Tera::default();
        engine.add_raw_templates(templates)?;
        Ok(Self { engine })
    }

    /// No templates at all; every render fails.
    pub fn empty() -> Self {
        Self {
            engine: Tera::default(),
        }
    }

    /// Render the landing page.
    pub fn render_root(&self) -> Result<String, RenderError> {
        Ok(self.engine.render(ROOT_TEMPLATE, &Context::new())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_extends_base() {
        let pages = Pages::from_raw(vec![
            ("base.html", "<html>{% block content %}{% endblock content %}</html>"),
            (
                "root.html",
                "{% extends \"base.html\" %}{% block content %}hello{% endblock content %}",
            ),
        ])
        .unwrap();

        assert_eq!(pages.render_root().unwrap(), "<html>hello</html>");
    }

    #[test]
    fn test_empty_pages_fail_with_message() {
        let err = Pages::empty().render_root().unwrap_err();
        assert!(err.to_string().contains("root.html"));
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let err = Pages::load("/nonexistent/brocast-templates").err().unwrap();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_load_shipped_directory() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
        let pages = Pages::load(dir).unwrap();
        assert!(pages.render_root().unwrap().contains("/broadcasts"));
    }

    #[test]
    fn test_shipped_templates_render() {
        let pages = Pages::from_raw(vec![
            ("base.html", include_str!("../../templates/base.html")),
            ("root.html", include_str!("../../templates/root.html")),
        ])
        .unwrap();

        let html = pages.render_root().unwrap();
        assert!(html.contains("<form id=\"brocast\">"));
        assert!(html.contains("/broadcasts"));
    }
}
