//! Notification template rendering.
//!
//! Templates are fetched from a [`TemplateStore`] on every render and
//! compiled into a throwaway `minijinja` environment, so edits on disk take
//! effect on the next event and no template state outlives a run.
//!
//! Every template is HTML auto-escaped regardless of its name, and undefined
//! variables are errors rather than silently empty output.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use postmaster_core::RenderedDocument;
use serde::Serialize;

/// File extension of templates in a [`FsTemplateStore`].
pub const TEMPLATE_EXTENSION: &str = "html";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No template with this id, or the id is not a plain name.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// The store failed for a reason other than absence.
    #[error("Template store failed to load {id}: {source}")]
    Store {
        id: String,
        #[source]
        source: io::Error,
    },

    /// Syntax error or undefined variable.
    #[error("Template {id} failed to render: {message}")]
    Render { id: String, message: String },
}

// ---------------------------------------------------------------------------
// Template stores
// ---------------------------------------------------------------------------

/// Lookup of template source by identifier.
pub trait TemplateStore: Send + Sync {
    /// Load the source of `id`, or `None` when no such template exists.
    fn load(&self, id: &str) -> impl Future<Output = io::Result<Option<String>>> + Send;
}

/// Templates stored as `<root>/<id>.html`.
#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{TEMPLATE_EXTENSION}"))
    }
}

impl TemplateStore for FsTemplateStore {
    async fn load(&self, id: &str) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(source) => Ok(Some(source)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Identifiers are plain names (`sign_up`), never paths.
pub fn is_valid_template_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ---------------------------------------------------------------------------
// TemplateRenderer
// ---------------------------------------------------------------------------

/// Renders records into HTML documents.
pub struct TemplateRenderer<S> {
    store: S,
}

impl<S: TemplateStore> TemplateRenderer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Render `template_id` with `record` as the template context.
    ///
    /// Returns the whole document or an error; never partial output.
    pub async fn render<R: Serialize>(
        &self,
        template_id: &str,
        record: &R,
    ) -> Result<RenderedDocument, RenderError> {
        if !is_valid_template_id(template_id) {
            return Err(RenderError::TemplateNotFound(template_id.to_string()));
        }

        let source = self
            .store
            .load(template_id)
            .await
            .map_err(|source| RenderError::Store {
                id: template_id.to_string(),
                source,
            })?
            .ok_or_else(|| RenderError::TemplateNotFound(template_id.to_string()))?;

        let render_error = |e: minijinja::Error| RenderError::Render {
            id: template_id.to_string(),
            message: e.to_string(),
        };

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template(template_id, &source)
            .map_err(render_error)?;

        let output = env
            .get_template(template_id)
            .and_then(|template| template.render(record))
            .map_err(render_error)?;

        Ok(RenderedDocument::from(output))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
