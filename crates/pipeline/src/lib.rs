//! Postmaster notification pipeline.
//!
//! An [`EventPipeline`] turns one signed event token into one delivered
//! notification: verify, decode, render, dispatch. Each route is described by
//! a [`Notification`] impl.

pub mod notification;
pub mod pipeline;
pub mod render;

pub use notification::{EmailConfirmationNotice, Notification};
pub use pipeline::{EventPipeline, MailerConfig, PipelineError, PipelineState, Stage};
pub use render::{FsTemplateStore, RenderError, TemplateRenderer, TemplateStore};
