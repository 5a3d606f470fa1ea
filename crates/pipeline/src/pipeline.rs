//! Per-message event pipeline.
//!
//! [`EventPipeline::handle`] takes one token through a strictly linear state
//! machine:
//!
//! ```text
//! Received -> Verified -> Decoded -> Rendered -> Dispatched -> Done
//!     \           \           \           \
//!      +-----------+-----------+-----------+--> Errored(stage)
//! ```
//!
//! The first failing stage ends the run. Nothing is sent unless every earlier
//! stage succeeded, and the returned [`PipelineError`] names the stage.

use std::fmt;
use std::marker::PhantomData;

use postmaster_core::{ApiKey, Claims, DomainRecord, SchemaError};
use postmaster_events::token::fingerprint;
use postmaster_events::{
    DeliveryError, DeliveryRequest, DeliveryTransport, Dispatcher, Receipt, Sender, TokenError,
    TokenVerifier,
};

use crate::notification::Notification;
use crate::render::{RenderError, TemplateRenderer, TemplateStore};

// ---------------------------------------------------------------------------
// Stages and states
// ---------------------------------------------------------------------------

/// A unit of work in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Verify,
    Decode,
    Render,
    Dispatch,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Decode => "decode",
            Self::Render => "render",
            Self::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Verified,
    Decoded,
    Rendered,
    Dispatched,
    Done,
    /// Absorbing failure state, recording the stage that failed.
    Errored(Stage),
}

impl PipelineState {
    /// The stage that moves a run out of this state, if any.
    pub fn pending_stage(self) -> Option<Stage> {
        match self {
            Self::Received => Some(Stage::Verify),
            Self::Verified => Some(Stage::Decode),
            Self::Decoded => Some(Stage::Render),
            Self::Rendered => Some(Stage::Dispatch),
            Self::Dispatched | Self::Done | Self::Errored(_) => None,
        }
    }

    /// Successor after the pending stage succeeds. Terminal states have none.
    pub fn advance(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Verified),
            Self::Verified => Some(Self::Decoded),
            Self::Decoded => Some(Self::Rendered),
            Self::Rendered => Some(Self::Dispatched),
            Self::Dispatched => Some(Self::Done),
            Self::Done | Self::Errored(_) => None,
        }
    }

    /// State after the pending stage fails.
    pub fn fail(self) -> Self {
        match self.pending_stage() {
            Some(stage) => Self::Errored(stage),
            None => self,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored(_))
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// First failure of a run, annotated with its stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Signature, expiry or claims check failed.
    #[error("verify: {0}")]
    InvalidToken(#[from] TokenError),

    /// The event does not fit the route's record.
    #[error("decode: {0}")]
    Schema(#[from] SchemaError),

    /// The route's template is missing from the store.
    #[error("render: template not found: {0}")]
    TemplateNotFound(String),

    /// The template failed to load or render.
    #[error("render: {0}")]
    Render(RenderError),

    /// The single send attempt failed.
    #[error("dispatch: {0}")]
    Delivery(#[from] DeliveryError),
}

impl From<RenderError> for PipelineError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::TemplateNotFound(id) => Self::TemplateNotFound(id),
            other => Self::Render(other),
        }
    }
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidToken(_) => Stage::Verify,
            Self::Schema(_) => Stage::Decode,
            Self::TemplateNotFound(_) | Self::Render(_) => Stage::Render,
            Self::Delivery(_) => Stage::Dispatch,
        }
    }
}

// ---------------------------------------------------------------------------
// EventPipeline
// ---------------------------------------------------------------------------

/// Sender identity and credential, built once at startup.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub credential: ApiKey,
    pub sender: Sender,
}

/// Verify → decode → render → dispatch for one notification route `N`.
///
/// Holds no per-run state; concurrent `handle` calls share nothing mutable.
pub struct EventPipeline<N, S, T> {
    verifier: TokenVerifier,
    renderer: TemplateRenderer<S>,
    dispatcher: Dispatcher<T>,
    mailer: MailerConfig,
    route: PhantomData<fn() -> N>,
}

impl<N, S, T> EventPipeline<N, S, T>
where
    N: Notification,
    S: TemplateStore,
    T: DeliveryTransport,
{
    pub fn new(
        verifier: TokenVerifier,
        renderer: TemplateRenderer<S>,
        dispatcher: Dispatcher<T>,
        mailer: MailerConfig,
    ) -> Self {
        Self {
            verifier,
            renderer,
            dispatcher,
            mailer,
            route: PhantomData,
        }
    }

    pub fn routing_key(&self) -> &'static str {
        N::ROUTING_KEY
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Run one token through every stage.
    pub async fn handle(&self, token: &str) -> Result<Receipt, PipelineError> {
        let mut run = Run::received(N::ROUTING_KEY, token);
        let result = self.drive(&mut run, token).await;
        match &result {
            Ok(receipt) => run.finish(receipt),
            Err(e) => run.fail(e),
        }
        result
    }

    async fn drive(&self, run: &mut Run, token: &str) -> Result<Receipt, PipelineError> {
        let claims = self.verifier.verify(token)?;
        run.identify(&claims);
        run.advance();

        let record = N::Record::decode(&claims.event)?;
        run.advance();

        let document = self.renderer.render(N::TEMPLATE_ID, &record).await?;
        run.advance();

        let request =
            DeliveryRequest::new(&self.mailer.sender, N::SUBJECT, record.recipient(), document);
        let receipt = self
            .dispatcher
            .dispatch(request, &self.mailer.credential)
            .await?;
        run.advance();

        Ok(receipt)
    }
}

/// Bookkeeping for a single `handle` call.
struct Run {
    routing_key: &'static str,
    /// `jti` once verified, token fingerprint before that.
    log_id: String,
    state: PipelineState,
}

impl Run {
    fn received(routing_key: &'static str, token: &str) -> Self {
        let run = Self {
            routing_key,
            log_id: fingerprint(token),
            state: PipelineState::Received,
        };
        tracing::debug!(routing_key, event_id = %run.log_id, "Event received");
        run
    }

    fn identify(&mut self, claims: &Claims) {
        if let Some(jti) = &claims.jti {
            self.log_id = jti.clone();
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.advance() {
            self.state = next;
            tracing::debug!(
                routing_key = self.routing_key,
                event_id = %self.log_id,
                state = ?self.state,
                "Pipeline advanced"
            );
        }
    }

    fn finish(&mut self, receipt: &Receipt) {
        self.advance();
        tracing::info!(
            routing_key = self.routing_key,
            event_id = %self.log_id,
            transport = receipt.transport,
            status = %receipt.status,
            "Event handled"
        );
    }

    fn fail(&mut self, err: &PipelineError) {
        self.state = self.state.fail();
        tracing::warn!(
            routing_key = self.routing_key,
            event_id = %self.log_id,
            stage = %err.stage(),
            error = %err,
            "Event handling failed"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
