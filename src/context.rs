//! Per-conversion state: warnings, cancellation and image lookup.
//!
//! Each conversion owns its own [`Context`]; nothing here is shared between
//! concurrent conversions except a [`CancelToken`] the caller chooses to
//! clone.

use crate::error::{Error, Result};
use crate::resolve::{ImageResolver, NullResolver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Category of a non-fatal problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// An image reference could not be resolved or embedded
    Resource,
    /// Bibliography text did not match a known pattern
    ExtractionAmbiguity,
    /// Input used a construct outside the document model
    UnsupportedConstruct,
    /// An embedded object was dropped
    DroppedObject,
    /// Content was kept in a simpler form than the source had
    Degraded,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarningKind::Resource => "resource",
            WarningKind::ExtractionAmbiguity => "extraction",
            WarningKind::UnsupportedConstruct => "unsupported",
            WarningKind::DroppedObject => "dropped",
            WarningKind::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// A non-fatal problem recorded during conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Category
    pub kind: WarningKind,
    /// Human-readable description
    pub message: String,
}

impl Warning {
    /// Create a warning.
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Cooperative cancellation flag.
///
/// Decoders and encoders check it between blocks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static NO_IMAGES: NullResolver = NullResolver;

/// State threaded through one decode or encode pass.
pub struct Context<'a> {
    resolver: &'a dyn ImageResolver,
    cancel: Option<CancelToken>,
    warnings: Vec<Warning>,
}

impl Context<'static> {
    /// Create a context that resolves no images.
    pub fn new() -> Self {
        Self::with_resolver(&NO_IMAGES)
    }
}

impl Default for Context<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Context<'a> {
    /// Create a context resolving images through `resolver`.
    pub fn with_resolver(resolver: &'a dyn ImageResolver) -> Self {
        Self {
            resolver,
            cancel: None,
            warnings: Vec::new(),
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Record a warning and log it.
    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let warning = Warning::new(kind, message);
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Ask the resolver for image bytes.
    pub fn resolve_image(&self, reference: &str) -> Option<Vec<u8>> {
        let data = self.resolver.resolve(reference);
        if data.is_none() {
            log::debug!("image reference not resolved: {}", reference);
        }
        data
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if a warning of `kind` was recorded.
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    /// Take the recorded warnings.
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
