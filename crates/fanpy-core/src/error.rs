use std::fmt;
use thiserror::Error;

/// Types of transpilation errors
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("unsupported node")]
    UnsupportedNode(String),

    #[error("type metadata extraction failed")]
    TypeExtraction(String),

    #[error("code generation error")]
    CodeGen(String),

    #[error("invariant violation")]
    InvariantViolation(String),

    #[error("output I/O error")]
    Io(String),
}

/// Context-aware transpilation error.
///
/// Recoverable per-node decisions never produce one of these (they fall back
/// and log); an error here is fatal for the pod being emitted.
#[derive(Debug, Error)]
pub struct TranspileError {
    pub kind: ErrorKind,
    pub pod: Option<String>,
    pub type_name: Option<String>,
    pub context: Vec<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TranspileError {
    /// Create a new error with the given kind
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            pod: None,
            type_name: None,
            context: Vec::new(),
            source: None,
        }
    }

    /// Attach the pod and type being emitted when the error occurred
    pub fn in_type(mut self, pod: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.pod = Some(pod.into());
        self.type_name = Some(type_name.into());
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The single-line form reported on the error stream: pod, type, kind.
    pub fn summary(&self) -> String {
        match (&self.pod, &self.type_name) {
            (Some(pod), Some(ty)) => format!("{}::{}: {}", pod, ty, self.kind),
            (Some(pod), None) => format!("{}: {}", pod, self.kind),
            _ => self.kind.to_string(),
        }
    }
}

impl fmt::Display for TranspileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let (Some(pod), Some(ty)) = (&self.pod, &self.type_name) {
            write!(f, " in {}::{}", pod, ty)?;
        }

        if !self.context.is_empty() {
            write!(f, "\n\nContext:")?;
            for (i, ctx) in self.context.iter().enumerate() {
                write!(f, "\n  {}. {}", i + 1, ctx)?;
            }
        }

        Ok(())
    }
}

impl From<std::fmt::Error> for TranspileError {
    fn from(e: std::fmt::Error) -> Self {
        Self::new(ErrorKind::CodeGen("formatting output".into())).with_source(e)
    }
}

impl From<std::io::Error> for TranspileError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(e.to_string())).with_source(e)
    }
}

/// Result type alias for transpilation operations
pub type TranspileResult<T> = Result<T, TranspileError>;
