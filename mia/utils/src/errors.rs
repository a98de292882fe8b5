//! Errors generated by the synthesis pipeline.
use crate::{Id, SourceLoc};
use itertools::Itertools;

/// Result of a fallible synthesis step.
pub type MiaResult<T> = std::result::Result<T, Error>;

/// Errors generated by the synthesis pipeline.
#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
    pos: Option<SourceLoc>,
    post_msg: Option<String>,
}

/// The kinds of errors the synthesis pipeline can report.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A required piece of the description is absent.
    #[error("Missing structure: {0}")]
    MissingStructure(String),
    /// The declared stages do not form a single linear chain.
    #[error("Malformed pipeline topology: {0}")]
    Topology(String),
    /// Instruction semantics that no stage claims.
    #[error("Unmapped instruction progress in stage `{stage}`: {msg}")]
    Unmapped { stage: Id, msg: String },
    /// A pass ran before the artifacts it needs were produced.
    #[error("Pass `{pass}` assumption violated: {msg}")]
    PassAssumption { pass: String, msg: String },
    /// An invariant of the synthesis algorithm does not hold.
    #[error("Internal synthesis error (this is a bug): {0}")]
    Internal(String),
    /// The input file could not be read or understood.
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    /// Failed to write the output.
    #[error("Failed to write output: {0}")]
    WriteError(String),
    /// Miscellaneous error message.
    #[error("{0}")]
    Misc(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pos {
            Some(pos) => write!(f, "{pos}: {}", self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }
        if let Some(post) = &self.post_msg {
            write!(f, "\n{post}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for Error {}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            pos: None,
            post_msg: None,
        }
    }

    /// Attach a source location to this error.
    pub fn with_pos(mut self, pos: Option<SourceLoc>) -> Self {
        if pos.is_some() {
            self.pos = pos;
        }
        self
    }

    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg;
        self
    }

    pub fn missing_structure<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MissingStructure(msg.to_string()))
    }

    pub fn topology<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Topology(msg.to_string()))
    }

    pub fn unmapped<S: ToString>(stage: Id, msg: S) -> Self {
        Self::new(ErrorKind::Unmapped {
            stage,
            msg: msg.to_string(),
        })
    }

    pub fn pass_assumption<S: ToString, M: ToString>(pass: S, msg: M) -> Self {
        Self::new(ErrorKind::PassAssumption {
            pass: pass.to_string(),
            msg: msg.to_string(),
        })
    }

    pub fn internal<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Internal(msg.to_string()))
    }

    pub fn invalid_file<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::InvalidFile(msg.to_string()))
    }

    pub fn write_error<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::WriteError(msg.to_string()))
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Misc(msg.to_string()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Option<&SourceLoc> {
        self.pos.as_ref()
    }

    /// Internal errors always indicate a bug in the synthesis passes rather
    /// than a problem with the description.
    pub fn is_internal(&self) -> bool {
        matches!(*self.kind, ErrorKind::Internal(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::write_error(format!("IO Error: {e}"))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(e: std::fmt::Error) -> Self {
        Error::write_error(format!("Formatting Error: {e}"))
    }
}

/// A collection of errors reported together.
#[derive(Clone)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}

impl From<Error> for MultiError {
    fn from(e: Error) -> Self {
        Self { errors: vec![e] }
    }
}

impl From<Vec<Error>> for MultiError {
    fn from(errors: Vec<Error>) -> Self {
        Self { errors }
    }
}

impl From<std::io::Error> for MultiError {
    fn from(e: std::io::Error) -> Self {
        Error::from(e).into()
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.errors.iter().map(|e| e.to_string()).join("\n"))
    }
}

impl std::fmt::Debug for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_distinguished() {
        assert!(Error::internal("dangling context").is_internal());
        assert!(!Error::topology("two entry stages").is_internal());
    }

    #[test]
    fn location_is_rendered() {
        let err = Error::missing_structure("no matcher for `frob`")
            .with_pos(Some(SourceLoc::new("DECODE", Some(2))));
        assert_eq!(
            err.to_string(),
            "DECODE[2]: Missing structure: no matcher for `frob`"
        );
    }

    #[test]
    fn unmapped_names_the_stage() {
        let err = Error::unmapped(Id::new("EXECUTE"), "2 map nodes unresolved");
        assert!(matches!(err.kind(), ErrorKind::Unmapped { stage, .. } if stage == "EXECUTE"));
        assert!(err.to_string().contains("`EXECUTE`"));
    }
}
