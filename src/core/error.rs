// Error kinds and the builder-style error carried through every read path.
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Internal,
    Usage,
    Policy,
    NotFound,
    Store,
    Format,
    Timeout,
    Partial,
    Io,
    Corrupt,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::Usage => "Usage",
            ErrorKind::Policy => "Policy",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Store => "Store",
            ErrorKind::Format => "Format",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Partial => "Partial",
            ErrorKind::Io => "Io",
            ErrorKind::Corrupt => "Corrupt",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Global reference (`^DPT(1,0)`) the failing call was addressing, if any.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl fmt::Display) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {path})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Policy => 4,
        ErrorKind::Store => 5,
        ErrorKind::Format => 6,
        ErrorKind::Timeout => 7,
        ErrorKind::Partial => 8,
        ErrorKind::Io => 9,
        ErrorKind::Corrupt => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};
    use std::error::Error as StdError;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::Policy, 4),
            (ErrorKind::Store, 5),
            (ErrorKind::Format, 6),
            (ErrorKind::Timeout, 7),
            (ErrorKind::Partial, 8),
            (ErrorKind::Io, 9),
            (ErrorKind::Corrupt, 10),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn policy_and_not_found_render_differently() {
        let policy = Error::new(ErrorKind::Policy).with_message("blocked by allowlist");
        let missing = Error::new(ErrorKind::NotFound).with_message("no record");
        assert_ne!(policy.to_string(), missing.to_string());
        assert!(policy.to_string().starts_with("Policy"));
    }

    #[test]
    fn display_includes_path_and_source_chains() {
        let io = std::io::Error::other("disk gone");
        let err = Error::new(ErrorKind::Store)
            .with_message("read failed")
            .with_path("^DPT(1,0)")
            .with_source(io);
        assert_eq!(err.to_string(), "Store: read failed (path: ^DPT(1,0))");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk gone"));
    }
}
