/// Broad failure category of an [`AppError`].
///
/// Per-point numerical singularities are not errors: they surface as NaN values
/// in the evaluated arrays. Solver non-convergence is reported on the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File system or serialization failure (exit code 2).
    Io,
    /// Malformed user input detected before any computation (exit code 3).
    InvalidInput,
    /// A computation could not produce a usable value (exit code 4).
    Numerical,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io => 2,
            ErrorKind::InvalidInput => 3,
            ErrorKind::Numerical => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Numerical, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(AppError::io("x").exit_code(), 2);
        assert_eq!(AppError::invalid_input("x").exit_code(), 3);
        assert_eq!(AppError::numerical("x").exit_code(), 4);
    }

    #[test]
    fn display_is_the_bare_message() {
        let err = AppError::invalid_input("Specimen set is empty.");
        assert_eq!(err.to_string(), "Specimen set is empty.");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
