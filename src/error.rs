//! Error taxonomy for the analysis pipeline.
//!
//! Only fatal conditions live here. Recoverable situations (a rejected break
//! fit, an ellipticity sitting near its boundary) are reported as
//! [`crate::domain::FitWarning`] values next to the result instead.

#[derive(Clone, PartialEq)]
pub enum AnalysisError {
    /// A mask or fit region selected zero usable points.
    EmptySelection(String),
    /// Requested options cannot be combined (e.g. weighted + break fit).
    IncompatibleOptions(String),
    /// The nonlinear optimizer hit its iteration budget.
    FitNonConvergence { iterations: usize },
    /// An optional quantity was read before it was computed.
    NotComputedYet(&'static str),
    /// Malformed input (shape mismatch, non-finite settings, ...).
    InvalidInput(String),
    /// Filesystem or serialization failure in the export layer.
    Io(String),
}

impl AnalysisError {
    pub fn empty_selection(message: impl Into<String>) -> Self {
        Self::EmptySelection(message.into())
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::IncompatibleOptions(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Process exit code used by the `pspec` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AnalysisError::InvalidInput(_) | AnalysisError::IncompatibleOptions(_) => 2,
            AnalysisError::EmptySelection(_) | AnalysisError::NotComputedYet(_) => 3,
            AnalysisError::FitNonConvergence { .. } => 4,
            AnalysisError::Io(_) => 5,
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::EmptySelection(msg) => write!(f, "Empty selection: {msg}"),
            AnalysisError::IncompatibleOptions(msg) => write!(f, "Incompatible options: {msg}"),
            AnalysisError::FitNonConvergence { iterations } => {
                write!(f, "Fit did not converge within {iterations} iterations.")
            }
            AnalysisError::NotComputedYet(field) => {
                write!(f, "`{field}` has not been computed yet.")
            }
            AnalysisError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            AnalysisError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::fmt::Debug for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisError")
            .field("exit_code", &self.exit_code())
            .field("message", &self.to_string())
            .finish()
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_validation_from_numerics() {
        assert_eq!(AnalysisError::incompatible("x").exit_code(), 2);
        assert_eq!(AnalysisError::empty_selection("x").exit_code(), 3);
        assert_eq!(AnalysisError::FitNonConvergence { iterations: 5 }.exit_code(), 4);
    }
}
