use core::fmt;

/// Result alias for `mutsig`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the factorization, clustering and fitting engines.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Vector or matrix dimension mismatch.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Shape mismatch (string description).
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// A count or weight was negative, NaN or infinite.
    InvalidValue {
        /// Row of the offending entry.
        row: usize,
        /// Column of the offending entry.
        col: usize,
        /// The offending value.
        value: f64,
    },

    /// A signature column is not a ratio distribution.
    InvalidSignature {
        /// Signature (column) index.
        index: usize,
        /// Sum of the column.
        sum: f64,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// A factorization trial reached an invalid numeric state.
    NumericInstability {
        /// Signature count of the failed trial.
        sig_count: usize,
        /// Trial index within that signature count.
        trial: usize,
        /// Iteration at which the trial was aborted.
        iteration: usize,
    },

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, actual {actual}")
            }
            Error::InvalidValue { row, col, value } => {
                write!(f, "invalid value {value} at ({row}, {col})")
            }
            Error::InvalidSignature { index, sum } => {
                write!(f, "signature {index} does not sum to 1 (sum {sum})")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::NumericInstability {
                sig_count,
                trial,
                iteration,
            } => write!(
                f,
                "numeric instability in trial {} (sig count {}) at iteration {}",
                trial, sig_count, iteration
            ),
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = Error::DimensionMismatch {
            expected: 96,
            found: 6,
        };
        assert_eq!(e.to_string(), "dimension mismatch: expected 96, found 6");

        let e = Error::InvalidSignature { index: 2, sum: 0.5 };
        assert!(e.to_string().contains("signature 2"));

        let e = Error::NumericInstability {
            sig_count: 4,
            trial: 1,
            iteration: 17,
        };
        assert!(e.to_string().contains("iteration 17"));
    }
}
