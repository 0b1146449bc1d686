//! Errors that can occur while parsing primitive types.

use thiserror::Error;

/// Error while parsing an identifier or a fixed-point quantity from its textual form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The input is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The decoded bytes do not have the expected length.
    #[error("expected {expected} bytes, got {actual} bytes")]
    InvalidLength {
        /// The number of bytes expected.
        expected: usize,
        /// The number of bytes found.
        actual: usize,
    },

    /// The input is not a valid decimal number.
    #[error("invalid decimal: {0:?}")]
    InvalidDecimal(String),

    /// The decimal has more fractional digits than the fixed-point representation supports.
    #[error("at most {max} fractional digits are supported, got {actual}")]
    TooManyFractionalDigits {
        /// The supported number of fractional digits.
        max: usize,
        /// The number of fractional digits in the input.
        actual: usize,
    },

    /// The decimal does not fit in 256 bits once scaled.
    #[error("decimal overflows 256 bits: {0:?}")]
    Overflow(String),
}
