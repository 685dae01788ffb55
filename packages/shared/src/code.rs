use std::fmt;

use cosmwasm_std::StdError;
use thiserror::Error;

/// Length of a referral code: three digits followed by three letters.
pub const CODE_LEN: usize = 6;

const DIGITS: &[u8; 10] = b"0123456789";
const LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodeFormatError {
    #[error("Referral code must be 6 characters, got {len}")]
    Length { len: usize },

    #[error("Expected a digit at position {position}")]
    ExpectedDigit { position: usize },

    #[error("Expected an uppercase letter at position {position}")]
    ExpectedLetter { position: usize },
}

impl From<CodeFormatError> for StdError {
    fn from(err: CodeFormatError) -> Self {
        StdError::generic_err(err.to_string())
    }
}

/// A referral code in `NNNLLL` form (e.g. `042QZX`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Builds a code from 32 bytes of entropy by rejection sampling.
    ///
    /// Bytes are consumed in order; a byte is used only when it falls below
    /// the largest multiple of the alphabet size, so every character is
    /// exactly uniform. Returns `None` if the entropy runs out first.
    pub fn generate(entropy: &[u8; 32]) -> Option<Self> {
        let mut bytes = entropy.iter().copied();
        let mut code = String::with_capacity(CODE_LEN);
        for i in 0..CODE_LEN {
            let alphabet: &[u8] = if i < 3 { DIGITS } else { LETTERS };
            let n = alphabet.len();
            let limit = 256 - 256 % n;
            let b = bytes.find(|b| (*b as usize) < limit)?;
            code.push(alphabet[b as usize % n] as char);
        }
        Some(ReferralCode(code))
    }

    /// Validates `^[0-9]{3}[A-Z]{3}$`. Case sensitive: callers normalize first.
    pub fn parse(raw: &str) -> Result<Self, CodeFormatError> {
        let bytes = raw.as_bytes();
        if bytes.len() != CODE_LEN {
            return Err(CodeFormatError::Length { len: bytes.len() });
        }
        for (position, b) in bytes.iter().enumerate() {
            if position < 3 && !b.is_ascii_digit() {
                return Err(CodeFormatError::ExpectedDigit { position });
            }
            if position >= 3 && !b.is_ascii_uppercase() {
                return Err(CodeFormatError::ExpectedLetter { position });
            }
        }
        Ok(ReferralCode(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and upper-case user input before validation or lookup.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
