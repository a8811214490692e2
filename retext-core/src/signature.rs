use serde::{Deserialize, Serialize};

use crate::error::EditorError;

pub const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Header version, e.g. `1.7`. Empty when the header carries none.
    pub version: String,
}

/// Checks the buffer starts with the PDF magic marker. Runs before any decode.
pub fn validate(bytes: &[u8]) -> Result<Signature, EditorError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(EditorError::InvalidFormat);
    }
    let version = bytes[PDF_MAGIC.len()..]
        .iter()
        .take(8)
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|b| *b as char)
        .collect();
    Ok(Signature { version })
}
