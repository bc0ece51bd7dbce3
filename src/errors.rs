/*******************************************************************************
*   (c) 2020 ZondaX GmbH
*
*  Licensed under the Apache License, Version 2.0 (the "License");
*  you may not use this file except in compliance with the License.
*  You may obtain a copy of the License at
*
*      http://www.apache.org/licenses/LICENSE-2.0
*
*  Unless required by applicable law or agreed to in writing, software
*  distributed under the License is distributed on an "AS IS" BASIS,
*  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
*  See the License for the specific language governing permissions and
*  limitations under the License.
********************************************************************************/

use bitcoin::Txid;

/// A caller supplied value that cannot be put on the wire
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// Derivation path element count does not fit a single byte
    #[error("derivation path too long ({0} elements)")]
    PathTooLong(usize),

    /// Payload exceeds the single frame ceiling
    #[error("payload too long for a single frame ({0} bytes)")]
    PayloadTooLong(usize),

    /// PIN length does not fit a single byte
    #[error("PIN too long ({0} bytes)")]
    PinTooLong(usize),

    /// Output index past the end of the transaction outputs
    #[error("output index {index} out of range ({count} outputs)")]
    OutputIndexOutOfRange {
        /// Requested output index
        index: usize,
        /// Number of outputs in the transaction
        count: usize,
    },

    /// Input index past the end of the transaction inputs
    #[error("input index {index} out of range ({count} inputs)")]
    InputIndexOutOfRange {
        /// Requested input index
        index: usize,
        /// Number of inputs in the transaction
        count: usize,
    },
}

/// Ledger Bitcoin App Error
#[derive(Debug, thiserror::Error)]
pub enum Error<E: std::error::Error> {
    /// Transport related errors
    #[error("Ledger transport error: {0}")]
    Transport(E),

    /// Value could not be encoded, nothing was sent
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Device answered with a status word outside the accepted set
    #[error("Unexpected status word {0:#06x}")]
    UnexpectedStatus(u16),

    /// No previous transaction supplied for an input
    #[error("Parent transaction {0} not found")]
    ParentNotFound(Txid),

    /// Device requested a user confirmation method the host does not implement
    #[error("Unsupported user confirmation method")]
    UnsupportedConfirmationFlow,

    /// Signed input does not pass script verification
    #[error("Script verification failed for input {input}")]
    VerificationFailed {
        /// Index of the offending input
        input: usize,
    },

    /// Device response could not be decoded
    #[error("Invalid device response: {0}")]
    InvalidResponse(&'static str),

    /// The signature is not valid
    #[error("received an invalid signature: {0}")]
    InvalidSignature(#[from] bitcoin::ecdsa::Error),

    /// Public Key is invalid
    #[error("received an invalid PK: {0}")]
    InvalidPublicKey(#[from] bitcoin::secp256k1::Error),
}
