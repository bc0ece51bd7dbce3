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
//! Protocol constants of the Bitcoin app: class byte, instructions, frame
//! parameters and status words.

/// APDU Class byte
pub const CLA: u8 = 0xE0;

/// Largest payload a single command frame can carry
pub const MAX_APDU_PAYLOAD: usize = 255;

/// Largest number of elements a serialized derivation path may hold
pub const MAX_PATH_DEPTH: usize = 255;

/// Status word reported by the device on success
pub const SW_OK: u16 = 0x9000;

/// Status words accepted by every current operation
pub const OK: &[u16] = &[SW_OK];

/// P1 value of single frame commands
pub const P1_NONE: u8 = 0x00;

/// P2 value of commands without a second parameter
pub const P2_NONE: u8 = 0x00;

/// P1 value for the first frame of a command
pub const P1_FIRST: u8 = 0x00;

/// P1 value for every follow-on frame of a command
pub const P1_MORE: u8 = 0x80;

/// P1 value marking the last frame of the finalize-full output stream
pub const P1_LAST: u8 = 0x80;

/// P1 value of every finalize-full frame but the last
pub const P1_NOT_LAST: u8 = 0x00;

/// P2 value resetting the device-side hashing state
pub const P2_NEW_TRANSACTION: u8 = 0x00;

/// P2 value continuing an already started hashing state
pub const P2_CONTINUE_TRANSACTION: u8 = 0x80;

/// Marker preceding a trusted input in the hash-input-start stream
pub const INPUT_TRUSTED: u8 = 0x01;

/// Marker preceding a raw outpoint in the hash-input-start stream
pub const INPUT_UNTRUSTED: u8 = 0x00;

/// First byte of every trusted input blob
pub const TRUSTED_INPUT_MAGIC: u8 = 0x32;

/// Length of a trusted input blob
pub const TRUSTED_INPUT_LEN: usize = 56;

/// DER sequence tag the device leaves out of signatures
pub const DER_SEQUENCE_TAG: u8 = 0x30;

/// BIP32 chain code length
pub const CHAIN_CODE_LEN: usize = 32;

/// Firmware version response length
pub const FIRMWARE_VERSION_LEN: usize = 7;

/// APDU instruction codes
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstructionCode {
    /// Get wallet public key for a derivation path
    GetWalletPublicKey = 0x40,
    /// Replay a previous transaction to obtain a trusted input
    GetTrustedInput = 0x42,
    /// Start hashing the transaction being signed
    HashInputStart = 0x44,
    /// Sign the hashed transaction
    HashSign = 0x48,
    /// Stream the outputs of the transaction being signed
    HashInputFinalizeFull = 0x4A,
    /// Get firmware version
    GetFirmwareVersion = 0xC4,
}

impl From<InstructionCode> for u8 {
    fn from(ins: InstructionCode) -> u8 {
        ins as u8
    }
}
