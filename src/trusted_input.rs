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

use bitcoin::{Amount, OutPoint};
use byteorder::{ByteOrder, LittleEndian};

use crate::errors::Error;
use crate::params::{TRUSTED_INPUT_LEN, TRUSTED_INPUT_MAGIC};

const OUTPOINT_OFFSET: usize = 4;
const AMOUNT_OFFSET: usize = OUTPOINT_OFFSET + 36;
const MAC_OFFSET: usize = AMOUNT_OFFSET + 8;

/// Device attestation that an outpoint carries a given amount.
///
/// ```text
/// [magic:1][0x00:1][random:2][txid:32][index:4 LE][amount:8 LE][mac:8]
/// ```
///
/// The blob is replayed verbatim to the device; only the outpoint and amount
/// are read on the host side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedInput {
    bytes: Vec<u8>,
    outpoint: OutPoint,
    amount: Amount,
}

impl TrustedInput {
    /// Decode a blob returned by the device
    pub fn from_bytes<E: std::error::Error>(bytes: Vec<u8>) -> Result<Self, Error<E>> {
        if bytes.len() != TRUSTED_INPUT_LEN {
            return Err(Error::InvalidResponse("trusted input has wrong length"));
        }
        if bytes[0] != TRUSTED_INPUT_MAGIC {
            return Err(Error::InvalidResponse("trusted input has wrong magic"));
        }

        let outpoint: OutPoint =
            match bitcoin::consensus::deserialize(&bytes[OUTPOINT_OFFSET..AMOUNT_OFFSET]) {
                Ok(outpoint) => outpoint,
                Err(_) => return Err(Error::InvalidResponse("trusted input outpoint")),
            };
        let amount = Amount::from_sat(LittleEndian::read_u64(&bytes[AMOUNT_OFFSET..MAC_OFFSET]));

        Ok(TrustedInput {
            bytes,
            outpoint,
            amount,
        })
    }

    /// Outpoint this input was derived from
    pub fn outpoint(&self) -> OutPoint {
        self.outpoint
    }

    /// Value of the attested output
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Raw blob, as issued by the device
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
