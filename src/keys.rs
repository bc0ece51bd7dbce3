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

use bitcoin::bip32::{ChildNumber, DerivationPath};
use bitcoin::secp256k1;

use crate::errors::{EncodingError, Error};
use crate::params::{CHAIN_CODE_LEN, MAX_PATH_DEPTH};
use crate::wire::write_u32_be;

/// Serialize a derivation path as an element count followed by big-endian elements
pub fn serialize_path(path: &DerivationPath) -> Result<Vec<u8>, EncodingError> {
    let children: &[ChildNumber] = path.as_ref();

    if children.len() > MAX_PATH_DEPTH {
        return Err(EncodingError::PathTooLong(children.len()));
    }

    let mut m = Vec::with_capacity(1 + 4 * children.len());
    m.push(children.len() as u8);
    for child in children {
        write_u32_be(&mut m, u32::from(*child));
    }

    Ok(m)
}

/// Public key returned by the device for a derivation path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletPublicKey {
    /// Public Key, as sent by the device
    pub public_key: secp256k1::PublicKey,

    /// Address rendered by the device
    pub address: String,

    /// BIP32 chain code
    pub chain_code: [u8; CHAIN_CODE_LEN],
}

impl WalletPublicKey {
    /// Decode `[pk_len][pk][addr_len][addr][chain_code]`
    pub fn from_bytes<E: std::error::Error>(data: &[u8]) -> Result<Self, Error<E>> {
        let (pk_len, rest) = match data.split_first() {
            Some((len, rest)) => (*len as usize, rest),
            None => return Err(Error::InvalidResponse("empty public key response")),
        };

        if rest.len() < pk_len + 1 {
            return Err(Error::InvalidResponse("public key response truncated"));
        }
        let public_key = secp256k1::PublicKey::from_slice(&rest[..pk_len])?;

        let addr_len = rest[pk_len] as usize;
        let rest = &rest[pk_len + 1..];
        if rest.len() != addr_len + CHAIN_CODE_LEN {
            return Err(Error::InvalidResponse("public key response has wrong length"));
        }

        let address = match std::str::from_utf8(&rest[..addr_len]) {
            Ok(a) => a.to_owned(),
            Err(_) => return Err(Error::InvalidResponse("address is not UTF-8")),
        };

        let mut chain_code = [0u8; CHAIN_CODE_LEN];
        chain_code.copy_from_slice(&rest[addr_len..]);

        Ok(WalletPublicKey {
            public_key,
            address,
            chain_code,
        })
    }

    /// Compressed form of the key, as used in P2PKH scripts
    pub fn compressed(&self) -> bitcoin::PublicKey {
        bitcoin::PublicKey::new(self.public_key)
    }
}
