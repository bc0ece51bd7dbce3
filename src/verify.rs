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
//! Local script verification of device produced signatures.
//!
//! With the `bitcoinconsensus` feature the signed inputs go through the
//! consensus script interpreter ([ConsensusVerifier]). Without it the
//! fallback is [P2pkhVerifier], which only understands the pay-to-pubkey-hash
//! template the signer produces.

use bitcoin::hashes::Hash;
use bitcoin::script::{Instruction, PushBytes, PushBytesError};
use bitcoin::secp256k1::{Message, Secp256k1, VerifyOnly};
use bitcoin::sighash::SighashCache;
use bitcoin::{ecdsa, PublicKey, Script, ScriptBuf, Transaction, TxOut};
use log::warn;

/// Script interpreter used to check a signed input before handing a transaction back
pub trait ScriptVerifier {
    /// Whether input `input_index` of `tx` satisfies `script_pubkey`
    fn verify(&self, script_pubkey: &Script, tx: &Transaction, input_index: usize) -> bool;

    /// Whether input `input_index` of `tx` can spend `spent`.
    ///
    /// Interpreters that commit to the spent value override this; the default
    /// only looks at the script.
    fn verify_spend(&self, spent: &TxOut, tx: &Transaction, input_index: usize) -> bool {
        self.verify(&spent.script_pubkey, tx, input_index)
    }
}

/// Verifier used when signing without an explicit one
#[cfg(feature = "bitcoinconsensus")]
pub type DefaultVerifier = ConsensusVerifier;

/// Verifier used when signing without an explicit one
#[cfg(not(feature = "bitcoinconsensus"))]
pub type DefaultVerifier = P2pkhVerifier;

/// Consensus script interpreter, as linked through `bitcoinconsensus`
#[cfg(feature = "bitcoinconsensus")]
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsensusVerifier {
    flags: Option<u32>,
}

#[cfg(feature = "bitcoinconsensus")]
impl ConsensusVerifier {
    /// Verify with explicit script flags instead of the standard pre-taproot set
    pub fn with_flags(flags: u32) -> Self {
        ConsensusVerifier { flags: Some(flags) }
    }

    fn check(
        &self,
        script_pubkey: &Script,
        amount: bitcoin::Amount,
        tx: &Transaction,
        input_index: usize,
    ) -> bool {
        let spending = bitcoin::consensus::serialize(tx);
        let result = match self.flags {
            Some(flags) => script_pubkey.verify_with_flags(input_index, amount, &spending, flags),
            None => script_pubkey.verify(input_index, amount, &spending),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("input {} failed verification: {}", input_index, e);
                false
            }
        }
    }
}

#[cfg(feature = "bitcoinconsensus")]
impl ScriptVerifier for ConsensusVerifier {
    fn verify(&self, script_pubkey: &Script, tx: &Transaction, input_index: usize) -> bool {
        self.check(script_pubkey, bitcoin::Amount::ZERO, tx, input_index)
    }

    fn verify_spend(&self, spent: &TxOut, tx: &Transaction, input_index: usize) -> bool {
        self.check(&spent.script_pubkey, spent.value, tx, input_index)
    }
}

/// Interpreter for the pay-to-pubkey-hash template.
///
/// Accepts a scriptSig of exactly `<sig> <pubkey>` where the key hashes to the
/// scriptPubKey and the signature validates over the legacy signature hash.
pub struct P2pkhVerifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Default for P2pkhVerifier {
    fn default() -> Self {
        P2pkhVerifier {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl P2pkhVerifier {
    fn check(
        &self,
        script_pubkey: &Script,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<(), &'static str> {
        let input = tx.input.get(input_index).ok_or("input index out of range")?;

        if !script_pubkey.is_p2pkh() {
            return Err("not a pay-to-pubkey-hash script");
        }

        let mut pushes = input.script_sig.instructions();
        let sig = match pushes.next() {
            Some(Ok(Instruction::PushBytes(b))) => b.as_bytes(),
            _ => return Err("missing signature push"),
        };
        let key = match pushes.next() {
            Some(Ok(Instruction::PushBytes(b))) => b.as_bytes(),
            _ => return Err("missing public key push"),
        };
        if pushes.next().is_some() {
            return Err("unexpected trailing script");
        }

        let public_key = PublicKey::from_slice(key).map_err(|_| "invalid public key")?;
        if ScriptBuf::new_p2pkh(&public_key.pubkey_hash()).as_script() != script_pubkey {
            return Err("public key does not match script");
        }

        let sig = ecdsa::Signature::from_slice(sig).map_err(|_| "invalid signature encoding")?;
        let sighash = SighashCache::new(tx)
            .legacy_signature_hash(input_index, script_pubkey, sig.sighash_type.to_u32())
            .map_err(|_| "input index out of range")?;

        let msg = Message::from_digest(sighash.to_byte_array());
        self.secp
            .verify_ecdsa(&msg, &sig.signature, &public_key.inner)
            .map_err(|_| "signature does not verify")
    }
}

impl ScriptVerifier for P2pkhVerifier {
    fn verify(&self, script_pubkey: &Script, tx: &Transaction, input_index: usize) -> bool {
        match self.check(script_pubkey, tx, input_index) {
            Ok(()) => true,
            Err(reason) => {
                warn!("input {} failed verification: {}", input_index, reason);
                false
            }
        }
    }
}

/// Build the `<sig> <pubkey>` scriptSig spending a pay-to-pubkey-hash output
pub fn p2pkh_script_sig(
    sig: &ecdsa::Signature,
    public_key: &PublicKey,
) -> Result<ScriptBuf, PushBytesError> {
    let sig = sig.to_vec();
    let sig: &PushBytes = sig.as_slice().try_into()?;

    Ok(ScriptBuf::builder()
        .push_slice(sig)
        .push_key(public_key)
        .into_script())
}
