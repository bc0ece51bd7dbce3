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
//! Support library for the Bitcoin (btchip) Ledger app
//!
//! [BtcApp] owns a transport and serializes every operation on it: each public
//! method holds the transport for its full duration, so frames from two
//! callers never interleave on the wire and the device-side hashing state
//! stays consistent. Signing a transaction runs the whole trusted input /
//! hash input / sign sequence under one hold.

#![deny(trivial_casts, trivial_numeric_casts)]
#![deny(unused_import_braces, unused_qualifications)]
#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/ledger-btchip/0.1.0")]

use bitcoin::absolute::LockTime;
use bitcoin::bip32::DerivationPath;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{ecdsa, OutPoint, Transaction, TxOut};
use log::debug;
use tokio::sync::Mutex;

pub use ledger_transport::Exchange;

pub mod apdu;
pub mod commands;
mod errors;
mod firmware;
mod keys;
pub mod params;
mod signer;
mod trusted_input;
mod verify;
pub mod wire;

#[cfg(feature = "hid")]
mod transport;

#[cfg(test)]
mod mock;

pub use errors::{EncodingError, Error};
pub use firmware::{Firmware, FirmwareFeatures};
pub use keys::{serialize_path, WalletPublicKey};
pub use signer::Coin;
pub use trusted_input::TrustedInput;
pub use verify::{p2pkh_script_sig, DefaultVerifier, P2pkhVerifier, ScriptVerifier};
#[cfg(feature = "bitcoinconsensus")]
pub use verify::ConsensusVerifier;

/// Bitcoin App
pub struct BtcApp<E> {
    transport: Mutex<E>,
}

impl<E> BtcApp<E>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    /// Wrap a connected transport
    pub fn new(transport: E) -> Self {
        BtcApp {
            transport: Mutex::new(transport),
        }
    }

    /// Release the underlying transport
    pub fn into_inner(self) -> E {
        self.transport.into_inner()
    }

    /// Retrieve the firmware version
    pub async fn firmware_version(&self) -> Result<Firmware, Error<E::Error>> {
        let transport = self.transport.lock().await;
        debug!("Requesting firmware version");

        commands::firmware_version(&*transport).await
    }

    /// Retrieves the public key and chain code for `path`
    pub async fn wallet_public_key(
        &self,
        path: &DerivationPath,
    ) -> Result<WalletPublicKey, Error<E::Error>> {
        let transport = self.transport.lock().await;
        debug!("Requesting public key for {}", path);

        commands::wallet_public_key(&*transport, path).await
    }

    /// Obtain a trusted input for output `output_index` of `tx`
    pub async fn trusted_input(
        &self,
        tx: &Transaction,
        output_index: usize,
    ) -> Result<TrustedInput, Error<E::Error>> {
        let transport = self.transport.lock().await;

        commands::trusted_input(&*transport, tx, output_index).await
    }

    /// Obtain a trusted input for `outpoint`, looking its transaction up in `parents`
    pub async fn trusted_input_for(
        &self,
        parents: &[Transaction],
        outpoint: OutPoint,
    ) -> Result<TrustedInput, Error<E::Error>> {
        let parent = match parents.iter().find(|p| p.compute_txid() == outpoint.txid) {
            Some(parent) => parent,
            None => return Err(Error::ParentNotFound(outpoint.txid)),
        };

        self.trusted_input(parent, outpoint.vout as usize).await
    }

    /// Start hashing `tx` for signing input `input_index`
    pub async fn hash_input_start(
        &self,
        new_transaction: bool,
        tx: &Transaction,
        input_index: usize,
        trusted_inputs: &[TrustedInput],
    ) -> Result<(), Error<E::Error>> {
        let transport = self.transport.lock().await;
        debug!(
            "Hash input start for input {} (new: {})",
            input_index, new_transaction
        );

        commands::hash_input_start(&*transport, new_transaction, tx, input_index, trusted_inputs)
            .await
    }

    /// Stream the outputs of the transaction being signed
    pub async fn hash_input_finalize_full(
        &self,
        outputs: &[TxOut],
    ) -> Result<Vec<u8>, Error<E::Error>> {
        let transport = self.transport.lock().await;
        debug!("Hash input finalize with {} outputs", outputs.len());

        commands::hash_input_finalize_full(&*transport, outputs).await
    }

    /// Sign the transaction hashed so far with the key at `path`
    pub async fn hash_sign(
        &self,
        path: &DerivationPath,
        pin: Option<&[u8]>,
        lock_time: LockTime,
        sighash_type: EcdsaSighashType,
    ) -> Result<ecdsa::Signature, Error<E::Error>> {
        let transport = self.transport.lock().await;
        debug!("Hash sign with {}", path);

        commands::hash_sign(&*transport, path, pin, lock_time, sighash_type).await
    }

    /// Sign every input of `tx` spending one of `coins`, verifying the result with [DefaultVerifier]
    pub async fn sign_transaction(
        &self,
        path: &DerivationPath,
        coins: &[Coin],
        parents: &[Transaction],
        tx: &Transaction,
    ) -> Result<Transaction, Error<E::Error>> {
        self.sign_transaction_with(path, coins, parents, tx, &DefaultVerifier::default())
            .await
    }

    /// Sign every input of `tx` spending one of `coins`, verifying the result with `verifier`
    pub async fn sign_transaction_with<V>(
        &self,
        path: &DerivationPath,
        coins: &[Coin],
        parents: &[Transaction],
        tx: &Transaction,
        verifier: &V,
    ) -> Result<Transaction, Error<E::Error>>
    where
        V: ScriptVerifier + Sync + ?Sized,
    {
        let transport = self.transport.lock().await;
        debug!(
            "Signing transaction {} ({} coins)",
            tx.compute_txid(),
            coins.len()
        );

        signer::sign_transaction(&*transport, path, coins, parents, tx, verifier).await
    }
}
