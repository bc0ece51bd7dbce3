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
//! Transaction signing flow.
//!
//! Per input being signed the device sees, in order: hash input start (the
//! first one resets its hashing state), finalize full with every output, then
//! hash sign. Trusted inputs for every input are collected beforehand.

use std::collections::HashMap;

use bitcoin::bip32::DerivationPath;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use ledger_transport::Exchange;
use log::{debug, warn};

use crate::commands;
use crate::errors::Error;
use crate::trusted_input::TrustedInput;
use crate::verify::{p2pkh_script_sig, ScriptVerifier};

/// An output being spent with a key held by the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    /// Where the output lives
    pub outpoint: OutPoint,
    /// The output itself
    pub txout: TxOut,
}

impl Coin {
    /// Create a new coin
    pub fn new(outpoint: OutPoint, txout: TxOut) -> Self {
        Coin { outpoint, txout }
    }

    /// Script the device hashes in place of the scriptSig while signing
    pub fn script_code(&self) -> ScriptBuf {
        self.txout.script_pubkey.clone()
    }
}

/// Sign every input of `tx` spending one of `coins` with the key at `path`.
///
/// `parents` must hold the previous transaction of every input. Inputs not
/// spending one of `coins` are passed through untouched. The caller's
/// transaction is never modified; a signed copy is returned only once every
/// signed input passes `verifier`.
pub async fn sign_transaction<E, V>(
    transport: &E,
    path: &DerivationPath,
    coins: &[Coin],
    parents: &[Transaction],
    tx: &Transaction,
    verifier: &V,
) -> Result<Transaction, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
    V: ScriptVerifier + ?Sized,
{
    let public_key = commands::wallet_public_key(transport, path)
        .await?
        .compressed();

    let parents_by_id: HashMap<Txid, &Transaction> =
        parents.iter().map(|p| (p.compute_txid(), p)).collect();
    let coins_by_outpoint: HashMap<OutPoint, &Coin> =
        coins.iter().map(|c| (c.outpoint, c)).collect();

    // Resolve every parent before talking to the device
    let mut spent = Vec::with_capacity(tx.input.len());
    for input in &tx.input {
        let prevout = input.previous_output;
        match parents_by_id.get(&prevout.txid) {
            Some(parent) => spent.push((*parent, prevout.vout as usize)),
            None => return Err(Error::ParentNotFound(prevout.txid)),
        }
    }

    let mut trusted_inputs: Vec<TrustedInput> = Vec::with_capacity(spent.len());
    for (parent, vout) in spent {
        trusted_inputs.push(commands::trusted_input(transport, parent, vout).await?);
    }

    let mut tx = tx.clone();
    for input in tx.input.iter_mut() {
        if let Some(coin) = coins_by_outpoint.get(&input.previous_output) {
            input.script_sig = coin.script_code();
        }
    }

    let mut new_transaction = true;
    for idx in 0..tx.input.len() {
        let coin = match coins_by_outpoint.get(&tx.input[idx].previous_output) {
            Some(coin) => *coin,
            None => continue,
        };

        debug!("Signing input {} ({})", idx, coin.outpoint);

        commands::hash_input_start(transport, new_transaction, &tx, idx, &trusted_inputs).await?;
        new_transaction = false;

        commands::hash_input_finalize_full(transport, &tx.output).await?;

        let sig = commands::hash_sign(transport, path, None, tx.lock_time, EcdsaSighashType::All)
            .await?;

        tx.input[idx].script_sig = match p2pkh_script_sig(&sig, &public_key) {
            Ok(script) => script,
            Err(_) => return Err(Error::InvalidResponse("signature too long to push")),
        };

        if !verifier.verify_spend(&coin.txout, &tx, idx) {
            warn!("Signature for input {} does not verify", idx);
            return Err(Error::VerificationFailed { input: idx });
        }
    }

    Ok(tx)
}
