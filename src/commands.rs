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
//! Device commands, run against a transport the caller already holds.
//!
//! Nothing here takes the session lock: [crate::BtcApp] wraps each of these in
//! a single lock scope, and the signing flow chains several of them under one.

use std::collections::HashMap;

use bitcoin::absolute::LockTime;
use bitcoin::bip32::DerivationPath;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{ecdsa, OutPoint, Transaction, TxOut};
use ledger_transport::Exchange;
use log::debug;

use crate::apdu::{exchange, exchange_split, exchange_split_with_trailer, ApduHeader};
use crate::errors::{EncodingError, Error};
use crate::firmware::Firmware;
use crate::keys::{serialize_path, WalletPublicKey};
use crate::params::{
    InstructionCode, DER_SEQUENCE_TAG, INPUT_TRUSTED, INPUT_UNTRUSTED, MAX_APDU_PAYLOAD, OK,
    P1_FIRST, P1_LAST, P1_MORE, P1_NONE, P1_NOT_LAST, P2_CONTINUE_TRANSACTION, P2_NEW_TRANSACTION,
    P2_NONE,
};
use crate::trusted_input::TrustedInput;
use crate::wire::{write_buffer, write_u32_be, write_u32_le, write_u64_le, write_varint};

/// Retrieve the firmware version
pub async fn firmware_version<E>(transport: &E) -> Result<Firmware, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    let header = ApduHeader::new(InstructionCode::GetFirmwareVersion, P1_NONE, P2_NONE);
    let response = exchange(transport, header, Vec::new(), OK).await?;

    Firmware::from_bytes(&response).ok_or(Error::InvalidResponse("firmware version too short"))
}

/// Retrieve the public key and chain code for `path`
pub async fn wallet_public_key<E>(
    transport: &E,
    path: &DerivationPath,
) -> Result<WalletPublicKey, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    let serialized_path = serialize_path(path)?;

    let header = ApduHeader::new(InstructionCode::GetWalletPublicKey, P1_NONE, P2_NONE);
    let response = exchange(transport, header, serialized_path, OK).await?;

    WalletPublicKey::from_bytes(&response)
}

/// Replay `tx` to the device and obtain a trusted input for output `output_index`
pub async fn trusted_input<E>(
    transport: &E,
    tx: &Transaction,
    output_index: usize,
) -> Result<TrustedInput, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    if output_index >= tx.output.len() {
        return Err(EncodingError::OutputIndexOutOfRange {
            index: output_index,
            count: tx.output.len(),
        }
        .into());
    }
    let index = u32::try_from(output_index).map_err(|_| EncodingError::OutputIndexOutOfRange {
        index: output_index,
        count: tx.output.len(),
    })?;

    debug!(
        "Requesting trusted input for {}:{}",
        tx.compute_txid(),
        output_index
    );

    let first = ApduHeader::new(InstructionCode::GetTrustedInput, P1_FIRST, P2_NONE);
    let next = ApduHeader::new(InstructionCode::GetTrustedInput, P1_MORE, P2_NONE);

    // Header
    let mut data = Vec::new();
    write_u32_be(&mut data, index);
    write_u32_le(&mut data, tx.version.0 as u32);
    write_varint(&mut data, tx.input.len() as u64);
    exchange(transport, first, data, OK).await?;

    // Inputs
    for input in &tx.input {
        let mut data = bitcoin::consensus::serialize(&input.previous_output);
        write_varint(&mut data, input.script_sig.len() as u64);
        exchange(transport, next, data, OK).await?;

        let sequence = input.sequence.0.to_le_bytes();
        exchange_split_with_trailer(transport, next, input.script_sig.as_bytes(), &sequence, OK)
            .await?;
    }

    // Outputs
    let mut data = Vec::new();
    write_varint(&mut data, tx.output.len() as u64);
    exchange(transport, next, data, OK).await?;

    for output in &tx.output {
        let mut data = Vec::new();
        write_u64_le(&mut data, output.value.to_sat());
        write_varint(&mut data, output.script_pubkey.len() as u64);
        exchange(transport, next, data, OK).await?;

        exchange_split(transport, next, output.script_pubkey.as_bytes(), OK).await?;
    }

    // Lock time
    let mut data = Vec::new();
    write_u32_le(&mut data, tx.lock_time.to_consensus_u32());
    let response = exchange(transport, next, data, OK).await?;

    TrustedInput::from_bytes(response)
}

/// Start hashing `tx` on the device, carrying the script of `input_index` only.
///
/// `new_transaction` resets the device-side hashing state; every later input
/// of the same signing session continues it. Inputs with a matching entry in
/// `trusted_inputs` are proven with it, the others are sent as raw outpoints.
pub async fn hash_input_start<E>(
    transport: &E,
    new_transaction: bool,
    tx: &Transaction,
    input_index: usize,
    trusted_inputs: &[TrustedInput],
) -> Result<(), Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    if input_index >= tx.input.len() {
        return Err(EncodingError::InputIndexOutOfRange {
            index: input_index,
            count: tx.input.len(),
        }
        .into());
    }

    let by_outpoint: HashMap<OutPoint, &TrustedInput> = trusted_inputs
        .iter()
        .map(|t| (t.outpoint(), t))
        .collect();

    let p2 = if new_transaction {
        P2_NEW_TRANSACTION
    } else {
        P2_CONTINUE_TRANSACTION
    };

    let mut data = Vec::new();
    write_u32_le(&mut data, tx.version.0 as u32);
    write_varint(&mut data, tx.input.len() as u64);
    exchange(
        transport,
        ApduHeader::new(InstructionCode::HashInputStart, P1_FIRST, p2),
        data,
        OK,
    )
    .await?;

    let next = ApduHeader::new(InstructionCode::HashInputStart, P1_MORE, P2_NONE);

    for (idx, input) in tx.input.iter().enumerate() {
        let script: &[u8] = if idx == input_index {
            input.script_sig.as_bytes()
        } else {
            &[]
        };

        let mut data = Vec::new();
        match by_outpoint.get(&input.previous_output) {
            Some(trusted) => {
                let blob = trusted.as_bytes();
                if blob.len() > MAX_APDU_PAYLOAD {
                    return Err(EncodingError::PayloadTooLong(blob.len()).into());
                }
                data.push(INPUT_TRUSTED);
                data.push(blob.len() as u8);
                write_buffer(&mut data, blob);
            }
            None => {
                data.push(INPUT_UNTRUSTED);
                write_buffer(
                    &mut data,
                    &bitcoin::consensus::serialize(&input.previous_output),
                );
            }
        }
        write_varint(&mut data, script.len() as u64);
        exchange(transport, next, data, OK).await?;

        let mut data = script.to_vec();
        write_u32_le(&mut data, input.sequence.0);
        exchange_split(transport, next, &data, OK).await?;
    }

    Ok(())
}

/// Stream the full output set of the transaction being signed.
///
/// Fails with [Error::UnsupportedConfirmationFlow] when the device leaves the
/// host nothing to work with.
pub async fn hash_input_finalize_full<E>(
    transport: &E,
    outputs: &[TxOut],
) -> Result<Vec<u8>, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    let mut data = Vec::new();
    write_varint(&mut data, outputs.len() as u64);
    for output in outputs {
        write_u64_le(&mut data, output.value.to_sat());
        write_varint(&mut data, output.script_pubkey.len() as u64);
        write_buffer(&mut data, output.script_pubkey.as_bytes());
    }

    let mut response = None;
    let mut offset = 0;
    while offset < data.len() {
        let block = (data.len() - offset).min(MAX_APDU_PAYLOAD);
        let p1 = if offset + block == data.len() {
            P1_LAST
        } else {
            P1_NOT_LAST
        };

        let header = ApduHeader::new(InstructionCode::HashInputFinalizeFull, p1, P2_NONE);
        response = Some(exchange(transport, header, data[offset..offset + block].to_vec(), OK).await?);
        offset += block;
    }

    match response {
        Some(r) if !r.is_empty() => Ok(r),
        _ => Err(Error::UnsupportedConfirmationFlow),
    }
}

/// Sign the transaction hashed so far
pub async fn hash_sign<E>(
    transport: &E,
    path: &DerivationPath,
    pin: Option<&[u8]>,
    lock_time: LockTime,
    sighash_type: EcdsaSighashType,
) -> Result<ecdsa::Signature, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    let pin = pin.unwrap_or(&[]);
    if pin.len() > u8::MAX as usize {
        return Err(EncodingError::PinTooLong(pin.len()).into());
    }

    let mut data = serialize_path(path)?;
    data.push(pin.len() as u8);
    write_buffer(&mut data, pin);
    write_u32_be(&mut data, lock_time.to_consensus_u32());
    data.push(sighash_type.to_u32() as u8);

    let header = ApduHeader::new(InstructionCode::HashSign, P1_NONE, P2_NONE);
    let response = exchange(transport, header, data, OK).await?;

    parse_signature(response)
}

/// Restore the DER sequence tag the device leaves out and decode the signature
pub fn parse_signature<E: std::error::Error>(
    mut response: Vec<u8>,
) -> Result<ecdsa::Signature, Error<E>> {
    match response.first_mut() {
        Some(tag) => *tag = DER_SEQUENCE_TAG,
        None => return Err(Error::InvalidResponse("empty signature")),
    }

    Ok(ecdsa::Signature::from_slice(&response)?)
}
