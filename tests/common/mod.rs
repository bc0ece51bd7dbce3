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
//! Software stand-in for the btchip app.
//!
//! Holds a single key, rebuilds the streamed transactions the way the device
//! does and signs the legacy signature hash of whatever input carries a script.

#![allow(dead_code)]

use std::ops::Deref;
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Address, Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use ledger_btchip::wire::read_varint;
use ledger_transport::{APDUAnswer, APDUCommand, Exchange};

pub const INS_GET_WALLET_PUBLIC_KEY: u8 = 0x40;
pub const INS_GET_TRUSTED_INPUT: u8 = 0x42;
pub const INS_HASH_INPUT_START: u8 = 0x44;
pub const INS_HASH_SIGN: u8 = 0x48;
pub const INS_HASH_INPUT_FINALIZE_FULL: u8 = 0x4A;

#[derive(Debug, thiserror::Error)]
#[error("emulator failure")]
pub struct EmulatorError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct State {
    frames: Vec<Frame>,
    parent: Vec<u8>,
    output_index: u32,
    stream: Vec<u8>,
    pending: usize,
}

pub struct Emulator {
    secp: Secp256k1<All>,
    key: SecretKey,
    state: Mutex<State>,
}

impl Emulator {
    pub fn new(seed: u8) -> Self {
        Emulator {
            secp: Secp256k1::new(),
            key: SecretKey::from_slice(&[seed; 32]).unwrap(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.key.public_key(&self.secp))
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&self.public_key().pubkey_hash())
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.state.lock().unwrap().frames.clone()
    }

    fn wallet_public_key(&self) -> Vec<u8> {
        let pk = self.key.public_key(&self.secp);
        let address = Address::p2pkh(self.public_key(), Network::Bitcoin).to_string();

        let mut out = vec![65];
        out.extend_from_slice(&pk.serialize_uncompressed());
        out.push(address.len() as u8);
        out.extend_from_slice(address.as_bytes());
        out.extend_from_slice(&[0x5c; 32]);
        out
    }

    fn trusted_input(&self, state: &mut State, p1: u8, data: &[u8]) -> Vec<u8> {
        if p1 == 0x00 {
            state.output_index = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            state.parent = data[4..].to_vec();
        } else {
            state.parent.extend_from_slice(data);
        }

        let parent: Transaction = match consensus::deserialize(&state.parent) {
            Ok(tx) => tx,
            Err(_) => return Vec::new(),
        };
        state.parent.clear();

        let index = state.output_index;
        let amount = parent.output[index as usize].value.to_sat();

        let mut blob = vec![0x32, 0x00, 0x00, index as u8];
        blob.extend_from_slice(&consensus::serialize(&OutPoint::new(
            parent.compute_txid(),
            index,
        )));
        blob.extend_from_slice(&amount.to_le_bytes());
        blob.extend_from_slice(&[0xa5; 8]);
        blob
    }

    fn hash_input_start(&self, state: &mut State, p1: u8, data: &[u8]) {
        if p1 == 0x00 {
            state.stream = data.to_vec();
            state.pending = 0;
            return;
        }

        if state.pending > 0 {
            state.stream.extend_from_slice(data);
            state.pending -= data.len();
            return;
        }

        // Input header: swap the trusted blob for the outpoint it attests
        let rest = match data[0] {
            0x01 => {
                let len = data[1] as usize;
                let blob = &data[2..2 + len];
                state.stream.extend_from_slice(&blob[4..40]);
                &data[2 + len..]
            }
            _ => {
                state.stream.extend_from_slice(&data[1..37]);
                &data[37..]
            }
        };
        state.stream.extend_from_slice(rest);

        let (script_len, _) = read_varint(rest).unwrap();
        state.pending = script_len as usize + 4;
    }

    fn hash_sign(&self, state: &mut State, data: &[u8]) -> Vec<u8> {
        let depth = data[0] as usize;
        let pin_len = data[1 + 4 * depth] as usize;
        let at = 2 + 4 * depth + pin_len;
        let lock_time = u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let sighash_type = data[at + 4];

        let mut stream = std::mem::take(&mut state.stream);
        stream.extend_from_slice(&lock_time.to_le_bytes());
        let tx: Transaction = consensus::deserialize(&stream).unwrap();

        let (idx, script_code) = tx
            .input
            .iter()
            .enumerate()
            .find(|(_, i)| !i.script_sig.is_empty())
            .map(|(idx, i)| (idx, i.script_sig.clone()))
            .unwrap();

        let sighash = SighashCache::new(&tx)
            .legacy_signature_hash(idx, &script_code, sighash_type as u32)
            .unwrap();
        let sig = self
            .secp
            .sign_ecdsa(&Message::from_digest(sighash.to_byte_array()), &self.key);

        let mut out = sig.serialize_der().to_vec();
        out.push(sighash_type);
        // The device reports the parity of R in place of the sequence tag
        out[0] = 0x31;
        out
    }

    fn process(&self, frame: Frame) -> (Vec<u8>, u16) {
        let mut state = self.state.lock().unwrap();
        state.frames.push(frame.clone());

        let data = &frame.data;
        match frame.ins {
            INS_GET_WALLET_PUBLIC_KEY => (self.wallet_public_key(), 0x9000),
            INS_GET_TRUSTED_INPUT => (self.trusted_input(&mut state, frame.p1, data), 0x9000),
            INS_HASH_INPUT_START => {
                self.hash_input_start(&mut state, frame.p1, data);
                (Vec::new(), 0x9000)
            }
            INS_HASH_INPUT_FINALIZE_FULL => {
                state.stream.extend_from_slice(data);
                if frame.p1 == 0x80 {
                    (vec![0x00, 0x00], 0x9000)
                } else {
                    (Vec::new(), 0x9000)
                }
            }
            INS_HASH_SIGN => (self.hash_sign(&mut state, data), 0x9000),
            _ => (Vec::new(), 0x6D00),
        }
    }
}

#[async_trait]
impl Exchange for Emulator {
    type Error = EmulatorError;
    type AnswerType = Vec<u8>;

    async fn exchange<I>(
        &self,
        command: &APDUCommand<I>,
    ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
    where
        I: Deref<Target = [u8]> + Send + Sync,
    {
        tokio::task::yield_now().await;

        let (mut answer, status) = self.process(Frame {
            cla: command.cla,
            ins: command.ins,
            p1: command.p1,
            p2: command.p2,
            data: command.data.to_vec(),
        });

        tokio::task::yield_now().await;

        answer.extend_from_slice(&status.to_be_bytes());
        APDUAnswer::from_answer(answer).map_err(|_| EmulatorError)
    }
}

/// A funding transaction paying `sats` to each of `scripts`
pub fn parent(tag: u8, outputs: &[(ScriptBuf, u64)]) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([tag; 32]), 0),
            script_sig: ScriptBuf::from_bytes(vec![0x51]),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs
            .iter()
            .map(|(script, sats)| TxOut {
                value: Amount::from_sat(*sats),
                script_pubkey: script.clone(),
            })
            .collect(),
    }
}

/// An unsigned transaction spending `prevouts`
pub fn spend(prevouts: &[OutPoint], outputs: &[(ScriptBuf, u64)], lock_time: u32) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::from_consensus(lock_time),
        input: prevouts
            .iter()
            .map(|prevout| TxIn {
                previous_output: *prevout,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|(script, sats)| TxOut {
                value: Amount::from_sat(*sats),
                script_pubkey: script.clone(),
            })
            .collect(),
    }
}
