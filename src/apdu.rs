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
//! Command framing and chunked transfer.
//!
//! Every frame sent to the device goes through [exchange], which refuses
//! payloads above [MAX_APDU_PAYLOAD] and only hands back a payload when the
//! status word is in the caller's accepted set.

use ledger_transport::{APDUCommand, Exchange};
use log::trace;

use crate::errors::{EncodingError, Error};
use crate::params::{InstructionCode, CLA, MAX_APDU_PAYLOAD, P1_MORE};

/// Fixed part of a command frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ApduHeader {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// First parameter byte
    pub p1: u8,
    /// Second parameter byte
    pub p2: u8,
}

impl ApduHeader {
    /// Header for a Bitcoin app instruction
    pub fn new(ins: InstructionCode, p1: u8, p2: u8) -> Self {
        ApduHeader {
            cla: CLA,
            ins: ins.into(),
            p1,
            p2,
        }
    }

    fn with_p1(self, p1: u8) -> Self {
        ApduHeader { p1, ..self }
    }
}

/// Send a single frame and check its status word.
///
/// Fails before any I/O when `data` does not fit a frame, and with
/// [Error::UnexpectedStatus] when the device answers outside `accepted`.
pub async fn exchange<E>(
    transport: &E,
    header: ApduHeader,
    data: Vec<u8>,
    accepted: &[u16],
) -> Result<Vec<u8>, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    if data.len() > MAX_APDU_PAYLOAD {
        return Err(EncodingError::PayloadTooLong(data.len()).into());
    }

    let command = APDUCommand {
        cla: header.cla,
        ins: header.ins,
        p1: header.p1,
        p2: header.p2,
        data,
    };

    let response = transport
        .exchange(&command)
        .await
        .map_err(Error::Transport)?;

    let status = response.retcode();
    trace!(
        "apdu {:02x} {:02x} {:02x} {:02x} len={} -> {:04x}",
        header.cla,
        header.ins,
        header.p1,
        header.p2,
        command.data.len(),
        status
    );

    if !accepted.contains(&status) {
        return Err(Error::UnexpectedStatus(status));
    }

    Ok(response.data().to_vec())
}

/// Stream `data` over as many frames as needed.
///
/// The first frame carries `header.p1`, every following frame [P1_MORE].
/// Only the last response is returned; an empty `data` sends nothing.
pub async fn exchange_split<E>(
    transport: &E,
    header: ApduHeader,
    data: &[u8],
    accepted: &[u16],
) -> Result<Vec<u8>, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    let mut response = Vec::new();

    for (idx, chunk) in data.chunks(MAX_APDU_PAYLOAD).enumerate() {
        let p1 = if idx == 0 { header.p1 } else { P1_MORE };
        response = exchange(transport, header.with_p1(p1), chunk.to_vec(), accepted).await?;
    }

    Ok(response)
}

/// Stream `data` like [exchange_split], gluing `trailer` to the tail of the last frame.
///
/// At least one frame is always sent so the trailer reaches the device even
/// when `data` is empty.
pub async fn exchange_split_with_trailer<E>(
    transport: &E,
    header: ApduHeader,
    data: &[u8],
    trailer: &[u8],
    accepted: &[u16],
) -> Result<Vec<u8>, Error<E::Error>>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    if trailer.len() >= MAX_APDU_PAYLOAD {
        return Err(EncodingError::PayloadTooLong(trailer.len()).into());
    }

    let mut chunks: Vec<&[u8]> = data.chunks(MAX_APDU_PAYLOAD - trailer.len()).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    let last = chunks.len() - 1;
    let mut response = Vec::new();

    for (idx, chunk) in chunks.into_iter().enumerate() {
        let p1 = if idx == 0 { header.p1 } else { P1_MORE };

        let mut payload = chunk.to_vec();
        if idx == last {
            payload.extend_from_slice(trailer);
        }

        response = exchange(transport, header.with_p1(p1), payload, accepted).await?;
    }

    Ok(response)
}
