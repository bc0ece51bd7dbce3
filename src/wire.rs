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
//! Wire primitives shared by every command payload.
//!
//! The protocol mixes two length prefixes: script lengths and input/output
//! counts are varints ([write_varint]), while the trusted input length in the
//! hash-input-start stream, the PIN length and the path element count are a
//! single byte written directly by the call site. [write_buffer] never adds a
//! prefix of its own.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Append `v` as 4 bytes, most significant first
pub fn write_u32_be(buf: &mut Vec<u8>, v: u32) {
    let mut b = [0u8; 4];
    BigEndian::write_u32(&mut b, v);
    buf.extend_from_slice(&b);
}

/// Append `v` as 4 bytes, least significant first
pub fn write_u32_le(buf: &mut Vec<u8>, v: u32) {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, v);
    buf.extend_from_slice(&b);
}

/// Append `v` as 8 bytes, least significant first
pub fn write_u64_le(buf: &mut Vec<u8>, v: u64) {
    let mut b = [0u8; 8];
    LittleEndian::write_u64(&mut b, v);
    buf.extend_from_slice(&b);
}

/// Append `n` using the compact size encoding
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xFC => buf.push(n as u8),
        0xFD..=0xFFFF => {
            let mut b = [0u8; 2];
            LittleEndian::write_u16(&mut b, n as u16);
            buf.push(0xFD);
            buf.extend_from_slice(&b);
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.push(0xFE);
            write_u32_le(buf, n as u32);
        }
        _ => {
            buf.push(0xFF);
            write_u64_le(buf, n);
        }
    }
}

/// Decode a compact size integer, returning the value and the number of bytes consumed
pub fn read_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let (prefix, rest) = buf.split_first()?;

    let width = match prefix {
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
        n => return Some((u64::from(*n), 1)),
    };

    if rest.len() < width {
        return None;
    }

    let v = LittleEndian::read_uint(&rest[..width], width);
    Some((v, 1 + width))
}

/// Append raw bytes verbatim
pub fn write_buffer(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
}
