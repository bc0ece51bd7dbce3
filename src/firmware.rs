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

use std::fmt;

use crate::params::FIRMWARE_VERSION_LEN;

/// Top two bits of the feature byte are reserved
const RESERVED_FEATURE_BITS: u8 = 0xC0;

bitflags::bitflags! {
    /// Firmware feature flags
    pub struct FirmwareFeatures: u8 {
        /// Public keys are returned compressed
        const COMPRESSED = 0x01;
        /// Device has its own screen and buttons
        const SECURE_ELEMENT_UI = 0x02;
        /// Device takes user input externally
        const EXTERNAL_UI = 0x04;
        /// NFC and payment extensions
        const NFC = 0x08;
        /// BLE and low power extensions
        const BLE = 0x10;
        /// Running on a trusted execution environment
        const TRUSTED_ENVIRONMENT_EXECUTION = 0x20;
    }
}

/// Bitcoin app firmware version
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Firmware {
    /// Feature flags
    pub features: FirmwareFeatures,
    /// Architecture
    pub architecture: u8,
    /// Version Major
    pub major: u8,
    /// Version Minor
    pub minor: u8,
    /// Version Patch
    pub patch: u8,
    /// Loader Minor
    pub loader_minor: u8,
    /// Loader Major
    pub loader_major: u8,
}

impl Firmware {
    /// Decode a firmware version response, `None` when too short
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FIRMWARE_VERSION_LEN {
            return None;
        }

        Some(Firmware {
            features: FirmwareFeatures::from_bits_truncate(bytes[0] & !RESERVED_FEATURE_BITS),
            architecture: bytes[1],
            major: bytes[2],
            minor: bytes[3],
            patch: bytes[4],
            loader_minor: bytes[5],
            loader_major: bytes[6],
        })
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.architecture != 0 {
            write!(f, "Ledger ")?;
        }
        write!(
            f,
            "{}.{}.{} (Loader : {}.{})",
            self.major, self.minor, self.patch, self.loader_major, self.loader_minor
        )
    }
}
