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

use ledger_transport_hid::hidapi::HidApi;
use ledger_transport_hid::{LedgerHIDError, TransportNativeHID};
use log::info;

use crate::BtcApp;

impl BtcApp<TransportNativeHID> {
    /// Open the first Ledger found over HID
    pub fn open_hid(api: &HidApi) -> Result<Self, LedgerHIDError> {
        TransportNativeHID::new(api).map(BtcApp::new)
    }

    /// Open every Ledger attached over HID, one app per device
    pub fn list_hid(api: &HidApi) -> Result<Vec<Self>, LedgerHIDError> {
        let apps = TransportNativeHID::list_ledgers(api)
            .map(|device| TransportNativeHID::open_device(api, device).map(BtcApp::new))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Found {} Ledger device(s)", apps.len());
        Ok(apps)
    }
}
