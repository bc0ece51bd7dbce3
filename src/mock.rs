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
//! Recording transport for unit tests

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Mutex;

use async_trait::async_trait;
use ledger_transport::{APDUAnswer, APDUCommand, Exchange};

#[derive(Debug, thiserror::Error)]
#[error("mock transport error")]
pub struct MockError;

/// A frame as seen by the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

/// Answers queued replies in order, `9000` with no data once they run out
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Vec<u8>>>,
    frames: Mutex<Vec<Frame>>,
}

impl MockTransport {
    pub fn reply(&self, data: &[u8], status: u16) -> &Self {
        let mut answer = data.to_vec();
        answer.extend_from_slice(&status.to_be_bytes());
        self.replies.lock().unwrap().push_back(answer);
        self
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockTransport {
    type Error = MockError;
    type AnswerType = Vec<u8>;

    async fn exchange<I>(
        &self,
        command: &APDUCommand<I>,
    ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
    where
        I: Deref<Target = [u8]> + Send + Sync,
    {
        self.frames.lock().unwrap().push(Frame {
            cla: command.cla,
            ins: command.ins,
            p1: command.p1,
            p2: command.p2,
            data: command.data.to_vec(),
        });

        let answer = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![0x90, 0x00]);

        APDUAnswer::from_answer(answer).map_err(|_| MockError)
    }
}
