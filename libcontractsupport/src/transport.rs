/*
 * Copyright 2019 Cargill Incorporated
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 * -----------------------------------------------------------------------------
 */

//! The boundary between a session and the connection to its contract process.

use std::error::Error;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

use crate::protocol::message::ContractMessage;
use crate::protos::{FromBytes, IntoBytes, ProtoConversionError};

#[derive(Debug)]
pub enum TransportError {
    /// The message could not be encoded or decoded.
    CodecError(ProtoConversionError),
    /// The peer is gone.
    Disconnected,
    /// Some other failure of the underlying connection.
    ConnectionError(String),
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::CodecError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::CodecError(err) => write!(f, "unable to decode message: {}", err),
            TransportError::Disconnected => f.write_str("stream disconnected"),
            TransportError::ConnectionError(msg) => write!(f, "connection error: {}", msg),
        }
    }
}

impl From<ProtoConversionError> for TransportError {
    fn from(err: ProtoConversionError) -> Self {
        TransportError::CodecError(err)
    }
}

/// A bidirectional message stream to a contract process.
pub trait ContractStream: Send + Sync {
    fn send(&self, msg: &ContractMessage) -> Result<(), TransportError>;

    /// Blocks until the next message arrives.  Returns `None` at end of stream.
    fn recv(&self) -> Result<Option<ContractMessage>, TransportError>;

    /// Closes the sending half of the stream.
    fn close(&self) {}
}

/// An in-process `ContractStream` carrying encoded messages over mpsc channels.
pub struct ChannelStream {
    sender: Mutex<Option<Sender<Vec<u8>>>>,
    receiver: Mutex<Receiver<Vec<u8>>>,
}

impl ChannelStream {
    /// Creates two connected ends; whatever one end sends, the other receives.
    pub fn pair() -> (ChannelStream, ChannelStream) {
        let (left_tx, left_rx) = channel();
        let (right_tx, right_rx) = channel();
        (
            ChannelStream {
                sender: Mutex::new(Some(left_tx)),
                receiver: Mutex::new(right_rx),
            },
            ChannelStream {
                sender: Mutex::new(Some(right_tx)),
                receiver: Mutex::new(left_rx),
            },
        )
    }

    /// Waits at most `timeout` for the next message.  Returns `None` if none arrived in time.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<ContractMessage>, TransportError> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| TransportError::ConnectionError("receiver lock poisoned".into()))?;
        match receiver.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(ContractMessage::from_bytes(&bytes)?)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

impl ContractStream for ChannelStream {
    fn send(&self, msg: &ContractMessage) -> Result<(), TransportError> {
        let bytes = msg.clone().into_bytes()?;
        let sender = self
            .sender
            .lock()
            .map_err(|_| TransportError::ConnectionError("sender lock poisoned".into()))?;
        match sender.as_ref() {
            Some(sender) => sender
                .send(bytes)
                .map_err(|_| TransportError::Disconnected),
            None => Err(TransportError::Disconnected),
        }
    }

    fn recv(&self) -> Result<Option<ContractMessage>, TransportError> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| TransportError::ConnectionError("receiver lock poisoned".into()))?;
        match receiver.recv() {
            Ok(bytes) => Ok(Some(ContractMessage::from_bytes(&bytes)?)),
            Err(_) => Ok(None),
        }
    }

    fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::message::MessageType;

    #[test]
    fn send_and_close() {
        let (node, contract) = ChannelStream::pair();
        let msg = ContractMessage::new(MessageType::GetState, "ch", "tx1", b"payload".to_vec());

        node.send(&msg).unwrap();
        assert_eq!(Some(msg), contract.recv().unwrap());

        contract.close();
        assert_eq!(None, node.recv().unwrap());
        assert!(contract.send(&ContractMessage::new(MessageType::Ready, "", "", vec![])).is_err());
    }
}
