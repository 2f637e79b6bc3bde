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

//! The message envelope exchanged with a contract process.

use std::error::Error as StdError;
use std::fmt;

use crate::protocol::contract::SignedProposal;
use crate::protos::{self, FromNative, FromProto, IntoNative, IntoProto, ProtoConversionError};

/// The type of a `ContractMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Undefined,
    Register,
    Registered,
    Init,
    Ready,
    Transaction,
    Completed,
    Error,
    GetState,
    PutState,
    DelState,
    InvokeContract,
    Response,
    GetStateByRange,
    GetQueryResult,
    QueryStateNext,
    QueryStateClose,
    Keepalive,
    GetHistoryForKey,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MessageType::Undefined => "UNDEFINED",
            MessageType::Register => "REGISTER",
            MessageType::Registered => "REGISTERED",
            MessageType::Init => "INIT",
            MessageType::Ready => "READY",
            MessageType::Transaction => "TRANSACTION",
            MessageType::Completed => "COMPLETED",
            MessageType::Error => "ERROR",
            MessageType::GetState => "GET_STATE",
            MessageType::PutState => "PUT_STATE",
            MessageType::DelState => "DEL_STATE",
            MessageType::InvokeContract => "INVOKE_CONTRACT",
            MessageType::Response => "RESPONSE",
            MessageType::GetStateByRange => "GET_STATE_BY_RANGE",
            MessageType::GetQueryResult => "GET_QUERY_RESULT",
            MessageType::QueryStateNext => "QUERY_STATE_NEXT",
            MessageType::QueryStateClose => "QUERY_STATE_CLOSE",
            MessageType::Keepalive => "KEEPALIVE",
            MessageType::GetHistoryForKey => "GET_HISTORY_FOR_KEY",
        };
        f.write_str(name)
    }
}

impl FromProto<protos::contract_shim::ContractMessage_Type> for MessageType {
    fn from_proto(
        proto: protos::contract_shim::ContractMessage_Type,
    ) -> Result<Self, ProtoConversionError> {
        use protos::contract_shim::ContractMessage_Type as ProtoType;

        Ok(match proto {
            ProtoType::UNDEFINED => MessageType::Undefined,
            ProtoType::REGISTER => MessageType::Register,
            ProtoType::REGISTERED => MessageType::Registered,
            ProtoType::INIT => MessageType::Init,
            ProtoType::READY => MessageType::Ready,
            ProtoType::TRANSACTION => MessageType::Transaction,
            ProtoType::COMPLETED => MessageType::Completed,
            ProtoType::ERROR => MessageType::Error,
            ProtoType::GET_STATE => MessageType::GetState,
            ProtoType::PUT_STATE => MessageType::PutState,
            ProtoType::DEL_STATE => MessageType::DelState,
            ProtoType::INVOKE_CONTRACT => MessageType::InvokeContract,
            ProtoType::RESPONSE => MessageType::Response,
            ProtoType::GET_STATE_BY_RANGE => MessageType::GetStateByRange,
            ProtoType::GET_QUERY_RESULT => MessageType::GetQueryResult,
            ProtoType::QUERY_STATE_NEXT => MessageType::QueryStateNext,
            ProtoType::QUERY_STATE_CLOSE => MessageType::QueryStateClose,
            ProtoType::KEEPALIVE => MessageType::Keepalive,
            ProtoType::GET_HISTORY_FOR_KEY => MessageType::GetHistoryForKey,
        })
    }
}

impl FromNative<MessageType> for protos::contract_shim::ContractMessage_Type {
    fn from_native(native: MessageType) -> Result<Self, ProtoConversionError> {
        use protos::contract_shim::ContractMessage_Type as ProtoType;

        Ok(match native {
            MessageType::Undefined => ProtoType::UNDEFINED,
            MessageType::Register => ProtoType::REGISTER,
            MessageType::Registered => ProtoType::REGISTERED,
            MessageType::Init => ProtoType::INIT,
            MessageType::Ready => ProtoType::READY,
            MessageType::Transaction => ProtoType::TRANSACTION,
            MessageType::Completed => ProtoType::COMPLETED,
            MessageType::Error => ProtoType::ERROR,
            MessageType::GetState => ProtoType::GET_STATE,
            MessageType::PutState => ProtoType::PUT_STATE,
            MessageType::DelState => ProtoType::DEL_STATE,
            MessageType::InvokeContract => ProtoType::INVOKE_CONTRACT,
            MessageType::Response => ProtoType::RESPONSE,
            MessageType::GetStateByRange => ProtoType::GET_STATE_BY_RANGE,
            MessageType::GetQueryResult => ProtoType::GET_QUERY_RESULT,
            MessageType::QueryStateNext => ProtoType::QUERY_STATE_NEXT,
            MessageType::QueryStateClose => ProtoType::QUERY_STATE_CLOSE,
            MessageType::Keepalive => ProtoType::KEEPALIVE,
            MessageType::GetHistoryForKey => ProtoType::GET_HISTORY_FOR_KEY,
        })
    }
}

impl IntoProto<protos::contract_shim::ContractMessage_Type> for MessageType {}
impl IntoNative<MessageType> for protos::contract_shim::ContractMessage_Type {}

/// A message exchanged between the node and a contract process.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractMessage {
    message_type: MessageType,
    channel_id: String,
    tx_id: String,
    payload: Vec<u8>,
    proposal: Option<SignedProposal>,
}

impl ContractMessage {
    /// Creates a message without a proposal.
    pub fn new(message_type: MessageType, channel_id: &str, tx_id: &str, payload: Vec<u8>) -> Self {
        ContractMessage {
            message_type,
            channel_id: channel_id.to_string(),
            tx_id: tx_id.to_string(),
            payload,
            proposal: None,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn proposal(&self) -> Option<&SignedProposal> {
        self.proposal.as_ref()
    }

    pub fn into_builder(self) -> ContractMessageBuilder {
        ContractMessageBuilder {
            message_type: Some(self.message_type),
            channel_id: Some(self.channel_id),
            tx_id: Some(self.tx_id),
            payload: Some(self.payload),
            proposal: self.proposal,
        }
    }
}

impl FromProto<protos::contract_shim::ContractMessage> for ContractMessage {
    fn from_proto(
        proto: protos::contract_shim::ContractMessage,
    ) -> Result<Self, ProtoConversionError> {
        let proposal = if proto.has_proposal() {
            Some(proto.get_proposal().clone().into_native()?)
        } else {
            None
        };

        Ok(ContractMessage {
            message_type: proto.get_field_type().into_native()?,
            channel_id: proto.get_channel_id().to_string(),
            tx_id: proto.get_txid().to_string(),
            payload: proto.get_payload().to_vec(),
            proposal,
        })
    }
}

impl FromNative<ContractMessage> for protos::contract_shim::ContractMessage {
    fn from_native(native: ContractMessage) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::ContractMessage::new();
        proto.set_field_type(native.message_type.into_proto()?);
        proto.set_channel_id(native.channel_id);
        proto.set_txid(native.tx_id);
        proto.set_payload(native.payload);
        if let Some(proposal) = native.proposal {
            proto.set_proposal(proposal.into_proto()?);
        }
        Ok(proto)
    }
}

impl_proto_bytes!(
    ContractMessage,
    protos::contract_shim::ContractMessage,
    "ContractMessage"
);

#[derive(Debug)]
pub enum ContractMessageBuildError {
    MissingField(String),
}

impl StdError for ContractMessageBuildError {}

impl fmt::Display for ContractMessageBuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ContractMessageBuildError::MissingField(ref s) => {
                write!(f, "'{}' field is required", s)
            }
        }
    }
}

/// Builder used to create a ContractMessage.
///
/// Only the message type is required; the channel id, transaction id and payload default to
/// empty values.
#[derive(Default, Clone, Debug)]
pub struct ContractMessageBuilder {
    message_type: Option<MessageType>,
    channel_id: Option<String>,
    tx_id: Option<String>,
    payload: Option<Vec<u8>>,
    proposal: Option<SignedProposal>,
}

impl ContractMessageBuilder {
    pub fn new() -> Self {
        ContractMessageBuilder::default()
    }

    pub fn with_message_type(mut self, message_type: MessageType) -> ContractMessageBuilder {
        self.message_type = Some(message_type);
        self
    }

    pub fn with_channel_id(mut self, channel_id: String) -> ContractMessageBuilder {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_tx_id(mut self, tx_id: String) -> ContractMessageBuilder {
        self.tx_id = Some(tx_id);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> ContractMessageBuilder {
        self.payload = Some(payload);
        self
    }

    pub fn with_proposal(mut self, proposal: SignedProposal) -> ContractMessageBuilder {
        self.proposal = Some(proposal);
        self
    }

    pub fn build(self) -> Result<ContractMessage, ContractMessageBuildError> {
        let message_type = self.message_type.ok_or_else(|| {
            ContractMessageBuildError::MissingField("message_type".to_string())
        })?;

        Ok(ContractMessage {
            message_type,
            channel_id: self.channel_id.unwrap_or_default(),
            tx_id: self.tx_id.unwrap_or_default(),
            payload: self.payload.unwrap_or_default(),
            proposal: self.proposal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protos::{FromBytes, IntoBytes};

    #[test]
    fn build_requires_message_type() {
        assert!(ContractMessageBuilder::new()
            .with_tx_id("txid".into())
            .build()
            .is_err());
    }

    #[test]
    fn message_bytes_with_proposal() {
        let message = ContractMessageBuilder::new()
            .with_message_type(MessageType::Ready)
            .with_channel_id("mychannel".into())
            .with_tx_id("0123456789".into())
            .with_proposal(SignedProposal::new(b"proposal".to_vec(), b"sig".to_vec()))
            .build()
            .expect("Unable to build message");

        let bytes = message.clone().into_bytes().expect("Unable to serialize");
        let parsed = ContractMessage::from_bytes(&bytes).expect("Unable to parse");

        assert_eq!(message, parsed);
        assert_eq!(
            b"proposal",
            parsed.proposal().expect("No proposal").proposal_bytes()
        );
    }

    #[test]
    fn message_type_names() {
        assert_eq!("GET_HISTORY_FOR_KEY", MessageType::GetHistoryForKey.to_string());
        assert_eq!("INVOKE_CONTRACT", MessageType::InvokeContract.to_string());
    }
}
