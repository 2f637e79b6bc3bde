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

//! Contract identity, invocation and proposal structs.

use protobuf::RepeatedField;

use crate::protos::{self, FromNative, FromProto, IntoNative, IntoProto, ProtoConversionError};

/// Identifies a contract as registered by the contract process.
///
/// The name may be composite, in the form `name:version/channel`; see
/// `ContractInstance::from_name`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractId {
    path: String,
    name: String,
    version: String,
}

impl ContractId {
    pub fn new(name: &str) -> Self {
        ContractId {
            path: String::new(),
            name: name.to_string(),
            version: String::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }
}

impl FromProto<protos::contract::ContractId> for ContractId {
    fn from_proto(proto: protos::contract::ContractId) -> Result<Self, ProtoConversionError> {
        Ok(ContractId {
            path: proto.get_path().to_string(),
            name: proto.get_name().to_string(),
            version: proto.get_version().to_string(),
        })
    }
}

impl FromNative<ContractId> for protos::contract::ContractId {
    fn from_native(native: ContractId) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract::ContractId::new();
        proto.set_path(native.path);
        proto.set_name(native.name);
        proto.set_version(native.version);
        Ok(proto)
    }
}

impl_proto_bytes!(ContractId, protos::contract::ContractId, "ContractId");

/// The decomposed form of a composite contract name, `name:version/channel`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractInstance {
    name: String,
    version: String,
    channel_id: String,
}

impl ContractInstance {
    /// Splits a contract name of the form `name:version/channel` into its parts.
    ///
    /// The channel is everything after the first `/`, the version everything after the
    /// first `:` that precedes it.  Missing or empty parts are left empty.
    pub fn from_name(contract_name: &str) -> Self {
        let mut remaining = contract_name;
        let mut channel_id = String::new();
        let mut version = String::new();

        if let Some(i) = remaining.find('/') {
            channel_id = remaining[i + 1..].to_string();
            remaining = &remaining[..i];
        }

        if let Some(i) = remaining.find(':') {
            version = remaining[i + 1..].to_string();
            remaining = &remaining[..i];
        }

        ContractInstance {
            name: remaining.to_string(),
            version,
            channel_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// The key a session of this contract is registered under: `name:version`, or just the
    /// name when the version is unknown.
    pub fn handler_key(&self) -> String {
        if self.version.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.version)
        }
    }

    pub(crate) fn set_channel_id(&mut self, channel_id: &str) {
        self.channel_id = channel_id.to_string();
    }

    pub(crate) fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
    }
}

/// Arguments passed to an invoked contract.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractInput {
    args: Vec<Vec<u8>>,
}

impl ContractInput {
    pub fn new(args: Vec<Vec<u8>>) -> Self {
        ContractInput { args }
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }
}

impl FromProto<protos::contract::ContractInput> for ContractInput {
    fn from_proto(proto: protos::contract::ContractInput) -> Result<Self, ProtoConversionError> {
        Ok(ContractInput {
            args: proto.get_args().to_vec(),
        })
    }
}

impl FromNative<ContractInput> for protos::contract::ContractInput {
    fn from_native(native: ContractInput) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract::ContractInput::new();
        proto.set_args(RepeatedField::from_vec(native.args));
        Ok(proto)
    }
}

impl_proto_bytes!(
    ContractInput,
    protos::contract::ContractInput,
    "ContractInput"
);

/// The payload of an INVOKE_CONTRACT request: the target contract and its input.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractSpec {
    contract_id: ContractId,
    input: ContractInput,
}

impl ContractSpec {
    pub fn new(contract_id: ContractId, input: ContractInput) -> Self {
        ContractSpec { contract_id, input }
    }

    pub fn contract_id(&self) -> &ContractId {
        &self.contract_id
    }

    pub fn input(&self) -> &ContractInput {
        &self.input
    }

    /// Replaces the target contract id, keeping the input.
    pub fn with_contract_id(mut self, contract_id: ContractId) -> Self {
        self.contract_id = contract_id;
        self
    }
}

impl FromProto<protos::contract::ContractSpec> for ContractSpec {
    fn from_proto(proto: protos::contract::ContractSpec) -> Result<Self, ProtoConversionError> {
        if !proto.has_contract_id() {
            return Err(ProtoConversionError::InvalidTypeError(
                "Cannot convert ContractSpec without a contract id".to_string(),
            ));
        }

        Ok(ContractSpec {
            contract_id: proto.get_contract_id().clone().into_native()?,
            input: proto.get_input().clone().into_native()?,
        })
    }
}

impl FromNative<ContractSpec> for protos::contract::ContractSpec {
    fn from_native(native: ContractSpec) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract::ContractSpec::new();
        proto.set_contract_id(native.contract_id.into_proto()?);
        proto.set_input(native.input.into_proto()?);
        Ok(proto)
    }
}

impl_proto_bytes!(ContractSpec, protos::contract::ContractSpec, "ContractSpec");

/// A proposal together with the signature of its creator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignedProposal {
    proposal_bytes: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedProposal {
    pub fn new(proposal_bytes: Vec<u8>, signature: Vec<u8>) -> Self {
        SignedProposal {
            proposal_bytes,
            signature,
        }
    }

    pub fn proposal_bytes(&self) -> &[u8] {
        &self.proposal_bytes
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

impl FromProto<protos::contract::SignedProposal> for SignedProposal {
    fn from_proto(proto: protos::contract::SignedProposal) -> Result<Self, ProtoConversionError> {
        Ok(SignedProposal {
            proposal_bytes: proto.get_proposal_bytes().to_vec(),
            signature: proto.get_signature().to_vec(),
        })
    }
}

impl FromNative<SignedProposal> for protos::contract::SignedProposal {
    fn from_native(native: SignedProposal) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract::SignedProposal::new();
        proto.set_proposal_bytes(native.proposal_bytes);
        proto.set_signature(native.signature);
        Ok(proto)
    }
}

impl_proto_bytes!(
    SignedProposal,
    protos::contract::SignedProposal,
    "SignedProposal"
);

/// The decoded proposal a transaction was started from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Proposal {
    header: Vec<u8>,
    payload: Vec<u8>,
    extension: Vec<u8>,
}

impl Proposal {
    pub fn new(header: Vec<u8>, payload: Vec<u8>, extension: Vec<u8>) -> Self {
        Proposal {
            header,
            payload,
            extension,
        }
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn extension(&self) -> &[u8] {
        &self.extension
    }
}

impl FromProto<protos::contract::Proposal> for Proposal {
    fn from_proto(proto: protos::contract::Proposal) -> Result<Self, ProtoConversionError> {
        Ok(Proposal {
            header: proto.get_header().to_vec(),
            payload: proto.get_payload().to_vec(),
            extension: proto.get_extension().to_vec(),
        })
    }
}

impl FromNative<Proposal> for protos::contract::Proposal {
    fn from_native(native: Proposal) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract::Proposal::new();
        proto.set_header(native.header);
        proto.set_payload(native.payload);
        proto.set_extension(native.extension);
        Ok(proto)
    }
}

impl_proto_bytes!(Proposal, protos::contract::Proposal, "Proposal");

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protos::{FromBytes, IntoBytes};

    #[test]
    fn contract_instance_full_name() {
        let instance = ContractInstance::from_name("marbles:1.2/mychannel");
        assert_eq!("marbles", instance.name());
        assert_eq!("1.2", instance.version());
        assert_eq!("mychannel", instance.channel_id());
    }

    #[test]
    fn contract_instance_partial_names() {
        let instance = ContractInstance::from_name("marbles");
        assert_eq!("marbles", instance.name());
        assert_eq!("", instance.version());
        assert_eq!("", instance.channel_id());

        let instance = ContractInstance::from_name("marbles:1.0");
        assert_eq!("marbles", instance.name());
        assert_eq!("1.0", instance.version());
        assert_eq!("", instance.channel_id());

        let instance = ContractInstance::from_name("marbles/mychannel");
        assert_eq!("marbles", instance.name());
        assert_eq!("", instance.version());
        assert_eq!("mychannel", instance.channel_id());

        // A trailing separator leaves the part empty.
        let instance = ContractInstance::from_name("marbles:/");
        assert_eq!("marbles", instance.name());
        assert_eq!("", instance.version());
        assert_eq!("", instance.channel_id());
    }

    #[test]
    fn handler_key_includes_version() {
        assert_eq!(
            "marbles:1.2",
            ContractInstance::from_name("marbles:1.2/mychannel").handler_key()
        );
        assert_eq!(
            "marbles",
            ContractInstance::from_name("marbles/mychannel").handler_key()
        );
    }

    #[test]
    fn contract_spec_requires_contract_id() {
        let proto = protos::contract::ContractSpec::new();
        assert!(ContractSpec::from_proto(proto).is_err());
    }

    #[test]
    fn contract_spec_bytes() {
        let spec = ContractSpec::new(
            ContractId::new("target:1.0/other").with_path("github.com/target"),
            ContractInput::new(vec![b"invoke".to_vec(), b"a".to_vec()]),
        );

        let bytes = spec.clone().into_bytes().expect("Unable to serialize spec");
        let parsed = ContractSpec::from_bytes(&bytes).expect("Unable to parse spec");

        assert_eq!(spec, parsed);
        assert_eq!("github.com/target", parsed.contract_id().path());
    }
}
