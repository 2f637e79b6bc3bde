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

//! Ledger access requests sent by a contract process.
//!
//! Requests that accept a collection address private data when the collection is set, and
//! public state otherwise.

use super::collection_from_proto;
use crate::protos::{self, FromNative, FromProto, ProtoConversionError};

#[derive(Debug, Clone, PartialEq)]
pub struct GetState {
    key: String,
    collection: Option<String>,
}

impl GetState {
    pub fn new(key: &str, collection: Option<&str>) -> Self {
        GetState {
            key: key.to_string(),
            collection: collection.map(String::from),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }
}

impl FromProto<protos::contract_shim::GetState> for GetState {
    fn from_proto(proto: protos::contract_shim::GetState) -> Result<Self, ProtoConversionError> {
        Ok(GetState {
            key: proto.get_key().to_string(),
            collection: collection_from_proto(proto.get_collection().to_string()),
        })
    }
}

impl FromNative<GetState> for protos::contract_shim::GetState {
    fn from_native(native: GetState) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::GetState::new();
        proto.set_key(native.key);
        proto.set_collection(native.collection.unwrap_or_default());
        Ok(proto)
    }
}

impl_proto_bytes!(GetState, protos::contract_shim::GetState, "GetState");

#[derive(Debug, Clone, PartialEq)]
pub struct PutState {
    key: String,
    value: Vec<u8>,
    collection: Option<String>,
}

impl PutState {
    pub fn new(key: &str, value: Vec<u8>, collection: Option<&str>) -> Self {
        PutState {
            key: key.to_string(),
            value,
            collection: collection.map(String::from),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }
}

impl FromProto<protos::contract_shim::PutState> for PutState {
    fn from_proto(proto: protos::contract_shim::PutState) -> Result<Self, ProtoConversionError> {
        Ok(PutState {
            key: proto.get_key().to_string(),
            value: proto.get_value().to_vec(),
            collection: collection_from_proto(proto.get_collection().to_string()),
        })
    }
}

impl FromNative<PutState> for protos::contract_shim::PutState {
    fn from_native(native: PutState) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::PutState::new();
        proto.set_key(native.key);
        proto.set_value(native.value);
        proto.set_collection(native.collection.unwrap_or_default());
        Ok(proto)
    }
}

impl_proto_bytes!(PutState, protos::contract_shim::PutState, "PutState");

#[derive(Debug, Clone, PartialEq)]
pub struct DelState {
    key: String,
    collection: Option<String>,
}

impl DelState {
    pub fn new(key: &str, collection: Option<&str>) -> Self {
        DelState {
            key: key.to_string(),
            collection: collection.map(String::from),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }
}

impl FromProto<protos::contract_shim::DelState> for DelState {
    fn from_proto(proto: protos::contract_shim::DelState) -> Result<Self, ProtoConversionError> {
        Ok(DelState {
            key: proto.get_key().to_string(),
            collection: collection_from_proto(proto.get_collection().to_string()),
        })
    }
}

impl FromNative<DelState> for protos::contract_shim::DelState {
    fn from_native(native: DelState) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::DelState::new();
        proto.set_key(native.key);
        proto.set_collection(native.collection.unwrap_or_default());
        Ok(proto)
    }
}

impl_proto_bytes!(DelState, protos::contract_shim::DelState, "DelState");

#[derive(Debug, Clone, PartialEq)]
pub struct GetStateByRange {
    start_key: String,
    end_key: String,
    collection: Option<String>,
}

impl GetStateByRange {
    pub fn new(start_key: &str, end_key: &str, collection: Option<&str>) -> Self {
        GetStateByRange {
            start_key: start_key.to_string(),
            end_key: end_key.to_string(),
            collection: collection.map(String::from),
        }
    }

    pub fn start_key(&self) -> &str {
        &self.start_key
    }

    /// The exclusive end of the range; an empty end key leaves the range unbounded.
    pub fn end_key(&self) -> &str {
        &self.end_key
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }
}

impl FromProto<protos::contract_shim::GetStateByRange> for GetStateByRange {
    fn from_proto(
        proto: protos::contract_shim::GetStateByRange,
    ) -> Result<Self, ProtoConversionError> {
        Ok(GetStateByRange {
            start_key: proto.get_start_key().to_string(),
            end_key: proto.get_end_key().to_string(),
            collection: collection_from_proto(proto.get_collection().to_string()),
        })
    }
}

impl FromNative<GetStateByRange> for protos::contract_shim::GetStateByRange {
    fn from_native(native: GetStateByRange) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::GetStateByRange::new();
        proto.set_start_key(native.start_key);
        proto.set_end_key(native.end_key);
        proto.set_collection(native.collection.unwrap_or_default());
        Ok(proto)
    }
}

impl_proto_bytes!(
    GetStateByRange,
    protos::contract_shim::GetStateByRange,
    "GetStateByRange"
);

#[derive(Debug, Clone, PartialEq)]
pub struct GetQueryResult {
    query: String,
    collection: Option<String>,
}

impl GetQueryResult {
    pub fn new(query: &str, collection: Option<&str>) -> Self {
        GetQueryResult {
            query: query.to_string(),
            collection: collection.map(String::from),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }
}

impl FromProto<protos::contract_shim::GetQueryResult> for GetQueryResult {
    fn from_proto(
        proto: protos::contract_shim::GetQueryResult,
    ) -> Result<Self, ProtoConversionError> {
        Ok(GetQueryResult {
            query: proto.get_query().to_string(),
            collection: collection_from_proto(proto.get_collection().to_string()),
        })
    }
}

impl FromNative<GetQueryResult> for protos::contract_shim::GetQueryResult {
    fn from_native(native: GetQueryResult) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::GetQueryResult::new();
        proto.set_query(native.query);
        proto.set_collection(native.collection.unwrap_or_default());
        Ok(proto)
    }
}

impl_proto_bytes!(
    GetQueryResult,
    protos::contract_shim::GetQueryResult,
    "GetQueryResult"
);

#[derive(Debug, Clone, PartialEq)]
pub struct GetHistoryForKey {
    key: String,
}

impl GetHistoryForKey {
    pub fn new(key: &str) -> Self {
        GetHistoryForKey {
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromProto<protos::contract_shim::GetHistoryForKey> for GetHistoryForKey {
    fn from_proto(
        proto: protos::contract_shim::GetHistoryForKey,
    ) -> Result<Self, ProtoConversionError> {
        Ok(GetHistoryForKey {
            key: proto.get_key().to_string(),
        })
    }
}

impl FromNative<GetHistoryForKey> for protos::contract_shim::GetHistoryForKey {
    fn from_native(native: GetHistoryForKey) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::GetHistoryForKey::new();
        proto.set_key(native.key);
        Ok(proto)
    }
}

impl_proto_bytes!(
    GetHistoryForKey,
    protos::contract_shim::GetHistoryForKey,
    "GetHistoryForKey"
);

/// Requests the next batch of results for an open cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStateNext {
    id: String,
}

impl QueryStateNext {
    pub fn new(id: &str) -> Self {
        QueryStateNext { id: id.to_string() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromProto<protos::contract_shim::QueryStateNext> for QueryStateNext {
    fn from_proto(
        proto: protos::contract_shim::QueryStateNext,
    ) -> Result<Self, ProtoConversionError> {
        Ok(QueryStateNext {
            id: proto.get_id().to_string(),
        })
    }
}

impl FromNative<QueryStateNext> for protos::contract_shim::QueryStateNext {
    fn from_native(native: QueryStateNext) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::QueryStateNext::new();
        proto.set_id(native.id);
        Ok(proto)
    }
}

impl_proto_bytes!(
    QueryStateNext,
    protos::contract_shim::QueryStateNext,
    "QueryStateNext"
);

/// Requests that an open cursor be closed before it is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStateClose {
    id: String,
}

impl QueryStateClose {
    pub fn new(id: &str) -> Self {
        QueryStateClose { id: id.to_string() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromProto<protos::contract_shim::QueryStateClose> for QueryStateClose {
    fn from_proto(
        proto: protos::contract_shim::QueryStateClose,
    ) -> Result<Self, ProtoConversionError> {
        Ok(QueryStateClose {
            id: proto.get_id().to_string(),
        })
    }
}

impl FromNative<QueryStateClose> for protos::contract_shim::QueryStateClose {
    fn from_native(native: QueryStateClose) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::QueryStateClose::new();
        proto.set_id(native.id);
        Ok(proto)
    }
}

impl_proto_bytes!(
    QueryStateClose,
    protos::contract_shim::QueryStateClose,
    "QueryStateClose"
);

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protos::{FromBytes, IntoBytes};

    #[test]
    fn empty_collection_is_none() {
        let mut proto = protos::contract_shim::PutState::new();
        proto.set_key("a".into());
        proto.set_value(b"1".to_vec());

        let bytes = protobuf::Message::write_to_bytes(&proto).expect("Unable to serialize");
        let put_state = PutState::from_bytes(&bytes).expect("Unable to parse");

        assert_eq!("a", put_state.key());
        assert_eq!(b"1", put_state.value());
        assert_eq!(None, put_state.collection());
    }

    #[test]
    fn collection_is_kept() {
        let bytes = GetStateByRange::new("a", "c", Some("private"))
            .into_bytes()
            .expect("Unable to serialize");
        let range = GetStateByRange::from_bytes(&bytes).expect("Unable to parse");

        assert_eq!("a", range.start_key());
        assert_eq!("c", range.end_key());
        assert_eq!(Some("private"), range.collection());
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        // A length-delimited field whose length runs past the end of the buffer.
        let err = GetState::from_bytes(&[0x0a, 0x10, 0x01]).unwrap_err();
        assert!(err.to_string().contains("GetState"));
    }
}
