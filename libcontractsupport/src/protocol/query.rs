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

//! Query results returned to a contract process.

use protobuf::RepeatedField;

use crate::protos::{self, FromNative, FromProto, ProtoConversionError};

/// One batch of results read from a cursor.
///
/// Each entry is an already serialized `KeyValue` or `KeyModification`.  When `has_more` is
/// set the cursor identified by `id` remains open and the next batch can be requested with
/// QUERY_STATE_NEXT.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResponse {
    id: String,
    has_more: bool,
    results: Vec<Vec<u8>>,
}

impl QueryResponse {
    pub fn new(id: &str, has_more: bool, results: Vec<Vec<u8>>) -> Self {
        QueryResponse {
            id: id.to_string(),
            has_more,
            results,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn results(&self) -> &[Vec<u8>] {
        &self.results
    }
}

impl FromProto<protos::contract_shim::QueryResponse> for QueryResponse {
    fn from_proto(
        proto: protos::contract_shim::QueryResponse,
    ) -> Result<Self, ProtoConversionError> {
        Ok(QueryResponse {
            id: proto.get_id().to_string(),
            has_more: proto.get_has_more(),
            results: proto
                .get_results()
                .iter()
                .map(|result| result.get_result_bytes().to_vec())
                .collect(),
        })
    }
}

impl FromNative<QueryResponse> for protos::contract_shim::QueryResponse {
    fn from_native(native: QueryResponse) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::QueryResponse::new();
        proto.set_id(native.id);
        proto.set_has_more(native.has_more);
        proto.set_results(RepeatedField::from_vec(
            native
                .results
                .into_iter()
                .map(|bytes| {
                    let mut result = protos::contract_shim::QueryResultBytes::new();
                    result.set_result_bytes(bytes);
                    result
                })
                .collect(),
        ));
        Ok(proto)
    }
}

impl_proto_bytes!(
    QueryResponse,
    protos::contract_shim::QueryResponse,
    "QueryResponse"
);

/// A state entry produced by range scans and rich queries.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    namespace: String,
    key: String,
    value: Vec<u8>,
}

impl KeyValue {
    pub fn new(namespace: &str, key: &str, value: Vec<u8>) -> Self {
        KeyValue {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl FromProto<protos::contract_shim::KV> for KeyValue {
    fn from_proto(proto: protos::contract_shim::KV) -> Result<Self, ProtoConversionError> {
        Ok(KeyValue {
            namespace: proto.get_namespace().to_string(),
            key: proto.get_key().to_string(),
            value: proto.get_value().to_vec(),
        })
    }
}

impl FromNative<KeyValue> for protos::contract_shim::KV {
    fn from_native(native: KeyValue) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::KV::new();
        proto.set_namespace(native.namespace);
        proto.set_key(native.key);
        proto.set_value(native.value);
        Ok(proto)
    }
}

impl_proto_bytes!(KeyValue, protos::contract_shim::KV, "KV");

/// A single modification of a key, produced by history queries.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyModification {
    tx_id: String,
    value: Vec<u8>,
    timestamp_secs: i64,
    timestamp_nanos: i32,
    is_delete: bool,
}

impl KeyModification {
    pub fn new(
        tx_id: &str,
        value: Vec<u8>,
        timestamp_secs: i64,
        timestamp_nanos: i32,
        is_delete: bool,
    ) -> Self {
        KeyModification {
            tx_id: tx_id.to_string(),
            value,
            timestamp_secs,
            timestamp_nanos,
            is_delete,
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn timestamp_secs(&self) -> i64 {
        self.timestamp_secs
    }

    pub fn timestamp_nanos(&self) -> i32 {
        self.timestamp_nanos
    }

    pub fn is_delete(&self) -> bool {
        self.is_delete
    }
}

impl FromProto<protos::contract_shim::KeyModification> for KeyModification {
    fn from_proto(
        proto: protos::contract_shim::KeyModification,
    ) -> Result<Self, ProtoConversionError> {
        Ok(KeyModification {
            tx_id: proto.get_tx_id().to_string(),
            value: proto.get_value().to_vec(),
            timestamp_secs: proto.get_timestamp_secs(),
            timestamp_nanos: proto.get_timestamp_nanos(),
            is_delete: proto.get_is_delete(),
        })
    }
}

impl FromNative<KeyModification> for protos::contract_shim::KeyModification {
    fn from_native(native: KeyModification) -> Result<Self, ProtoConversionError> {
        let mut proto = protos::contract_shim::KeyModification::new();
        proto.set_tx_id(native.tx_id);
        proto.set_value(native.value);
        proto.set_timestamp_secs(native.timestamp_secs);
        proto.set_timestamp_nanos(native.timestamp_nanos);
        proto.set_is_delete(native.is_delete);
        Ok(proto)
    }
}

impl_proto_bytes!(
    KeyModification,
    protos::contract_shim::KeyModification,
    "KeyModification"
);
