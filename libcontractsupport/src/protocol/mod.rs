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

//! Native structs for the messages exchanged between the node and a contract process.
//!
//! The `ContractMessage` envelope carries a typed, opaque payload.  The payload structs in
//! `request` are sent by the contract process to access the ledger; the structs in `query`
//! are returned to it.  Contract identity and proposal structs live in `contract`.

/// Implements the byte-level conversions shared by every native protocol struct, given its
/// `FromProto`/`FromNative` implementations.
macro_rules! impl_proto_bytes {
    ($native:ty, $proto:ty, $name:expr) => {
        impl $crate::protos::FromBytes<$native> for $native {
            fn from_bytes(bytes: &[u8]) -> Result<$native, $crate::protos::ProtoConversionError> {
                #[allow(deprecated)]
                let proto: $proto = ::protobuf::parse_from_bytes(bytes).map_err(|err| {
                    $crate::protos::ProtoConversionError::SerializationError(format!(
                        "Unable to get {} from bytes: {}",
                        $name, err
                    ))
                })?;
                <$proto as $crate::protos::IntoNative<$native>>::into_native(proto)
            }
        }

        impl $crate::protos::IntoBytes for $native {
            fn into_bytes(self) -> Result<Vec<u8>, $crate::protos::ProtoConversionError> {
                let proto: $proto =
                    <$native as $crate::protos::IntoProto<$proto>>::into_proto(self)?;
                ::protobuf::Message::write_to_bytes(&proto).map_err(|err| {
                    $crate::protos::ProtoConversionError::SerializationError(format!(
                        "Unable to get bytes from {}: {}",
                        $name, err
                    ))
                })
            }
        }

        impl $crate::protos::IntoProto<$proto> for $native {}
        impl $crate::protos::IntoNative<$native> for $proto {}
    };
}

pub mod contract;
pub mod message;
pub mod query;
pub mod request;

/// Maps the empty string used by protobuf for an unset collection to `None`.
fn collection_from_proto(collection: String) -> Option<String> {
    if collection.is_empty() {
        None
    } else {
        Some(collection)
    }
}
