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

//! Interfaces to the ledger subsystem used while a contract executes a transaction.
//!
//! A `TxSimulator` reads and writes state on behalf of one transaction, a
//! `HistoryQueryExecutor` answers key history queries, and a `LedgerProvider` hands both out
//! per channel.  Scans, queries and history lookups return a `ResultsIterator` cursor which the
//! handler pages through in bounded batches.

pub mod memory;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::protocol::query::{KeyModification, KeyValue};
use crate::protos::{IntoBytes, ProtoConversionError};

#[derive(Debug)]
pub enum LedgerError {
    /// No ledger exists for the given channel.
    LedgerNotFound(String),
    /// The query could not be executed.
    InvalidQuery(String),
    /// The cursor was used after it was closed.
    IteratorClosed,
    /// An error occurred with the underlying storage mechanism
    StorageError(String),
}

impl Error for LedgerError {}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::LedgerNotFound(channel) => {
                write!(f, "No ledger found for channel {}", channel)
            }
            LedgerError::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
            LedgerError::IteratorClosed => f.write_str("Results iterator is closed"),
            LedgerError::StorageError(msg) => write!(f, "Storage Error: {}", msg),
        }
    }
}

/// A single entry read from a `ResultsIterator`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    KeyValue(KeyValue),
    KeyModification(KeyModification),
}

impl IntoBytes for QueryResult {
    fn into_bytes(self) -> Result<Vec<u8>, ProtoConversionError> {
        match self {
            QueryResult::KeyValue(kv) => kv.into_bytes(),
            QueryResult::KeyModification(modification) => modification.into_bytes(),
        }
    }
}

/// A server-side cursor over the results of a scan, query or history lookup.
pub trait ResultsIterator: Send {
    /// Returns the next result, or `None` once the results are exhausted.
    fn next(&mut self) -> Result<Option<QueryResult>, LedgerError>;

    /// Releases the resources held by the cursor.
    fn close(&mut self) -> Result<(), LedgerError>;
}

/// Reads and writes ledger state on behalf of a single transaction.
///
/// All keys are scoped by `namespace`, the name of the contract the request comes from.
pub trait TxSimulator: Send + Sync {
    fn get_state(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn set_state(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

    fn delete_state(&self, namespace: &str, key: &str) -> Result<(), LedgerError>;

    /// Returns a cursor over the keys in `[start_key, end_key)`.  An empty end key leaves the
    /// range unbounded.
    fn get_state_range_scan_iterator(
        &self,
        namespace: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError>;

    fn execute_query(
        &self,
        namespace: &str,
        query: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError>;

    fn get_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LedgerError>;

    fn set_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), LedgerError>;

    fn delete_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> Result<(), LedgerError>;

    fn get_private_data_range_scan_iterator(
        &self,
        namespace: &str,
        collection: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError>;

    fn execute_query_on_private_data(
        &self,
        namespace: &str,
        collection: &str,
        query: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError>;
}

/// Answers history queries for keys of a single channel.
pub trait HistoryQueryExecutor: Send + Sync {
    fn get_history_for_key(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError>;
}

/// Hands out the ledger accessors of each channel.
pub trait LedgerProvider: Send + Sync {
    fn new_tx_simulator(
        &self,
        channel_id: &str,
        tx_id: &str,
    ) -> Result<Arc<dyn TxSimulator>, LedgerError>;

    fn new_history_query_executor(
        &self,
        channel_id: &str,
    ) -> Result<Arc<dyn HistoryQueryExecutor>, LedgerError>;
}
