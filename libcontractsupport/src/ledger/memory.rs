/*
 * Copyright 2018 Bitwise IO, Inc.
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

//! Provides a simple, in-memory ledger backed by `std::collections::BTreeMap`.
//!
//! Writes made through a simulator are applied to the ledger immediately and recorded in the
//! key's history.  Rich queries are not supported by this backend; the query string is
//! treated as a key prefix instead.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{
    HistoryQueryExecutor, LedgerError, LedgerProvider, QueryResult, ResultsIterator, TxSimulator,
};
use crate::protocol::query::{KeyModification, KeyValue};

type Channels = HashMap<String, ChannelLedger>;

#[derive(Debug, Default)]
struct ChannelLedger {
    /// Public state, keyed by namespace, then key.
    state: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    /// Private data, keyed by namespace and collection, then key.
    private: BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>,
    /// Modifications of public keys, in the order they were applied.
    history: HashMap<(String, String), Vec<KeyModification>>,
}

impl ChannelLedger {
    fn record(&mut self, namespace: &str, key: &str, tx_id: &str, value: Vec<u8>, is_delete: bool) {
        let (secs, nanos) = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => (elapsed.as_secs() as i64, elapsed.subsec_nanos() as i32),
            Err(_) => (0, 0),
        };

        self.history
            .entry((namespace.to_string(), key.to_string()))
            .or_insert_with(Vec::new)
            .push(KeyModification::new(tx_id, value, secs, nanos, is_delete));
    }
}

/// An in-memory ledger holding the state of any number of channels.
///
/// Channels must be created with `create_channel` before simulators can be handed out for
/// them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    channels: Arc<Mutex<Channels>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        InMemoryLedger::default()
    }

    /// Creates an empty ledger for the given channel, if none exists yet.
    pub fn create_channel(&self, channel_id: &str) -> Result<(), LedgerError> {
        lock(&self.channels)?
            .entry(channel_id.to_string())
            .or_insert_with(ChannelLedger::default);
        Ok(())
    }

    /// Reads a public value directly, outside of any transaction.
    pub fn state(
        &self,
        channel_id: &str,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        let channels = lock(&self.channels)?;
        let ledger = channel(&channels, channel_id)?;
        Ok(ledger
            .state
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }
}

impl LedgerProvider for InMemoryLedger {
    fn new_tx_simulator(
        &self,
        channel_id: &str,
        tx_id: &str,
    ) -> Result<Arc<dyn TxSimulator>, LedgerError> {
        channel(&*lock(&self.channels)?, channel_id)?;
        Ok(Arc::new(InMemoryTxSimulator {
            channels: Arc::clone(&self.channels),
            channel_id: channel_id.to_string(),
            tx_id: tx_id.to_string(),
        }))
    }

    fn new_history_query_executor(
        &self,
        channel_id: &str,
    ) -> Result<Arc<dyn HistoryQueryExecutor>, LedgerError> {
        channel(&*lock(&self.channels)?, channel_id)?;
        Ok(Arc::new(InMemoryHistoryQueryExecutor {
            channels: Arc::clone(&self.channels),
            channel_id: channel_id.to_string(),
        }))
    }
}

/// A `TxSimulator` writing straight through to an `InMemoryLedger`.
pub struct InMemoryTxSimulator {
    channels: Arc<Mutex<Channels>>,
    channel_id: String,
    tx_id: String,
}

impl InMemoryTxSimulator {
    fn with_channel<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut ChannelLedger) -> T,
    {
        let mut channels = lock(&self.channels)?;
        let ledger = channels
            .get_mut(&self.channel_id)
            .ok_or_else(|| LedgerError::LedgerNotFound(self.channel_id.clone()))?;
        Ok(f(ledger))
    }
}

impl TxSimulator for InMemoryTxSimulator {
    fn get_state(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        self.with_channel(|ledger| {
            ledger
                .state
                .get(namespace)
                .and_then(|entries| entries.get(key))
                .cloned()
        })
    }

    fn set_state(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        if key.is_empty() {
            return Err(LedgerError::InvalidQuery("empty key not allowed".into()));
        }
        let tx_id = self.tx_id.clone();
        self.with_channel(|ledger| {
            ledger
                .state
                .entry(namespace.to_string())
                .or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.clone());
            ledger.record(namespace, key, &tx_id, value, false);
        })
    }

    fn delete_state(&self, namespace: &str, key: &str) -> Result<(), LedgerError> {
        let tx_id = self.tx_id.clone();
        self.with_channel(|ledger| {
            if let Some(entries) = ledger.state.get_mut(namespace) {
                entries.remove(key);
            }
            ledger.record(namespace, key, &tx_id, vec![], true);
        })
    }

    fn get_state_range_scan_iterator(
        &self,
        namespace: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError> {
        let results = self.with_channel(|ledger| {
            ledger
                .state
                .get(namespace)
                .map(|entries| range(namespace, entries, start_key, end_key))
                .unwrap_or_default()
        })?;
        Ok(Box::new(VecResultsIterator::new(results)))
    }

    fn execute_query(
        &self,
        namespace: &str,
        query: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError> {
        let results = self.with_channel(|ledger| {
            ledger
                .state
                .get(namespace)
                .map(|entries| prefix(namespace, entries, query))
                .unwrap_or_default()
        })?;
        Ok(Box::new(VecResultsIterator::new(results)))
    }

    fn get_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        self.with_channel(|ledger| {
            ledger
                .private
                .get(&(namespace.to_string(), collection.to_string()))
                .and_then(|entries| entries.get(key))
                .cloned()
        })
    }

    fn set_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), LedgerError> {
        if key.is_empty() {
            return Err(LedgerError::InvalidQuery("empty key not allowed".into()));
        }
        self.with_channel(|ledger| {
            ledger
                .private
                .entry((namespace.to_string(), collection.to_string()))
                .or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value);
        })
    }

    fn delete_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> Result<(), LedgerError> {
        self.with_channel(|ledger| {
            if let Some(entries) = ledger
                .private
                .get_mut(&(namespace.to_string(), collection.to_string()))
            {
                entries.remove(key);
            }
        })
    }

    fn get_private_data_range_scan_iterator(
        &self,
        namespace: &str,
        collection: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError> {
        let results = self.with_channel(|ledger| {
            ledger
                .private
                .get(&(namespace.to_string(), collection.to_string()))
                .map(|entries| range(namespace, entries, start_key, end_key))
                .unwrap_or_default()
        })?;
        Ok(Box::new(VecResultsIterator::new(results)))
    }

    fn execute_query_on_private_data(
        &self,
        namespace: &str,
        collection: &str,
        query: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError> {
        let results = self.with_channel(|ledger| {
            ledger
                .private
                .get(&(namespace.to_string(), collection.to_string()))
                .map(|entries| prefix(namespace, entries, query))
                .unwrap_or_default()
        })?;
        Ok(Box::new(VecResultsIterator::new(results)))
    }
}

/// A `HistoryQueryExecutor` reading the history recorded by an `InMemoryLedger`.
pub struct InMemoryHistoryQueryExecutor {
    channels: Arc<Mutex<Channels>>,
    channel_id: String,
}

impl HistoryQueryExecutor for InMemoryHistoryQueryExecutor {
    fn get_history_for_key(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Box<dyn ResultsIterator>, LedgerError> {
        let channels = lock(&self.channels)?;
        let ledger = channel(&channels, &self.channel_id)?;
        let results = ledger
            .history
            .get(&(namespace.to_string(), key.to_string()))
            .map(|modifications| {
                modifications
                    .iter()
                    .cloned()
                    .map(QueryResult::KeyModification)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(VecResultsIterator::new(results)))
    }
}

/// A `ResultsIterator` over results that have already been collected.
#[derive(Debug, Default)]
pub struct VecResultsIterator {
    results: VecDeque<QueryResult>,
    closed: bool,
}

impl VecResultsIterator {
    pub fn new(results: Vec<QueryResult>) -> Self {
        VecResultsIterator {
            results: results.into(),
            closed: false,
        }
    }
}

impl ResultsIterator for VecResultsIterator {
    fn next(&mut self) -> Result<Option<QueryResult>, LedgerError> {
        if self.closed {
            return Err(LedgerError::IteratorClosed);
        }
        Ok(self.results.pop_front())
    }

    fn close(&mut self) -> Result<(), LedgerError> {
        self.closed = true;
        self.results.clear();
        Ok(())
    }
}

fn lock(channels: &Mutex<Channels>) -> Result<MutexGuard<Channels>, LedgerError> {
    channels
        .lock()
        .map_err(|_| LedgerError::StorageError("ledger lock poisoned".into()))
}

fn channel<'a>(channels: &'a Channels, channel_id: &str) -> Result<&'a ChannelLedger, LedgerError> {
    channels
        .get(channel_id)
        .ok_or_else(|| LedgerError::LedgerNotFound(channel_id.to_string()))
}

fn range(
    namespace: &str,
    entries: &BTreeMap<String, Vec<u8>>,
    start_key: &str,
    end_key: &str,
) -> Vec<QueryResult> {
    let end = if end_key.is_empty() {
        Bound::Unbounded
    } else if end_key <= start_key {
        return vec![];
    } else {
        Bound::Excluded(end_key.to_string())
    };

    entries
        .range((Bound::Included(start_key.to_string()), end))
        .map(|(key, value)| QueryResult::KeyValue(KeyValue::new(namespace, key, value.clone())))
        .collect()
}

fn prefix(namespace: &str, entries: &BTreeMap<String, Vec<u8>>, prefix: &str) -> Vec<QueryResult> {
    entries
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| QueryResult::KeyValue(KeyValue::new(namespace, key, value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(iter: &mut dyn ResultsIterator) -> Vec<String> {
        let mut keys = vec![];
        while let Some(result) = iter.next().expect("Unable to read iterator") {
            match result {
                QueryResult::KeyValue(kv) => keys.push(kv.key().to_string()),
                QueryResult::KeyModification(_) => panic!("Unexpected history result"),
            }
        }
        keys
    }

    #[test]
    fn unknown_channel() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.new_tx_simulator("missing", "tx1").is_err());
        assert!(ledger.new_history_query_executor("missing").is_err());
    }

    #[test]
    fn set_get_delete() {
        let ledger = InMemoryLedger::new();
        ledger.create_channel("ch").unwrap();
        let simulator = ledger.new_tx_simulator("ch", "tx1").unwrap();

        simulator.set_state("cc", "a", b"1".to_vec()).unwrap();
        assert_eq!(Some(b"1".to_vec()), simulator.get_state("cc", "a").unwrap());
        assert_eq!(None, simulator.get_state("other", "a").unwrap());

        simulator.delete_state("cc", "a").unwrap();
        assert_eq!(None, ledger.state("ch", "cc", "a").unwrap());
    }

    #[test]
    fn range_and_prefix() {
        let ledger = InMemoryLedger::new();
        ledger.create_channel("ch").unwrap();
        let simulator = ledger.new_tx_simulator("ch", "tx1").unwrap();
        for key in &["a1", "a2", "b1", "c1"] {
            simulator.set_state("cc", key, b"v".to_vec()).unwrap();
        }

        let mut iter = simulator
            .get_state_range_scan_iterator("cc", "a2", "c1")
            .unwrap();
        assert_eq!(vec!["a2", "b1"], keys(&mut *iter));

        let mut iter = simulator.get_state_range_scan_iterator("cc", "b", "").unwrap();
        assert_eq!(vec!["b1", "c1"], keys(&mut *iter));

        let mut iter = simulator.execute_query("cc", "a").unwrap();
        assert_eq!(vec!["a1", "a2"], keys(&mut *iter));
    }

    #[test]
    fn private_data_is_separate() {
        let ledger = InMemoryLedger::new();
        ledger.create_channel("ch").unwrap();
        let simulator = ledger.new_tx_simulator("ch", "tx1").unwrap();

        simulator
            .set_private_data("cc", "secret", "a", b"p".to_vec())
            .unwrap();
        assert_eq!(None, simulator.get_state("cc", "a").unwrap());
        assert_eq!(
            Some(b"p".to_vec()),
            simulator.get_private_data("cc", "secret", "a").unwrap()
        );
    }

    #[test]
    fn history_records_modifications() {
        let ledger = InMemoryLedger::new();
        ledger.create_channel("ch").unwrap();
        ledger
            .new_tx_simulator("ch", "tx1")
            .unwrap()
            .set_state("cc", "a", b"1".to_vec())
            .unwrap();
        ledger
            .new_tx_simulator("ch", "tx2")
            .unwrap()
            .delete_state("cc", "a")
            .unwrap();

        let executor = ledger.new_history_query_executor("ch").unwrap();
        let mut iter = executor.get_history_for_key("cc", "a").unwrap();

        let mut modifications = vec![];
        while let Some(QueryResult::KeyModification(m)) = iter.next().unwrap() {
            modifications.push((m.tx_id().to_string(), m.is_delete()));
        }
        assert_eq!(
            vec![("tx1".to_string(), false), ("tx2".to_string(), true)],
            modifications
        );
    }

    #[test]
    fn closed_iterator_errors() {
        let mut iter = VecResultsIterator::new(vec![]);
        iter.close().unwrap();
        assert!(iter.next().is_err());
    }
}
