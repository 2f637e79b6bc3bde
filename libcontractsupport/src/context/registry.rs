/*
 * Copyright 2019 Bitwise IO, Inc.
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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::context::TransactionContext;
use crate::ledger::{HistoryQueryExecutor, LedgerProvider, TxSimulator};
use crate::protocol::contract::{Proposal, SignedProposal};

/// Tracks the in-flight transactions of one session.
///
/// Contexts and unique-request markers are keyed by the channel id concatenated with the
/// transaction id.  A poisoned lock makes the registry unavailable: lookups return `None` and
/// claims fail, but nothing panics.
pub struct TransactionContextRegistry {
    contexts: Mutex<HashMap<String, Arc<TransactionContext>>>,
    markers: Mutex<HashSet<String>>,
    ledger: Arc<dyn LedgerProvider>,
}

impl TransactionContextRegistry {
    pub fn new(ledger: Arc<dyn LedgerProvider>) -> Self {
        TransactionContextRegistry {
            contexts: Mutex::new(HashMap::new()),
            markers: Mutex::new(HashSet::new()),
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerProvider> {
        &self.ledger
    }

    /// Creates the context of a transaction, unless one already exists.
    ///
    /// The ledger accessors of the channel are requested from the provider; a channel without a
    /// ledger yields a context without them, which request handling reports to the contract.
    pub fn create(
        &self,
        channel_id: &str,
        tx_id: &str,
        signed_proposal: Option<SignedProposal>,
        proposal: Option<Proposal>,
    ) -> Option<Arc<TransactionContext>> {
        if self.exists(channel_id, tx_id) {
            debug!(
                "[{}] Transaction context already exists on channel {}",
                crate::short_tx_id(tx_id),
                channel_id
            );
            return None;
        }

        let simulator = match self.ledger.new_tx_simulator(channel_id, tx_id) {
            Ok(simulator) => Some(simulator),
            Err(err) => {
                debug!("[{}] No simulator: {}", crate::short_tx_id(tx_id), err);
                None
            }
        };
        let history = self.ledger.new_history_query_executor(channel_id).ok();

        self.create_with_accessors(
            channel_id,
            tx_id,
            simulator,
            history,
            signed_proposal,
            proposal,
        )
    }

    /// Creates the context of a transaction using the given ledger accessors, unless one
    /// already exists.
    pub fn create_with_accessors(
        &self,
        channel_id: &str,
        tx_id: &str,
        simulator: Option<Arc<dyn TxSimulator>>,
        history: Option<Arc<dyn HistoryQueryExecutor>>,
        signed_proposal: Option<SignedProposal>,
        proposal: Option<Proposal>,
    ) -> Option<Arc<TransactionContext>> {
        let key = context_key(channel_id, tx_id);
        let mut contexts = self.contexts.lock().ok()?;
        if contexts.contains_key(&key) {
            debug!(
                "[{}] Transaction context already exists on channel {}",
                crate::short_tx_id(tx_id),
                channel_id
            );
            return None;
        }

        let context = Arc::new(TransactionContext::new(
            channel_id,
            tx_id,
            simulator,
            history,
            signed_proposal,
            proposal,
        ));
        contexts.insert(key, Arc::clone(&context));
        Some(context)
    }

    /// Returns true if the transaction has a context, or if the registry is unavailable.
    fn exists(&self, channel_id: &str, tx_id: &str) -> bool {
        match self.contexts.lock() {
            Ok(contexts) => contexts.contains_key(&context_key(channel_id, tx_id)),
            Err(_) => true,
        }
    }

    pub fn get(&self, channel_id: &str, tx_id: &str) -> Option<Arc<TransactionContext>> {
        self.contexts
            .lock()
            .ok()?
            .get(&context_key(channel_id, tx_id))
            .cloned()
    }

    pub fn delete(&self, channel_id: &str, tx_id: &str) {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.remove(&context_key(channel_id, tx_id));
        }
    }

    /// Returns every context currently registered.
    pub fn contexts(&self) -> Vec<Arc<TransactionContext>> {
        match self.contexts.lock() {
            Ok(contexts) => contexts.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    /// Claims the right to run a request for the transaction.  Returns false if a request for
    /// it is already outstanding.
    pub fn create_unique_request_marker(&self, channel_id: &str, tx_id: &str) -> bool {
        match self.markers.lock() {
            Ok(mut markers) => markers.insert(context_key(channel_id, tx_id)),
            Err(_) => false,
        }
    }

    pub fn delete_request_marker(&self, channel_id: &str, tx_id: &str) {
        if let Ok(mut markers) = self.markers.lock() {
            markers.remove(&context_key(channel_id, tx_id));
        }
    }
}

fn context_key(channel_id: &str, tx_id: &str) -> String {
    format!("{}{}", channel_id, tx_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::LedgerError;

    /// Counts the accessors requested from the wrapped ledger.
    struct CountingLedger {
        ledger: InMemoryLedger,
        requested: AtomicUsize,
    }

    impl LedgerProvider for CountingLedger {
        fn new_tx_simulator(
            &self,
            channel_id: &str,
            tx_id: &str,
        ) -> Result<Arc<dyn TxSimulator>, LedgerError> {
            self.requested.fetch_add(1, Ordering::SeqCst);
            self.ledger.new_tx_simulator(channel_id, tx_id)
        }

        fn new_history_query_executor(
            &self,
            channel_id: &str,
        ) -> Result<Arc<dyn HistoryQueryExecutor>, LedgerError> {
            self.requested.fetch_add(1, Ordering::SeqCst);
            self.ledger.new_history_query_executor(channel_id)
        }
    }

    fn registry() -> TransactionContextRegistry {
        let ledger = InMemoryLedger::new();
        ledger.create_channel("ch").unwrap();
        TransactionContextRegistry::new(Arc::new(ledger))
    }

    #[test]
    fn create_rejects_duplicates() {
        let registry = registry();

        let context = registry.create("ch", "tx1", None, None).unwrap();
        assert!(context.simulator().is_some());
        assert!(context.history_query_executor().is_some());

        assert!(registry.create("ch", "tx1", None, None).is_none());
        assert!(Arc::ptr_eq(&context, &registry.get("ch", "tx1").unwrap()));

        registry.delete("ch", "tx1");
        assert!(registry.get("ch", "tx1").is_none());
        assert!(registry.create("ch", "tx1", None, None).is_some());
    }

    #[test]
    fn duplicate_create_requests_no_accessors() {
        let ledger = InMemoryLedger::new();
        ledger.create_channel("ch").unwrap();
        let counting = Arc::new(CountingLedger {
            ledger,
            requested: AtomicUsize::new(0),
        });
        let registry = TransactionContextRegistry::new(counting.clone());

        assert!(registry.create("ch", "tx1", None, None).is_some());
        assert_eq!(2, counting.requested.load(Ordering::SeqCst));

        assert!(registry.create("ch", "tx1", None, None).is_none());
        assert_eq!(2, counting.requested.load(Ordering::SeqCst));
    }

    #[test]
    fn unknown_channel_has_no_simulator() {
        let registry = registry();
        let context = registry.create("other", "tx1", None, None).unwrap();
        assert!(context.simulator().is_none());
    }

    #[test]
    fn request_markers() {
        let registry = registry();

        assert!(registry.create_unique_request_marker("ch", "tx1"));
        assert!(!registry.create_unique_request_marker("ch", "tx1"));
        assert!(registry.create_unique_request_marker("ch", "tx2"));

        registry.delete_request_marker("ch", "tx1");
        assert!(registry.create_unique_request_marker("ch", "tx1"));
    }
}
