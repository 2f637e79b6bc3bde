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

//! Per-transaction execution state shared between a session's dispatch loops and its request
//! workers.

mod registry;

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ledger::{HistoryQueryExecutor, ResultsIterator, TxSimulator};
use crate::protocol::contract::{Proposal, SignedProposal};
use crate::protocol::message::ContractMessage;
use crate::query::PendingQueryResult;

pub use crate::context::registry::TransactionContextRegistry;

/// The open cursors of a transaction, and the batch each one has accumulated so far.
#[derive(Default)]
pub struct CursorTable {
    pub(crate) iterators: HashMap<String, Box<dyn ResultsIterator>>,
    pub(crate) pending: HashMap<String, PendingQueryResult>,
}

impl CursorTable {
    pub fn is_open(&self, cursor_id: &str) -> bool {
        self.iterators.contains_key(cursor_id)
    }

    pub fn len(&self) -> usize {
        self.iterators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterators.is_empty()
    }
}

/// The execution state of one in-flight transaction.
pub struct TransactionContext {
    channel_id: String,
    tx_id: String,
    simulator: Option<Arc<dyn TxSimulator>>,
    history: Option<Arc<dyn HistoryQueryExecutor>>,
    signed_proposal: Option<SignedProposal>,
    proposal: Option<Proposal>,
    response_sender: SyncSender<ContractMessage>,
    response_receiver: Mutex<Option<Receiver<ContractMessage>>>,
    cursors: Mutex<CursorTable>,
}

impl TransactionContext {
    pub(crate) fn new(
        channel_id: &str,
        tx_id: &str,
        simulator: Option<Arc<dyn TxSimulator>>,
        history: Option<Arc<dyn HistoryQueryExecutor>>,
        signed_proposal: Option<SignedProposal>,
        proposal: Option<Proposal>,
    ) -> Self {
        let (response_sender, response_receiver) = sync_channel(1);
        TransactionContext {
            channel_id: channel_id.to_string(),
            tx_id: tx_id.to_string(),
            simulator,
            history,
            signed_proposal,
            proposal,
            response_sender,
            response_receiver: Mutex::new(Some(response_receiver)),
            cursors: Mutex::new(CursorTable::default()),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn simulator(&self) -> Option<&Arc<dyn TxSimulator>> {
        self.simulator.as_ref()
    }

    pub fn history_query_executor(&self) -> Option<&Arc<dyn HistoryQueryExecutor>> {
        self.history.as_ref()
    }

    pub fn signed_proposal(&self) -> Option<&SignedProposal> {
        self.signed_proposal.as_ref()
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    /// Delivers the final response of the transaction.
    ///
    /// The slot holds a single message; returns false if a response was already delivered or
    /// nobody can receive it anymore.
    pub fn notify(&self, msg: ContractMessage) -> bool {
        match self.response_sender.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Takes the receiving end of the response slot.  It can only be taken once.
    pub fn take_response_receiver(&self) -> Option<Receiver<ContractMessage>> {
        match self.response_receiver.lock() {
            Ok(mut receiver) => receiver.take(),
            Err(_) => None,
        }
    }

    /// Locks the cursor table of this transaction.  A poisoned lock yields `None`.
    pub fn cursors(&self) -> Option<MutexGuard<CursorTable>> {
        self.cursors.lock().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::message::MessageType;

    #[test]
    fn notify_at_most_once() {
        let context = TransactionContext::new("ch", "tx1", None, None, None, None);
        let receiver = context.take_response_receiver().unwrap();
        assert!(context.take_response_receiver().is_none());

        let first = ContractMessage::new(MessageType::Completed, "ch", "tx1", b"first".to_vec());
        let second = ContractMessage::new(MessageType::Error, "ch", "tx1", vec![]);
        assert!(context.notify(first.clone()));
        assert!(!context.notify(second));

        assert_eq!(first, receiver.recv().unwrap());
        assert!(receiver.try_recv().is_err());
    }
}
