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

//! Pages the results of ledger cursors back to a contract process.
//!
//! Every scan, query or history lookup opens a cursor on the transaction context.  Each call to
//! `advance` reads at most one batch from it; a response with `has_more` set tells the contract
//! to ask for the next batch with `QUERY_STATE_NEXT`.  Exhausted cursors are closed and removed
//! from the context.

mod error;

use std::mem;

use uuid::Uuid;

use crate::context::{CursorTable, TransactionContext};
use crate::ledger::ResultsIterator;
use crate::protocol::query::QueryResponse;
use crate::protos::IntoBytes;

pub use crate::query::error::QueryError;

/// The default maximum number of entries in one `QueryResponse`.
pub const DEFAULT_MAX_RESULT_BATCH_SIZE: usize = 100;

/// Serialized results read from a cursor but not yet returned to the contract.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PendingQueryResult {
    batch: Vec<Vec<u8>>,
    count: usize,
}

impl PendingQueryResult {
    pub fn new() -> Self {
        PendingQueryResult::default()
    }

    pub fn add(&mut self, result: Vec<u8>) {
        self.batch.push(result);
        self.count += 1;
    }

    /// Empties the batch, returning the entries it held.
    pub fn cut(&mut self) -> Vec<Vec<u8>> {
        self.count = 0;
        mem::replace(&mut self.batch, Vec::new())
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone)]
pub struct QueryResultPaginator {
    max_batch_size: usize,
}

impl Default for QueryResultPaginator {
    fn default() -> Self {
        QueryResultPaginator::new(DEFAULT_MAX_RESULT_BATCH_SIZE)
    }
}

impl QueryResultPaginator {
    pub fn new(max_batch_size: usize) -> Self {
        QueryResultPaginator { max_batch_size }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Registers a cursor on the context under a fresh id and returns its first batch.
    pub fn open(
        &self,
        context: &TransactionContext,
        cursor: Box<dyn ResultsIterator>,
    ) -> Result<QueryResponse, QueryError> {
        let cursor_id = Uuid::new_v4().to_string();
        let mut cursors = context.cursors().ok_or(QueryError::ContextUnavailable)?;
        cursors.iterators.insert(cursor_id.clone(), cursor);
        cursors
            .pending
            .insert(cursor_id.clone(), PendingQueryResult::new());

        self.advance_locked(&mut cursors, &cursor_id)
    }

    /// Reads the next batch from an open cursor.
    pub fn advance(
        &self,
        context: &TransactionContext,
        cursor_id: &str,
    ) -> Result<QueryResponse, QueryError> {
        let mut cursors = context.cursors().ok_or(QueryError::ContextUnavailable)?;
        if !cursors.is_open(cursor_id) {
            return Err(QueryError::CursorNotFound(cursor_id.to_string()));
        }

        self.advance_locked(&mut cursors, cursor_id)
    }

    fn advance_locked(
        &self,
        cursors: &mut CursorTable,
        cursor_id: &str,
    ) -> Result<QueryResponse, QueryError> {
        loop {
            let next = match cursors.iterators.get_mut(cursor_id) {
                Some(iterator) => iterator.next(),
                None => return Err(QueryError::CursorNotFound(cursor_id.to_string())),
            };

            let result = match next.map_err(QueryError::from).and_then(|result| {
                result
                    .map(|result| result.into_bytes().map_err(QueryError::from))
                    .transpose()
            }) {
                Ok(result) => result,
                Err(err) => {
                    close_locked(cursors, cursor_id);
                    return Err(err);
                }
            };

            let pending = cursors
                .pending
                .entry(cursor_id.to_string())
                .or_insert_with(PendingQueryResult::new);

            match result {
                None => {
                    let batch = pending.cut();
                    close_locked(cursors, cursor_id);
                    return Ok(QueryResponse::new(cursor_id, false, batch));
                }
                Some(bytes) if pending.count() >= self.max_batch_size => {
                    let batch = pending.cut();
                    pending.add(bytes);
                    return Ok(QueryResponse::new(cursor_id, true, batch));
                }
                Some(bytes) => pending.add(bytes),
            }
        }
    }

    /// Closes a cursor and forgets its pending batch.  Closing an unknown cursor does nothing.
    pub fn close(&self, context: &TransactionContext, cursor_id: &str) -> Result<(), QueryError> {
        let mut cursors = context.cursors().ok_or(QueryError::ContextUnavailable)?;
        close_locked(&mut cursors, cursor_id);
        Ok(())
    }

    /// Closes every cursor left open on the context.
    pub fn close_all(&self, context: &TransactionContext) {
        if let Some(mut cursors) = context.cursors() {
            let ids: Vec<String> = cursors.iterators.keys().cloned().collect();
            for cursor_id in ids {
                close_locked(&mut cursors, &cursor_id);
            }
        }
    }
}

fn close_locked(cursors: &mut CursorTable, cursor_id: &str) {
    if let Some(mut iterator) = cursors.iterators.remove(cursor_id) {
        if let Err(err) = iterator.close() {
            warn!("Failed to close cursor {}: {}", cursor_id, err);
        }
    }
    cursors.pending.remove(cursor_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::ledger::memory::VecResultsIterator;
    use crate::ledger::{LedgerError, QueryResult};
    use crate::protocol::query::KeyValue;

    fn results(count: usize) -> Vec<QueryResult> {
        (0..count)
            .map(|i| QueryResult::KeyValue(KeyValue::new("cc", &format!("key{:04}", i), vec![1])))
            .collect()
    }

    fn context() -> TransactionContext {
        TransactionContext::new("ch", "tx1", None, None, None, None)
    }

    /// Counts how many times it was closed.
    struct CountingIterator {
        inner: VecResultsIterator,
        closed: Arc<AtomicUsize>,
    }

    impl ResultsIterator for CountingIterator {
        fn next(&mut self) -> Result<Option<QueryResult>, LedgerError> {
            self.inner.next()
        }

        fn close(&mut self) -> Result<(), LedgerError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.inner.close()
        }
    }

    struct FailingIterator;

    impl ResultsIterator for FailingIterator {
        fn next(&mut self) -> Result<Option<QueryResult>, LedgerError> {
            Err(LedgerError::StorageError("disk on fire".into()))
        }

        fn close(&mut self) -> Result<(), LedgerError> {
            Err(LedgerError::IteratorClosed)
        }
    }

    #[test]
    fn pending_cut_resets_count() {
        let mut pending = PendingQueryResult::new();
        pending.add(vec![1]);
        pending.add(vec![2]);
        assert_eq!(2, pending.count());

        assert_eq!(vec![vec![1], vec![2]], pending.cut());
        assert_eq!(0, pending.count());
        assert!(pending.cut().is_empty());
    }

    #[test]
    fn pages_in_bounded_batches() {
        let context = context();
        let paginator = QueryResultPaginator::default();
        let closed = Arc::new(AtomicUsize::new(0));
        let cursor = Box::new(CountingIterator {
            inner: VecResultsIterator::new(results(250)),
            closed: closed.clone(),
        });

        let first = paginator.open(&context, cursor).unwrap();
        assert!(first.has_more());
        assert_eq!(100, first.results().len());

        let second = paginator.advance(&context, first.id()).unwrap();
        assert!(second.has_more());
        assert_eq!(100, second.results().len());
        assert_eq!(0, closed.load(Ordering::SeqCst));

        let last = paginator.advance(&context, first.id()).unwrap();
        assert!(!last.has_more());
        assert_eq!(50, last.results().len());
        assert_eq!(1, closed.load(Ordering::SeqCst));
        assert!(context.cursors().unwrap().is_empty());

        match paginator.advance(&context, first.id()) {
            Err(QueryError::CursorNotFound(_)) => (),
            res => panic!("Expected CursorNotFound, got {:?}", res),
        }
    }

    #[test]
    fn exact_multiple_ends_with_remainder() {
        let context = context();
        let paginator = QueryResultPaginator::new(10);

        let first = paginator
            .open(&context, Box::new(VecResultsIterator::new(results(20))))
            .unwrap();
        assert!(first.has_more());
        assert_eq!(10, first.results().len());

        let last = paginator.advance(&context, first.id()).unwrap();
        assert!(!last.has_more());
        assert_eq!(10, last.results().len());
    }

    #[test]
    fn empty_cursor() {
        let context = context();
        let response = QueryResultPaginator::default()
            .open(&context, Box::new(VecResultsIterator::new(vec![])))
            .unwrap();
        assert!(!response.has_more());
        assert!(response.results().is_empty());
        assert!(context.cursors().unwrap().is_empty());
    }

    #[test]
    fn failing_cursor_is_closed() {
        let context = context();
        let paginator = QueryResultPaginator::default();

        match paginator.open(&context, Box::new(FailingIterator)) {
            Err(QueryError::LedgerError(_)) => (),
            res => panic!("Expected LedgerError, got {:?}", res),
        }
        assert!(context.cursors().unwrap().is_empty());
    }

    #[test]
    fn close_all_cursors() {
        let context = context();
        let paginator = QueryResultPaginator::new(1);

        let first = paginator
            .open(&context, Box::new(VecResultsIterator::new(results(5))))
            .unwrap();
        paginator
            .open(&context, Box::new(VecResultsIterator::new(results(5))))
            .unwrap();
        assert_eq!(2, context.cursors().unwrap().len());

        paginator.close(&context, first.id()).unwrap();
        paginator.close(&context, "unknown").unwrap();
        assert_eq!(1, context.cursors().unwrap().len());

        paginator.close_all(&context);
        assert!(context.cursors().unwrap().is_empty());
    }
}
