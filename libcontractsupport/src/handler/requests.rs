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

//! Ledger requests issued by a contract while it runs a transaction.
//!
//! Every request claims the transaction's unique-request marker, parses its payload, resolves
//! the transaction context and runs against the ledger.  The reply is a `RESPONSE` carrying the
//! serialized result or an `ERROR` carrying the failure.  A request arriving while another one
//! of the same transaction is outstanding gets no reply at all.

use std::sync::Arc;

use crate::context::TransactionContext;
use crate::handler::{Handler, HandlerError};
use crate::ledger::TxSimulator;
use crate::protocol::contract::{ContractId, ContractInstance, ContractSpec};
use crate::protocol::message::{ContractMessage, MessageType};
use crate::protocol::query::QueryResponse;
use crate::protocol::request::{
    DelState, GetHistoryForKey, GetQueryResult, GetState, GetStateByRange, PutState,
    QueryStateClose, QueryStateNext,
};
use crate::protos::{FromBytes, IntoBytes};
use crate::short_tx_id;
use crate::support::Invocation;

impl Handler {
    fn run_request<R, F>(&self, msg: &ContractMessage, op: F) -> Option<ContractMessage>
    where
        R: FromBytes<R>,
        F: FnOnce(&Handler, &TransactionContext, R) -> Result<Vec<u8>, HandlerError>,
    {
        let channel_id = msg.channel_id();
        let tx_id = msg.tx_id();

        if !self
            .shared
            .contexts
            .create_unique_request_marker(channel_id, tx_id)
        {
            warn!(
                "[{}] Another request pending for this Txid. Cannot process {}",
                short_tx_id(tx_id),
                msg.message_type()
            );
            return None;
        }

        let result = R::from_bytes(msg.payload())
            .map_err(HandlerError::from)
            .and_then(|request| {
                let context = self.shared.contexts.get(channel_id, tx_id).ok_or_else(|| {
                    HandlerError::MissingContext {
                        channel_id: channel_id.to_string(),
                        tx_id: tx_id.to_string(),
                    }
                })?;
                op(self, &*context, request)
            });

        self.shared
            .contexts
            .delete_request_marker(channel_id, tx_id);

        let response = match result {
            Ok(payload) => {
                debug!(
                    "[{}] Completed {}. Sending {}",
                    short_tx_id(tx_id),
                    msg.message_type(),
                    MessageType::Response
                );
                ContractMessage::new(MessageType::Response, channel_id, tx_id, payload)
            }
            Err(err) => {
                error!(
                    "[{}] Failed to handle {}: {}. Sending {}",
                    short_tx_id(tx_id),
                    msg.message_type(),
                    err,
                    MessageType::Error
                );
                ContractMessage::new(
                    MessageType::Error,
                    channel_id,
                    tx_id,
                    err.to_string().into_bytes(),
                )
            }
        };
        Some(response)
    }

    pub(super) fn handle_get_state(&self, msg: &ContractMessage) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: GetState| {
            let simulator = simulator(context)?;
            let namespace = handler.namespace()?;
            let value = match request.collection() {
                Some(collection) => {
                    simulator.get_private_data(&namespace, collection, request.key())?
                }
                None => simulator.get_state(&namespace, request.key())?,
            };

            if value.is_none() {
                debug!(
                    "[{}] No state associated with key: {}. Sending an empty payload",
                    short_tx_id(context.tx_id()),
                    request.key()
                );
            }
            Ok(value.unwrap_or_default())
        })
    }

    pub(super) fn handle_put_state(&self, msg: &ContractMessage) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: PutState| {
            let simulator = simulator(context)?;
            let namespace = handler.namespace()?;
            match request.collection() {
                Some(collection) => simulator.set_private_data(
                    &namespace,
                    collection,
                    request.key(),
                    request.value().to_vec(),
                )?,
                None => simulator.set_state(&namespace, request.key(), request.value().to_vec())?,
            }
            Ok(vec![])
        })
    }

    pub(super) fn handle_del_state(&self, msg: &ContractMessage) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: DelState| {
            let simulator = simulator(context)?;
            let namespace = handler.namespace()?;
            match request.collection() {
                Some(collection) => {
                    simulator.delete_private_data(&namespace, collection, request.key())?
                }
                None => simulator.delete_state(&namespace, request.key())?,
            }
            Ok(vec![])
        })
    }

    pub(super) fn handle_get_state_by_range(
        &self,
        msg: &ContractMessage,
    ) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: GetStateByRange| {
            let simulator = simulator(context)?;
            let namespace = handler.namespace()?;
            let cursor = match request.collection() {
                Some(collection) => simulator.get_private_data_range_scan_iterator(
                    &namespace,
                    collection,
                    request.start_key(),
                    request.end_key(),
                )?,
                None => simulator.get_state_range_scan_iterator(
                    &namespace,
                    request.start_key(),
                    request.end_key(),
                )?,
            };
            Ok(handler.shared.paginator.open(context, cursor)?.into_bytes()?)
        })
    }

    pub(super) fn handle_get_query_result(
        &self,
        msg: &ContractMessage,
    ) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: GetQueryResult| {
            let simulator = simulator(context)?;
            let namespace = handler.namespace()?;
            let cursor = match request.collection() {
                Some(collection) => {
                    simulator.execute_query_on_private_data(&namespace, collection, request.query())?
                }
                None => simulator.execute_query(&namespace, request.query())?,
            };
            Ok(handler.shared.paginator.open(context, cursor)?.into_bytes()?)
        })
    }

    pub(super) fn handle_get_history_for_key(
        &self,
        msg: &ContractMessage,
    ) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: GetHistoryForKey| {
            let executor = context.history_query_executor().ok_or_else(|| {
                HandlerError::MissingHistoryExecutor {
                    channel_id: context.channel_id().to_string(),
                    tx_id: context.tx_id().to_string(),
                }
            })?;
            let namespace = handler.namespace()?;
            let cursor = executor.get_history_for_key(&namespace, request.key())?;
            Ok(handler.shared.paginator.open(context, cursor)?.into_bytes()?)
        })
    }

    pub(super) fn handle_query_state_next(
        &self,
        msg: &ContractMessage,
    ) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: QueryStateNext| {
            Ok(handler
                .shared
                .paginator
                .advance(context, request.id())?
                .into_bytes()?)
        })
    }

    pub(super) fn handle_query_state_close(
        &self,
        msg: &ContractMessage,
    ) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, request: QueryStateClose| {
            handler.shared.paginator.close(context, request.id())?;
            Ok(QueryResponse::new(request.id(), false, vec![]).into_bytes()?)
        })
    }

    pub(super) fn handle_invoke_contract(
        &self,
        msg: &ContractMessage,
    ) -> Option<ContractMessage> {
        self.run_request(msg, |handler, context, spec: ContractSpec| {
            handler.invoke_contract(context, spec)
        })
    }

    /// Runs a call from the session's contract to another contract.  The reply payload is the
    /// serialized final message of the called contract.
    fn invoke_contract(
        &self,
        context: &TransactionContext,
        spec: ContractSpec,
    ) -> Result<Vec<u8>, HandlerError> {
        let tx_id = context.tx_id();
        let called_id = spec.contract_id().clone();

        let mut target = ContractInstance::from_name(called_id.name());
        if target.channel_id().is_empty() {
            target.set_channel_id(context.channel_id());
        }
        if target.version().is_empty() {
            target.set_version(called_id.version());
        }
        let spec = spec.with_contract_id(
            ContractId::new(target.name())
                .with_path(called_id.path())
                .with_version(called_id.version()),
        );

        info!(
            "[{}] C-call-C {} on channel {}",
            short_tx_id(tx_id),
            target.name(),
            target.channel_id()
        );

        if let Err(err) = self.shared.access_control.check(
            context.signed_proposal(),
            context.proposal(),
            &target,
        ) {
            error!(
                "[{}] C-call-C {} on channel {} failed check ACL: {}",
                short_tx_id(tx_id),
                target.name(),
                target.channel_id(),
                err
            );
            return Err(err.into());
        }

        // a call on another channel works against that channel's ledger
        let (simulator, history) = if target.channel_id() != context.channel_id() {
            let ledger = self.shared.contexts.ledger();
            let simulator = ledger
                .new_tx_simulator(target.channel_id(), tx_id)
                .map_err(|_| HandlerError::LedgerNotFound(target.channel_id().to_string()))?;
            (simulator, ledger.new_history_query_executor(target.channel_id()).ok())
        } else {
            (
                Arc::clone(simulator(context)?),
                context.history_query_executor().cloned(),
            )
        };

        let message = ContractMessage::new(
            MessageType::Transaction,
            target.channel_id(),
            tx_id,
            spec.input().clone().into_bytes()?,
        );
        let is_system = self.shared.launcher.is_system_contract(target.name());
        let invocation = Invocation::new(target, spec, message, simulator, history).with_proposal(
            context.signed_proposal().cloned(),
            context.proposal().cloned(),
        );

        if is_system {
            debug!(
                "[{}] Calling system contract {} directly",
                short_tx_id(tx_id),
                invocation.target().name()
            );
        } else {
            debug!(
                "[{}] Launching contract {} on channel {}",
                short_tx_id(tx_id),
                invocation.target().name(),
                invocation.target().channel_id()
            );
            self.shared.launcher.launch(&invocation)?;
        }

        let response = self.shared.launcher.execute(invocation)?;
        Ok(response.into_bytes()?)
    }
}

fn simulator(context: &TransactionContext) -> Result<&Arc<dyn TxSimulator>, HandlerError> {
    context
        .simulator()
        .ok_or_else(|| HandlerError::MissingSimulator {
            channel_id: context.channel_id().to_string(),
            tx_id: context.tx_id().to_string(),
        })
}
