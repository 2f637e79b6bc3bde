/*
 * Copyright 2017 Bitwise IO, Inc.
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

//! The node side of a contract session.
//!
//! One `Handler` exists per connected contract process.  It owns the session's state machine,
//! its transaction contexts and cursors, and two dispatch loops:
//!
//! * the inbound loop receives messages from the contract and feeds them to the state machine;
//! * the outbound loop takes `NextStateInfo` instructions from an internal queue, feeds their
//!   message to the state machine, and forwards it to the contract when asked to.
//!
//! Ledger requests from the contract are run on a small worker pool so neither loop ever
//! waits on the ledger.

mod config;
mod error;
mod pool;
mod requests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use crate::context::{TransactionContext, TransactionContextRegistry};
use crate::fsm::{Event, Fsm, FsmBuilder, State};
use crate::handler::pool::WorkerPool;
use crate::ledger::LedgerProvider;
use crate::protocol::contract::{ContractId, ContractInstance, Proposal, SignedProposal};
use crate::protocol::message::{ContractMessage, ContractMessageBuilder, MessageType};
use crate::protos::FromBytes;
use crate::query::QueryResultPaginator;
use crate::short_tx_id;
use crate::support::{
    AccessControl, AllowAllAccessControl, ContractLauncher, HandlerRegistry, Invocation,
};
use crate::transport::ContractStream;

pub use crate::handler::config::{SessionConfig, SessionConfigBuildError, SessionConfigBuilder};
pub use crate::handler::error::{HandlerBuildError, HandlerError};

/// An instruction for the outbound dispatch loop.
#[derive(Debug, Clone)]
pub struct NextStateInfo {
    msg: ContractMessage,
    send_to_contract: bool,
    send_sync: bool,
}

impl NextStateInfo {
    pub fn msg(&self) -> &ContractMessage {
        &self.msg
    }

    pub fn send_to_contract(&self) -> bool {
        self.send_to_contract
    }

    pub fn send_sync(&self) -> bool {
        self.send_sync
    }
}

enum OutboundCommand {
    Next(NextStateInfo),
    Shutdown,
}

/// How a request worker returns its result to the contract.
#[derive(Clone, Copy)]
enum Reply {
    /// Sent straight to the contract.
    Direct,
    /// Passed through the outbound loop, so the state machine sees it first.
    NextState,
}

struct Shared {
    fsm: Fsm<Handler, HandlerError>,
    contexts: TransactionContextRegistry,
    paginator: QueryResultPaginator,
    stream: Arc<dyn ContractStream>,
    send_lock: Mutex<()>,
    outbound: Mutex<Sender<OutboundCommand>>,
    outbound_receiver: Mutex<Option<Receiver<OutboundCommand>>>,
    ready_notify: Mutex<Option<SyncSender<bool>>>,
    contract_id: RwLock<Option<ContractId>>,
    instance: RwLock<Option<ContractInstance>>,
    registered: AtomicBool,
    handler_registry: Arc<dyn HandlerRegistry>,
    access_control: Arc<dyn AccessControl>,
    launcher: Arc<dyn ContractLauncher>,
    workers: WorkerPool,
    config: SessionConfig,
}

/// A session with one contract process.
#[derive(Clone)]
pub struct Handler {
    shared: Arc<Shared>,
}

/// The threads running the dispatch loops of a session.
pub struct SessionThreads {
    inbound: thread::JoinHandle<()>,
    outbound: thread::JoinHandle<()>,
}

impl SessionThreads {
    /// Waits until both dispatch loops have stopped.
    pub fn join(self) -> Result<(), HandlerError> {
        let inbound = self.inbound.join();
        let outbound = self.outbound.join();
        if inbound.is_err() || outbound.is_err() {
            return Err(HandlerError::ThreadError(
                "a session thread panicked".into(),
            ));
        }
        Ok(())
    }
}

/// Ends the session when a dispatch loop exits, however it exits.
struct SessionGuard<'a> {
    handler: &'a Handler,
}

impl<'a> Drop for SessionGuard<'a> {
    fn drop(&mut self) {
        self.handler.end_session();
    }
}

impl Handler {
    /// Starts the inbound and outbound dispatch loops.
    ///
    /// The session runs until the contract closes its stream, the stream fails, or the
    /// protocol is violated; the state machine is then in `end` and the handler deregistered.
    pub fn process_stream(&self) -> Result<SessionThreads, HandlerError> {
        let receiver = self
            .shared
            .outbound_receiver
            .lock()
            .map_err(|_| HandlerError::AlreadyRunning)?
            .take()
            .ok_or(HandlerError::AlreadyRunning)?;

        let handler = self.clone();
        let outbound = thread::Builder::new()
            .name("ContractSession-outbound".into())
            .spawn(move || handler.run_outbound(receiver))
            .map_err(|err| HandlerError::ThreadError(err.to_string()))?;

        let handler = self.clone();
        let inbound = match thread::Builder::new()
            .name("ContractSession-inbound".into())
            .spawn(move || handler.run_inbound())
        {
            Ok(inbound) => inbound,
            Err(err) => {
                self.end_session();
                return Err(HandlerError::ThreadError(err.to_string()));
            }
        };

        Ok(SessionThreads { inbound, outbound })
    }

    fn run_inbound(&self) {
        let _guard = SessionGuard { handler: self };
        loop {
            let msg = match self.shared.stream.recv() {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    debug!("Received end of stream, ending contract session");
                    break;
                }
                Err(err) => {
                    error!("Error receiving from contract stream, ending session: {}", err);
                    break;
                }
            };

            trace!(
                "[{}] Received message {} from contract",
                short_tx_id(msg.tx_id()),
                msg.message_type()
            );
            match msg.message_type() {
                MessageType::Keepalive => continue,
                MessageType::Error => error!(
                    "[{}] Got error: {}",
                    short_tx_id(msg.tx_id()),
                    String::from_utf8_lossy(msg.payload())
                ),
                _ => (),
            }

            self.handle_message(&msg);

            if self.shared.fsm.current() == State::End {
                break;
            }
        }
    }

    fn run_outbound(&self, receiver: Receiver<OutboundCommand>) {
        let _guard = SessionGuard { handler: self };
        while let Ok(command) = receiver.recv() {
            let info = match command {
                OutboundCommand::Next(info) => info,
                OutboundCommand::Shutdown => break,
            };

            // local bookkeeping transitions happen even for messages we synthesized
            self.handle_message(&info.msg);

            if !info.send_to_contract {
                continue;
            }

            if info.send_sync {
                if info.msg.message_type() != MessageType::Ready {
                    error!(
                        "[{}] Sync send can only be for READY state, got {}; ending session",
                        short_tx_id(info.msg.tx_id()),
                        info.msg.message_type()
                    );
                    break;
                }
                if let Err(err) = self.serial_send(&info.msg) {
                    error!(
                        "[{}] Error sending READY, ending session: {}",
                        short_tx_id(info.msg.tx_id()),
                        err
                    );
                    break;
                }
            } else {
                self.serial_send_async(info.msg);
            }
        }
    }

    /// Stops the session: the state machine ends, the handler deregisters, both loops and the
    /// request workers stop, and the stream is closed.  Safe to call more than once.
    fn end_session(&self) {
        let msg = ContractMessage::new(
            MessageType::Error,
            "",
            "",
            b"contract session ended".to_vec(),
        );
        match self.shared.fsm.terminate(self, &msg) {
            Ok(true) => info!("Contract session ended"),
            Ok(false) => (),
            Err(err) => error!("Error ending contract session: {}", err),
        }
        self.deregister();

        if let Ok(outbound) = self.shared.outbound.lock() {
            // the outbound loop may already be gone
            let _ = outbound.send(OutboundCommand::Shutdown);
        }
        self.shared.workers.shutdown();
        self.shared.stream.close();
    }

    /// Runs a message received from the contract, or synthesized by the node, through the
    /// state machine.
    ///
    /// `COMPLETED` and `ERROR` in `ready` only release the caller waiting on the transaction.
    /// Messages the state machine cannot take in its current state are logged and dropped.
    pub fn handle_message(&self, msg: &ContractMessage) {
        let message_type = msg.message_type();
        let current = self.shared.fsm.current();
        debug!(
            "[{}] Handling message of type {} in state {}",
            short_tx_id(msg.tx_id()),
            message_type,
            current
        );

        if (message_type == MessageType::Completed || message_type == MessageType::Error)
            && current == State::Ready
        {
            self.notify(msg);
            return;
        }

        let event = match Event::from_message_type(message_type) {
            Some(event) => event,
            None => {
                error!(
                    "[{}] Contract handler cannot handle message of type {}",
                    short_tx_id(msg.tx_id()),
                    message_type
                );
                return;
            }
        };

        if !self.shared.fsm.can(event) {
            error!(
                "[{}] Contract handler FSM cannot handle message ({}) with payload size ({}) \
                 while in state: {}",
                short_tx_id(msg.tx_id()),
                message_type,
                msg.payload().len(),
                current
            );
            return;
        }

        if let Err(err) = self.shared.fsm.event(self, event, msg) {
            if err.is_expected() {
                debug!("[{}] Ignoring event: {}", short_tx_id(msg.tx_id()), err);
            } else {
                error!(
                    "[{}] Failed to trigger FSM event {}: {}",
                    short_tx_id(msg.tx_id()),
                    event,
                    err
                );
            }
        }
    }

    /// Delivers `msg` to the caller waiting on its transaction and closes the transaction's
    /// cursors.
    pub fn notify(&self, msg: &ContractMessage) {
        let tx_id = msg.tx_id();
        match self.shared.contexts.get(msg.channel_id(), tx_id) {
            Some(context) => {
                debug!(
                    "[{}] Notifying Txid:{}, channelID:{}",
                    short_tx_id(tx_id),
                    tx_id,
                    msg.channel_id()
                );
                if !context.notify(msg.clone()) {
                    debug!("[{}] Transaction already notified", short_tx_id(tx_id));
                }
                self.shared.paginator.close_all(&context);
            }
            None => debug!(
                "[{}] Notifier Txid:{}, channelID:{} does not exist",
                short_tx_id(tx_id),
                tx_id,
                msg.channel_id()
            ),
        }
    }

    /// Queues a message for the outbound loop, optionally to be forwarded to the contract.
    /// Returns false if the session has stopped.
    pub fn trigger_next_state(&self, msg: ContractMessage, send_to_contract: bool) -> bool {
        self.enqueue(NextStateInfo {
            msg,
            send_to_contract,
            send_sync: false,
        })
    }

    fn enqueue(&self, info: NextStateInfo) -> bool {
        let tx_id = info.msg.tx_id().to_string();
        let sent = match self.shared.outbound.lock() {
            Ok(outbound) => outbound.send(OutboundCommand::Next(info)).is_ok(),
            Err(_) => false,
        };
        if !sent {
            warn!(
                "[{}] Session stopped, dropping next state",
                short_tx_id(&tx_id)
            );
        }
        sent
    }

    /// Sends a message to the contract, one send at a time.
    pub fn serial_send(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        let _guard = self
            .shared
            .send_lock
            .lock()
            .map_err(|_| HandlerError::SessionClosed)?;
        self.shared.stream.send(msg)?;
        Ok(())
    }

    /// Sends a message to the contract from a separate thread.
    fn serial_send_async(&self, msg: ContractMessage) {
        let handler = self.clone();
        let spawned = thread::Builder::new()
            .name("ContractSession-send".into())
            .spawn(move || {
                if let Err(err) = handler.serial_send(&msg) {
                    error!(
                        "[{}] Error sending {}: {}",
                        short_tx_id(msg.tx_id()),
                        msg.message_type(),
                        err
                    );
                }
            });
        if let Err(err) = spawned {
            error!("Unable to start send thread: {}", err);
        }
    }

    /// Installs the channel notified once the session reaches `established`.
    pub fn set_ready_notify(&self, notify: SyncSender<bool>) {
        if let Ok(mut ready_notify) = self.shared.ready_notify.lock() {
            *ready_notify = Some(notify);
        }
    }

    fn notify_during_startup(&self, ok: bool) {
        let notify = match self.shared.ready_notify.lock() {
            Ok(ready_notify) => ready_notify.clone(),
            Err(_) => None,
        };

        match notify {
            Some(notify) => {
                if notify.try_send(ok).is_err() {
                    debug!("Readiness waiter is gone");
                }
            }
            None => {
                debug!("Nothing to notify, sending READY");
                self.trigger_next_state(
                    ContractMessage::new(MessageType::Ready, "", "", vec![]),
                    true,
                );
            }
        }
    }

    /// Starts the readiness handshake of a transaction.
    ///
    /// Creates the transaction context and synchronously forwards `READY` to the contract.  The
    /// returned receiver yields the message that completes the handshake; the caller removes
    /// the context with `delete_transaction_context` once done.
    pub fn ready(
        &self,
        channel_id: &str,
        tx_id: &str,
        signed_proposal: Option<SignedProposal>,
        proposal: Option<Proposal>,
    ) -> Result<Receiver<ContractMessage>, HandlerError> {
        let msg = attach_proposal(
            ContractMessageBuilder::new()
                .with_message_type(MessageType::Ready)
                .with_channel_id(channel_id.to_string())
                .with_tx_id(tx_id.to_string()),
            signed_proposal.as_ref(),
            proposal.as_ref(),
        )?;

        let context = self
            .shared
            .contexts
            .create(channel_id, tx_id, signed_proposal, proposal)
            .ok_or_else(|| HandlerError::DuplicateTransaction(tx_id.to_string()))?;
        let receiver = context
            .take_response_receiver()
            .ok_or(HandlerError::SessionClosed)?;

        if !self.enqueue(NextStateInfo {
            msg,
            send_to_contract: true,
            send_sync: true,
        }) {
            self.shared.contexts.delete(channel_id, tx_id);
            return Err(HandlerError::SessionClosed);
        }

        Ok(receiver)
    }

    /// Sends a transaction to the contract and waits for it to finish.
    ///
    /// The returned message is the `COMPLETED` or `ERROR` that ended the transaction.  The
    /// transaction context only lives for the duration of the call.
    pub fn send_execute_message(
        &self,
        channel_id: &str,
        msg: ContractMessage,
        signed_proposal: Option<SignedProposal>,
        proposal: Option<Proposal>,
    ) -> Result<ContractMessage, HandlerError> {
        let msg = attach_proposal(
            msg.into_builder().with_channel_id(channel_id.to_string()),
            signed_proposal.as_ref(),
            proposal.as_ref(),
        )?;

        let context = self
            .shared
            .contexts
            .create(channel_id, msg.tx_id(), signed_proposal, proposal)
            .ok_or_else(|| HandlerError::DuplicateTransaction(msg.tx_id().to_string()))?;

        self.wait_for_response(&context, msg)
    }

    /// Runs a contract-to-contract call on this session, with the caller's ledger accessors.
    pub fn execute(&self, invocation: Invocation) -> Result<ContractMessage, HandlerError> {
        let msg = attach_proposal(
            invocation.message().clone().into_builder(),
            invocation.signed_proposal(),
            invocation.proposal(),
        )?;

        let context = self
            .shared
            .contexts
            .create_with_accessors(
                msg.channel_id(),
                msg.tx_id(),
                Some(Arc::clone(invocation.simulator())),
                invocation.history_query_executor().cloned(),
                invocation.signed_proposal().cloned(),
                invocation.proposal().cloned(),
            )
            .ok_or_else(|| HandlerError::DuplicateTransaction(msg.tx_id().to_string()))?;

        self.wait_for_response(&context, msg)
    }

    fn wait_for_response(
        &self,
        context: &TransactionContext,
        msg: ContractMessage,
    ) -> Result<ContractMessage, HandlerError> {
        let channel_id = context.channel_id().to_string();
        let tx_id = context.tx_id().to_string();

        let result = match context.take_response_receiver() {
            Some(receiver) => {
                if self.trigger_next_state(msg, true) {
                    self.await_response(&receiver, &tx_id)
                } else {
                    Err(HandlerError::SessionClosed)
                }
            }
            None => Err(HandlerError::SessionClosed),
        };

        if let Err(ref err) = result {
            debug!("[{}] Execute failed: {}", short_tx_id(&tx_id), err);
            self.shared.paginator.close_all(context);
        }
        self.shared.contexts.delete(&channel_id, &tx_id);
        result
    }

    fn await_response(
        &self,
        receiver: &Receiver<ContractMessage>,
        tx_id: &str,
    ) -> Result<ContractMessage, HandlerError> {
        match self.shared.config.execute_timeout() {
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => HandlerError::Timeout(tx_id.to_string()),
                RecvTimeoutError::Disconnected => HandlerError::SessionClosed,
            }),
            None => receiver.recv().map_err(|_| HandlerError::SessionClosed),
        }
    }

    pub fn delete_transaction_context(&self, channel_id: &str, tx_id: &str) {
        self.shared.contexts.delete(channel_id, tx_id);
    }

    /// Removes the session from the handler registry.  Does nothing if it is not registered.
    pub fn deregister(&self) {
        if self.shared.registered.swap(false, Ordering::SeqCst) {
            if let Some(instance) = self.contract_instance() {
                let key = instance.handler_key();
                self.shared.handler_registry.deregister(&key);
                debug!("Deregistered handler for contract {}", key);
            }
        }
    }

    /// Returns true once the session has left the `created` and `established` states.
    pub fn is_running(&self) -> bool {
        match self.shared.fsm.current() {
            State::Created | State::Established => false,
            State::Ready | State::End => true,
        }
    }

    pub fn current_state(&self) -> State {
        self.shared.fsm.current()
    }

    pub fn contract_id(&self) -> Option<ContractId> {
        self.shared.contract_id.read().ok()?.clone()
    }

    pub fn contract_instance(&self) -> Option<ContractInstance> {
        self.shared.instance.read().ok()?.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// The namespace ledger requests of the contract are scoped to.
    fn namespace(&self) -> Result<String, HandlerError> {
        self.contract_instance()
            .map(|instance| instance.name().to_string())
            .ok_or(HandlerError::NotRegistered)
    }

    fn submit_request(
        &self,
        msg: &ContractMessage,
        handle: fn(&Handler, &ContractMessage) -> Option<ContractMessage>,
        reply: Reply,
    ) -> Result<(), HandlerError> {
        let handler = self.clone();
        let msg = msg.clone();
        let submitted = self.shared.workers.submit(move || {
            if let Some(response) = handle(&handler, &msg) {
                match reply {
                    Reply::Direct => handler.serial_send_async(response),
                    Reply::NextState => {
                        handler.trigger_next_state(response, true);
                    }
                }
            }
        });

        if submitted {
            Ok(())
        } else {
            Err(HandlerError::SessionClosed)
        }
    }

    // State machine hooks

    fn before_registered(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        let contract_id = ContractId::from_bytes(msg.payload()).map_err(|err| {
            error!("Error in received REGISTER: {}", err);
            HandlerError::from(err)
        })?;
        let instance = ContractInstance::from_name(contract_id.name());
        debug!(
            "Received REGISTER for contract {} version {} on channel {}",
            instance.name(),
            instance.version(),
            instance.channel_id()
        );

        let key = instance.handler_key();
        if let Err(err) = self.shared.handler_registry.register(&key, self.clone()) {
            error!("Unable to register contract {}: {}", key, err);
            return Err(err.into());
        }
        self.shared.registered.store(true, Ordering::SeqCst);

        if let Ok(mut stored) = self.shared.contract_id.write() {
            *stored = Some(contract_id);
        }
        if let Ok(mut stored) = self.shared.instance.write() {
            *stored = Some(instance);
        }

        let registered = ContractMessage::new(MessageType::Registered, "", "", vec![]);
        if let Err(err) = self.serial_send(&registered) {
            error!("Error sending REGISTERED: {}", err);
            self.deregister();
            return Err(err);
        }
        debug!("Sent REGISTERED");
        Ok(())
    }

    fn before_completed(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        debug!(
            "[{}] Before completed, payload size {}",
            short_tx_id(msg.tx_id()),
            msg.payload().len()
        );
        Ok(())
    }

    fn after_get_state(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_get_state, Reply::Direct)
    }

    fn after_get_state_by_range(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_get_state_by_range, Reply::Direct)
    }

    fn after_get_query_result(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_get_query_result, Reply::Direct)
    }

    fn after_get_history_for_key(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_get_history_for_key, Reply::Direct)
    }

    fn after_query_state_next(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_query_state_next, Reply::Direct)
    }

    fn after_query_state_close(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_query_state_close, Reply::Direct)
    }

    fn after_put_state(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_put_state, Reply::NextState)
    }

    fn after_del_state(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.submit_request(msg, Handler::handle_del_state, Reply::NextState)
    }

    /// A call blocks until the called contract finishes, so it runs on its own thread rather
    /// than on a request worker.
    fn after_invoke(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        let handler = self.clone();
        let msg = msg.clone();
        thread::Builder::new()
            .name("ContractSession-invoke".into())
            .spawn(move || {
                if let Some(response) = handler.handle_invoke_contract(&msg) {
                    handler.trigger_next_state(response, true);
                }
            })
            .map(|_| ())
            .map_err(|err| HandlerError::ThreadError(err.to_string()))
    }

    fn enter_established(&self, _msg: &ContractMessage) -> Result<(), HandlerError> {
        self.notify_during_startup(true);
        Ok(())
    }

    fn enter_ready(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.notify(msg);
        info!("[{}] Entered state ready", short_tx_id(msg.tx_id()));
        Ok(())
    }

    fn enter_end(&self, msg: &ContractMessage) -> Result<(), HandlerError> {
        self.notify(msg);

        // nobody will answer the transactions still in flight
        for context in self.shared.contexts.contexts() {
            let failure = ContractMessage::new(
                MessageType::Error,
                context.channel_id(),
                context.tx_id(),
                b"contract session ended".to_vec(),
            );
            context.notify(failure);
            self.shared.paginator.close_all(&context);
        }

        self.deregister();
        Ok(())
    }
}

fn attach_proposal(
    builder: ContractMessageBuilder,
    signed_proposal: Option<&SignedProposal>,
    proposal: Option<&Proposal>,
) -> Result<ContractMessage, HandlerError> {
    let builder = match (proposal, signed_proposal) {
        (Some(_), Some(signed_proposal)) => builder.with_proposal(signed_proposal.clone()),
        (Some(_), None) => return Err(HandlerError::MissingSignedProposal),
        (None, _) => builder,
    };
    Ok(builder.build()?)
}

fn build_fsm() -> Fsm<Handler, HandlerError> {
    FsmBuilder::new()
        .with_before(Event::Registered, Handler::before_registered)
        .with_before(Event::Completed, Handler::before_completed)
        .with_after(Event::GetState, Handler::after_get_state)
        .with_after(Event::GetStateByRange, Handler::after_get_state_by_range)
        .with_after(Event::GetQueryResult, Handler::after_get_query_result)
        .with_after(Event::GetHistoryForKey, Handler::after_get_history_for_key)
        .with_after(Event::QueryStateNext, Handler::after_query_state_next)
        .with_after(Event::QueryStateClose, Handler::after_query_state_close)
        .with_after(Event::PutState, Handler::after_put_state)
        .with_after(Event::DelState, Handler::after_del_state)
        .with_after(Event::Invoke, Handler::after_invoke)
        .with_enter(State::Established, Handler::enter_established)
        .with_enter(State::Ready, Handler::enter_ready)
        .with_enter(State::End, Handler::enter_end)
        .build()
}

/// Builds a `Handler` for a newly connected contract.
///
/// The stream, the ledger provider, the handler registry and the contract launcher are
/// required.  Access control defaults to `AllowAllAccessControl` and the configuration to
/// `SessionConfig::default()`.
#[derive(Default)]
pub struct HandlerBuilder {
    config: Option<SessionConfig>,
    stream: Option<Arc<dyn ContractStream>>,
    ledger: Option<Arc<dyn LedgerProvider>>,
    handler_registry: Option<Arc<dyn HandlerRegistry>>,
    access_control: Option<Arc<dyn AccessControl>>,
    launcher: Option<Arc<dyn ContractLauncher>>,
}

impl HandlerBuilder {
    pub fn new() -> Self {
        HandlerBuilder::default()
    }

    pub fn with_config(mut self, config: SessionConfig) -> HandlerBuilder {
        self.config = Some(config);
        self
    }

    pub fn with_stream(mut self, stream: Arc<dyn ContractStream>) -> HandlerBuilder {
        self.stream = Some(stream);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerProvider>) -> HandlerBuilder {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_handler_registry(
        mut self,
        handler_registry: Arc<dyn HandlerRegistry>,
    ) -> HandlerBuilder {
        self.handler_registry = Some(handler_registry);
        self
    }

    pub fn with_access_control(mut self, access_control: Arc<dyn AccessControl>) -> HandlerBuilder {
        self.access_control = Some(access_control);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ContractLauncher>) -> HandlerBuilder {
        self.launcher = Some(launcher);
        self
    }

    pub fn build(self) -> Result<Handler, HandlerBuildError> {
        let config = self.config.unwrap_or_default();
        let stream = self
            .stream
            .ok_or_else(|| HandlerBuildError::MissingField("stream".into()))?;
        let ledger = self
            .ledger
            .ok_or_else(|| HandlerBuildError::MissingField("ledger".into()))?;
        let handler_registry = self
            .handler_registry
            .ok_or_else(|| HandlerBuildError::MissingField("handler_registry".into()))?;
        let launcher = self
            .launcher
            .ok_or_else(|| HandlerBuildError::MissingField("launcher".into()))?;
        let access_control = self
            .access_control
            .unwrap_or_else(|| Arc::new(AllowAllAccessControl));

        let workers = WorkerPool::new("ContractSession-request", config.request_workers())
            .map_err(|err| HandlerBuildError::ThreadError(err.to_string()))?;
        let (outbound, outbound_receiver) = channel();

        Ok(Handler {
            shared: Arc::new(Shared {
                fsm: build_fsm(),
                contexts: TransactionContextRegistry::new(ledger),
                paginator: QueryResultPaginator::new(config.max_result_batch_size()),
                stream,
                send_lock: Mutex::new(()),
                outbound: Mutex::new(outbound),
                outbound_receiver: Mutex::new(Some(outbound_receiver)),
                ready_notify: Mutex::new(None),
                contract_id: RwLock::new(None),
                instance: RwLock::new(None),
                registered: AtomicBool::new(false),
                handler_registry,
                access_control,
                launcher,
                workers,
                config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ledger::memory::InMemoryLedger;
    use crate::protocol::request::GetState;
    use crate::protos::IntoBytes;
    use crate::support::LocalHandlerRegistry;
    use crate::transport::{ChannelStream, TransportError};

    use std::time::{Duration, Instant};

    fn handler() -> (Handler, ChannelStream, LocalHandlerRegistry) {
        let registry = LocalHandlerRegistry::new();
        let (handler, contract) = handler_with(&registry);
        (handler, contract, registry)
    }

    fn handler_with(registry: &LocalHandlerRegistry) -> (Handler, ChannelStream) {
        let (node, contract) = ChannelStream::pair();
        let ledger = InMemoryLedger::new();
        ledger.create_channel("ch").unwrap();
        let handler = HandlerBuilder::new()
            .with_stream(Arc::new(node))
            .with_ledger(Arc::new(ledger))
            .with_handler_registry(Arc::new(registry.clone()))
            .with_launcher(Arc::new(registry.clone()))
            .build()
            .unwrap();
        (handler, contract)
    }

    fn register_msg(name: &str) -> ContractMessage {
        ContractMessage::new(
            MessageType::Register,
            "",
            "",
            ContractId::new(name).into_bytes().unwrap(),
        )
    }

    #[test]
    fn builder_requires_collaborators() {
        match HandlerBuilder::new().build() {
            Err(HandlerBuildError::MissingField(field)) => assert_eq!("stream", field),
            _ => panic!("Expected MissingField"),
        }
    }

    #[test]
    fn register_decomposes_identity() {
        let (handler, contract, registry) = handler();
        handler.handle_message(&register_msg("mycc:1.0/ch"));

        assert_eq!(State::Established, handler.current_state());
        assert!(!handler.is_running());
        let instance = handler.contract_instance().unwrap();
        assert_eq!("mycc", instance.name());
        assert_eq!("1.0", instance.version());
        assert_eq!("ch", instance.channel_id());
        assert!(registry.is_registered("mycc:1.0"));

        let reply = contract.recv().unwrap().unwrap();
        assert_eq!(MessageType::Registered, reply.message_type());

        handler.deregister();
        handler.deregister();
        assert!(!registry.is_registered("mycc:1.0"));
    }

    #[test]
    fn malformed_register_is_cancelled() {
        let (handler, _contract, registry) = handler();
        handler.handle_message(&ContractMessage::new(
            MessageType::Register,
            "",
            "",
            vec![0xff, 0xff, 0xff],
        ));

        assert_eq!(State::Created, handler.current_state());
        assert!(handler.contract_id().is_none());
        assert!(!registry.is_registered(""));
    }

    #[test]
    fn illegal_event_is_dropped() {
        let (handler, _contract, _registry) = handler();
        handler.handle_message(&ContractMessage::new(MessageType::GetState, "ch", "tx1", vec![]));
        assert_eq!(State::Created, handler.current_state());
    }

    #[test]
    fn proposal_requires_signed_proposal() {
        let (handler, _contract, _registry) = handler();
        let msg = ContractMessage::new(MessageType::Transaction, "ch", "tx1", vec![]);

        match handler.send_execute_message("ch", msg, None, Some(Proposal::default())) {
            Err(HandlerError::MissingSignedProposal) => (),
            res => panic!("Expected MissingSignedProposal, got {:?}", res),
        }
    }

    #[test]
    fn versions_register_side_by_side() {
        let registry = LocalHandlerRegistry::new();
        let (first, _first_contract) = handler_with(&registry);
        let (second, _second_contract) = handler_with(&registry);

        first.handle_message(&register_msg("mycc:1.0/ch"));
        second.handle_message(&register_msg("mycc:2.0/ch"));

        assert_eq!(State::Established, first.current_state());
        assert_eq!(State::Established, second.current_state());
        assert!(registry.is_registered("mycc:1.0"));
        assert!(registry.is_registered("mycc:2.0"));

        let target = ContractInstance::from_name("mycc:2.0");
        let resolved = registry.resolve(&target).unwrap();
        assert_eq!("2.0", resolved.contract_instance().unwrap().version());

        // without a version the target is ambiguous
        assert!(registry
            .resolve(&ContractInstance::from_name("mycc"))
            .is_err());

        second.deregister();
        let resolved = registry
            .resolve(&ContractInstance::from_name("mycc"))
            .unwrap();
        assert_eq!("1.0", resolved.contract_instance().unwrap().version());

        first.deregister();
    }

    #[test]
    fn sync_send_of_non_ready_ends_session() {
        let (handler, contract, _registry) = handler();
        let threads = handler.process_stream().unwrap();

        assert!(handler.enqueue(NextStateInfo {
            msg: ContractMessage::new(MessageType::Transaction, "ch", "tx1", vec![]),
            send_to_contract: true,
            send_sync: true,
        }));

        let start = Instant::now();
        while handler.current_state() != State::End {
            assert!(start.elapsed() < Duration::from_secs(5), "Session did not end");
            thread::sleep(Duration::from_millis(10));
        }

        // the node closed its end of the stream without sending the transaction
        match contract.recv_timeout(Duration::from_secs(5)) {
            Err(TransportError::Disconnected) => (),
            other => panic!("Expected a closed stream, got {:?}", other),
        }

        drop(contract);
        threads.join().unwrap();
    }

    #[test]
    fn duplicate_request_is_dropped() {
        let (handler, _contract, _registry) = handler();
        handler.handle_message(&register_msg("mycc"));
        handler
            .shared
            .contexts
            .create("ch", "tx1", None, None)
            .unwrap();

        let msg = ContractMessage::new(
            MessageType::GetState,
            "ch",
            "tx1",
            GetState::new("a", None).into_bytes().unwrap(),
        );

        assert!(handler
            .shared
            .contexts
            .create_unique_request_marker("ch", "tx1"));
        assert!(handler.handle_get_state(&msg).is_none());

        handler.shared.contexts.delete_request_marker("ch", "tx1");
        let response = handler.handle_get_state(&msg).unwrap();
        assert_eq!(MessageType::Response, response.message_type());
        assert!(handler
            .shared
            .contexts
            .create_unique_request_marker("ch", "tx1"));
    }

    #[test]
    fn malformed_payload_releases_marker() {
        let (handler, _contract, _registry) = handler();
        handler.handle_message(&register_msg("mycc"));
        handler
            .shared
            .contexts
            .create("ch", "tx1", None, None)
            .unwrap();

        let msg = ContractMessage::new(MessageType::PutState, "ch", "tx1", vec![0xff, 0xff]);
        let response = handler.handle_put_state(&msg).unwrap();
        assert_eq!(MessageType::Error, response.message_type());
        assert!(handler
            .shared
            .contexts
            .create_unique_request_marker("ch", "tx1"));
    }

    #[test]
    fn ready_notify_replaces_ready_message() {
        let (handler, _contract, _registry) = handler();
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        handler.set_ready_notify(tx);

        handler.handle_message(&register_msg("mycc"));
        assert_eq!(Ok(true), rx.try_recv());
    }
}
