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

use std::error::Error;

use crate::ledger::LedgerError;
use crate::protocol::message::ContractMessageBuildError;
use crate::protos::ProtoConversionError;
use crate::query::QueryError;
use crate::support::{AccessControlError, ContractLaunchError, RegistrationError};
use crate::transport::TransportError;

#[derive(Debug)]
pub enum HandlerError {
    /// A payload could not be parsed or a result could not be serialized.
    ProtoConversionError(ProtoConversionError),
    /// No transaction context exists for the request.
    MissingContext { channel_id: String, tx_id: String },
    /// The transaction context has no ledger simulator.
    MissingSimulator { channel_id: String, tx_id: String },
    /// The transaction context has no history query executor.
    MissingHistoryExecutor { channel_id: String, tx_id: String },
    /// The channel of a called contract has no ledger.
    LedgerNotFound(String),
    LedgerError(LedgerError),
    QueryError(QueryError),
    AccessDenied(AccessControlError),
    LaunchError(ContractLaunchError),
    RegistrationError(RegistrationError),
    /// The session has not registered a contract yet.
    NotRegistered,
    /// A context already exists for the transaction.
    DuplicateTransaction(String),
    /// A proposal was given without its signed proposal.
    MissingSignedProposal,
    MessageBuildError(ContractMessageBuildError),
    /// The contract did not answer within the configured timeout.
    Timeout(String),
    TransportError(TransportError),
    /// The session was closed while a caller was waiting on it.
    SessionClosed,
    /// The dispatch loops were already started.
    AlreadyRunning,
    /// A session thread could not be started.
    ThreadError(String),
}

impl Error for HandlerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            HandlerError::ProtoConversionError(ref err) => Some(err),
            HandlerError::LedgerError(ref err) => Some(err),
            HandlerError::QueryError(ref err) => Some(err),
            HandlerError::AccessDenied(ref err) => Some(err),
            HandlerError::LaunchError(ref err) => Some(err),
            HandlerError::RegistrationError(ref err) => Some(err),
            HandlerError::TransportError(ref err) => Some(err),
            HandlerError::MessageBuildError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            HandlerError::ProtoConversionError(ref err) => write!(f, "{}", err),
            HandlerError::MissingContext {
                ref channel_id,
                ref tx_id,
            } => write!(
                f,
                "no transaction context for channel {} and txid {}",
                channel_id, tx_id
            ),
            HandlerError::MissingSimulator {
                ref channel_id,
                ref tx_id,
            } => write!(
                f,
                "no ledger context for channel {} and txid {}",
                channel_id, tx_id
            ),
            HandlerError::MissingHistoryExecutor {
                ref channel_id,
                ref tx_id,
            } => write!(
                f,
                "no history query executor for channel {} and txid {}",
                channel_id, tx_id
            ),
            HandlerError::LedgerNotFound(ref channel_id) => {
                write!(f, "Failed to find ledger for called channel {}", channel_id)
            }
            HandlerError::LedgerError(ref err) => write!(f, "{}", err),
            HandlerError::QueryError(ref err) => write!(f, "{}", err),
            HandlerError::AccessDenied(ref err) => write!(f, "{}", err),
            HandlerError::LaunchError(ref err) => write!(f, "{}", err),
            HandlerError::RegistrationError(ref err) => write!(f, "{}", err),
            HandlerError::NotRegistered => f.write_str("no contract registered on the session"),
            HandlerError::DuplicateTransaction(ref tx_id) => {
                write!(f, "txid {} exists", tx_id)
            }
            HandlerError::MissingSignedProposal => {
                f.write_str("failed getting proposal context. Signed proposal is nil")
            }
            HandlerError::MessageBuildError(ref err) => write!(f, "{}", err),
            HandlerError::Timeout(ref tx_id) => {
                write!(f, "timeout expired while executing transaction {}", tx_id)
            }
            HandlerError::TransportError(ref err) => write!(f, "{}", err),
            HandlerError::SessionClosed => f.write_str("contract session closed"),
            HandlerError::AlreadyRunning => f.write_str("session is already running"),
            HandlerError::ThreadError(ref msg) => write!(f, "unable to start thread: {}", msg),
        }
    }
}

impl From<ProtoConversionError> for HandlerError {
    fn from(err: ProtoConversionError) -> Self {
        HandlerError::ProtoConversionError(err)
    }
}

impl From<LedgerError> for HandlerError {
    fn from(err: LedgerError) -> Self {
        HandlerError::LedgerError(err)
    }
}

impl From<QueryError> for HandlerError {
    fn from(err: QueryError) -> Self {
        HandlerError::QueryError(err)
    }
}

impl From<AccessControlError> for HandlerError {
    fn from(err: AccessControlError) -> Self {
        HandlerError::AccessDenied(err)
    }
}

impl From<ContractLaunchError> for HandlerError {
    fn from(err: ContractLaunchError) -> Self {
        HandlerError::LaunchError(err)
    }
}

impl From<RegistrationError> for HandlerError {
    fn from(err: RegistrationError) -> Self {
        HandlerError::RegistrationError(err)
    }
}

impl From<ContractMessageBuildError> for HandlerError {
    fn from(err: ContractMessageBuildError) -> Self {
        HandlerError::MessageBuildError(err)
    }
}

impl From<TransportError> for HandlerError {
    fn from(err: TransportError) -> Self {
        HandlerError::TransportError(err)
    }
}

#[derive(Debug)]
pub enum HandlerBuildError {
    MissingField(String),
    ThreadError(String),
}

impl Error for HandlerBuildError {}

impl std::fmt::Display for HandlerBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            HandlerBuildError::MissingField(ref s) => write!(f, "MissingField: {}", s),
            HandlerBuildError::ThreadError(ref s) => write!(f, "unable to start workers: {}", s),
        }
    }
}
