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

//! Collaborators a session relies on but does not implement itself: access control on
//! contract-to-contract calls, launching and executing invoked contracts, and the node-wide
//! table of connected contracts.

mod error;
mod local;

use std::sync::Arc;

use crate::handler::Handler;
use crate::ledger::{HistoryQueryExecutor, TxSimulator};
use crate::protocol::contract::{ContractInstance, ContractSpec, Proposal, SignedProposal};
use crate::protocol::message::ContractMessage;

pub use crate::support::error::{AccessControlError, ContractLaunchError, RegistrationError};
pub use crate::support::local::LocalHandlerRegistry;

/// Decides whether the proposal of a transaction may call the given contract.
pub trait AccessControl: Send + Sync {
    fn check(
        &self,
        signed_proposal: Option<&SignedProposal>,
        proposal: Option<&Proposal>,
        target: &ContractInstance,
    ) -> Result<(), AccessControlError>;
}

/// Allows every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAccessControl;

impl AccessControl for AllowAllAccessControl {
    fn check(
        &self,
        _signed_proposal: Option<&SignedProposal>,
        _proposal: Option<&Proposal>,
        _target: &ContractInstance,
    ) -> Result<(), AccessControlError> {
        Ok(())
    }
}

/// The table of running contract sessions, keyed by `ContractInstance::handler_key`.
pub trait HandlerRegistry: Send + Sync {
    fn register(&self, key: &str, handler: Handler) -> Result<(), RegistrationError>;

    fn deregister(&self, key: &str);
}

/// Starts contracts and runs transactions on them on behalf of a calling contract.
pub trait ContractLauncher: Send + Sync {
    /// System contracts run inside the node and are never launched.
    fn is_system_contract(&self, name: &str) -> bool;

    /// Makes sure the target of the invocation is running.
    fn launch(&self, invocation: &Invocation) -> Result<(), ContractLaunchError>;

    /// Runs the invocation and returns the final message of the target, either `COMPLETED` or
    /// `ERROR`.
    fn execute(&self, invocation: Invocation) -> Result<ContractMessage, ContractLaunchError>;
}

/// A contract-to-contract call.
///
/// The message is the `TRANSACTION` to run on the target; the ledger accessors are the ones
/// the target must use for the call's channel.
pub struct Invocation {
    target: ContractInstance,
    spec: ContractSpec,
    message: ContractMessage,
    simulator: Arc<dyn TxSimulator>,
    history: Option<Arc<dyn HistoryQueryExecutor>>,
    signed_proposal: Option<SignedProposal>,
    proposal: Option<Proposal>,
}

impl Invocation {
    pub fn new(
        target: ContractInstance,
        spec: ContractSpec,
        message: ContractMessage,
        simulator: Arc<dyn TxSimulator>,
        history: Option<Arc<dyn HistoryQueryExecutor>>,
    ) -> Self {
        Invocation {
            target,
            spec,
            message,
            simulator,
            history,
            signed_proposal: None,
            proposal: None,
        }
    }

    pub fn with_proposal(
        mut self,
        signed_proposal: Option<SignedProposal>,
        proposal: Option<Proposal>,
    ) -> Self {
        self.signed_proposal = signed_proposal;
        self.proposal = proposal;
        self
    }

    pub fn target(&self) -> &ContractInstance {
        &self.target
    }

    pub fn spec(&self) -> &ContractSpec {
        &self.spec
    }

    pub fn message(&self) -> &ContractMessage {
        &self.message
    }

    pub fn simulator(&self) -> &Arc<dyn TxSimulator> {
        &self.simulator
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
}
