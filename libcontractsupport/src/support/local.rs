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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::handler::Handler;
use crate::protocol::contract::ContractInstance;
use crate::protocol::message::ContractMessage;
use crate::support::{
    ContractLaunchError, ContractLauncher, HandlerRegistry, Invocation, RegistrationError,
};

/// Keeps the sessions of the contracts connected to this node, and executes contract-to-contract
/// calls on them.
///
/// Contracts are expected to connect on their own; `launch` only checks that the target has
/// registered.
#[derive(Clone, Default)]
pub struct LocalHandlerRegistry {
    handlers: Arc<Mutex<HashMap<String, Handler>>>,
    system_contracts: Arc<HashSet<String>>,
}

impl LocalHandlerRegistry {
    pub fn new() -> Self {
        LocalHandlerRegistry::default()
    }

    /// Creates a registry treating the given contract names as system contracts.
    pub fn with_system_contracts(names: &[&str]) -> Self {
        LocalHandlerRegistry {
            handlers: Arc::default(),
            system_contracts: Arc::new(names.iter().map(|name| name.to_string()).collect()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Handler> {
        self.handlers.lock().ok()?.get(key).cloned()
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Finds the session serving `target`.
    ///
    /// A target without a version resolves to the only connected version of the contract; it
    /// is an error if several versions are connected.
    pub fn resolve(&self, target: &ContractInstance) -> Result<Handler, ContractLaunchError> {
        let handlers = self.handlers.lock().map_err(|_| {
            ContractLaunchError::LaunchFailed("handler registry unavailable".to_string())
        })?;

        let key = target.handler_key();
        if let Some(handler) = handlers.get(&key) {
            return Ok(handler.clone());
        }

        if target.version().is_empty() {
            let prefix = format!("{}:", target.name());
            let mut versions = handlers.iter().filter(|(registered, _)| registered.starts_with(&prefix));
            match (versions.next(), versions.next()) {
                (Some((_, handler)), None) => return Ok(handler.clone()),
                (Some(_), Some(_)) => {
                    return Err(ContractLaunchError::LaunchFailed(format!(
                        "several versions of contract {} are running",
                        target.name()
                    )))
                }
                _ => (),
            }
        }

        Err(ContractLaunchError::LaunchFailed(format!(
            "contract {} is not running",
            key
        )))
    }
}

impl HandlerRegistry for LocalHandlerRegistry {
    fn register(&self, key: &str, handler: Handler) -> Result<(), RegistrationError> {
        let mut handlers = self
            .handlers
            .lock()
            .map_err(|_| RegistrationError::Unavailable)?;
        if handlers.contains_key(key) {
            return Err(RegistrationError::Duplicate(key.to_string()));
        }
        debug!("Registered contract {}", key);
        handlers.insert(key.to_string(), handler);
        Ok(())
    }

    fn deregister(&self, key: &str) {
        if let Ok(mut handlers) = self.handlers.lock() {
            if handlers.remove(key).is_some() {
                debug!("Deregistered contract {}", key);
            }
        }
    }
}

impl ContractLauncher for LocalHandlerRegistry {
    fn is_system_contract(&self, name: &str) -> bool {
        self.system_contracts.contains(name)
    }

    fn launch(&self, invocation: &Invocation) -> Result<(), ContractLaunchError> {
        self.resolve(invocation.target()).map(|_| ())
    }

    fn execute(&self, invocation: Invocation) -> Result<ContractMessage, ContractLaunchError> {
        let handler = self.resolve(invocation.target())?;
        handler
            .execute(invocation)
            .map_err(|err| ContractLaunchError::ExecutionFailed(err.to_string()))
    }
}
