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

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum AccessControlError {
    /// The caller may not invoke the target contract.
    Denied(String),
}

impl Error for AccessControlError {}

impl fmt::Display for AccessControlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AccessControlError::Denied(msg) => write!(f, "access denied: {}", msg),
        }
    }
}

#[derive(Debug)]
pub enum ContractLaunchError {
    /// The target contract could not be started.
    LaunchFailed(String),
    /// The target contract failed to run the transaction.
    ExecutionFailed(String),
}

impl Error for ContractLaunchError {}

impl fmt::Display for ContractLaunchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContractLaunchError::LaunchFailed(msg) => {
                write!(f, "failed to launch invoked contract: {}", msg)
            }
            ContractLaunchError::ExecutionFailed(msg) => {
                write!(f, "failed to execute invoked contract: {}", msg)
            }
        }
    }
}

#[derive(Debug)]
pub enum RegistrationError {
    /// A session is already registered under the name.
    Duplicate(String),
    /// The registry could not be locked.
    Unavailable,
}

impl Error for RegistrationError {}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistrationError::Duplicate(name) => write!(f, "duplicate contract name: {}", name),
            RegistrationError::Unavailable => f.write_str("handler registry unavailable"),
        }
    }
}
