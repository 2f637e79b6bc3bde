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

use crate::fsm::{Event, State};

#[derive(Debug, PartialEq)]
pub enum FsmError {
    /// The event has no legal transition from the current state.
    InvalidEvent { event: Event, state: State },
    /// A `before` hook rejected the event.
    Cancelled { event: Event, reason: String },
    /// An `enter` or `after` hook failed.
    CallbackError(String),
    /// A hook panicked while holding the transition lock.
    Poisoned,
}

impl FsmError {
    /// Returns true for rejections that are part of normal operation.
    pub fn is_expected(&self) -> bool {
        match self {
            FsmError::InvalidEvent { .. } | FsmError::Cancelled { .. } => true,
            FsmError::CallbackError(_) | FsmError::Poisoned => false,
        }
    }
}

impl Error for FsmError {}

impl fmt::Display for FsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsmError::InvalidEvent { event, state } => {
                write!(f, "event {} inappropriate in current state {}", event, state)
            }
            FsmError::Cancelled { event, reason } => {
                write!(f, "transition on {} cancelled: {}", event, reason)
            }
            FsmError::CallbackError(msg) => write!(f, "state machine hook failed: {}", msg),
            FsmError::Poisoned => f.write_str("state machine lock poisoned"),
        }
    }
}
