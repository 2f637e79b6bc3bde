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

//! The state machine governing a contract session.
//!
//! A session moves `created -> established -> ready` and finally to the terminal `end` state.
//! Each event raised carries the message that caused it.  Hooks are attached per event
//! (`before` and `after`) or per state (`enter`) and are run in this order:
//!
//! 1. the `before` hook of the event, which can cancel the transition by returning an error;
//! 2. the state change;
//! 3. the `enter` hook of the new state, only if the state actually changed;
//! 4. the `after` hook of the event.
//!
//! Transitions are serialized; the current state can be read at any time.

mod error;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, RwLock};

use crate::protocol::message::{ContractMessage, MessageType};

pub use crate::fsm::error::FsmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Created,
    Established,
    Ready,
    End,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            State::Created => "created",
            State::Established => "established",
            State::Ready => "ready",
            State::End => "end",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Registered,
    Ready,
    PutState,
    DelState,
    Invoke,
    Completed,
    GetState,
    GetStateByRange,
    GetQueryResult,
    GetHistoryForKey,
    QueryStateNext,
    QueryStateClose,
    Error,
    Response,
    Init,
    Transaction,
}

impl Event {
    /// Returns the event raised by a message of the given type, if any.
    ///
    /// A contract announces itself with `REGISTER`; both it and the `REGISTERED` reply raise
    /// the `Registered` event.
    pub fn from_message_type(message_type: MessageType) -> Option<Event> {
        let event = match message_type {
            MessageType::Register | MessageType::Registered => Event::Registered,
            MessageType::Ready => Event::Ready,
            MessageType::PutState => Event::PutState,
            MessageType::DelState => Event::DelState,
            MessageType::InvokeContract => Event::Invoke,
            MessageType::Completed => Event::Completed,
            MessageType::GetState => Event::GetState,
            MessageType::GetStateByRange => Event::GetStateByRange,
            MessageType::GetQueryResult => Event::GetQueryResult,
            MessageType::GetHistoryForKey => Event::GetHistoryForKey,
            MessageType::QueryStateNext => Event::QueryStateNext,
            MessageType::QueryStateClose => Event::QueryStateClose,
            MessageType::Error => Event::Error,
            MessageType::Response => Event::Response,
            MessageType::Init => Event::Init,
            MessageType::Transaction => Event::Transaction,
            MessageType::Undefined | MessageType::Keepalive => return None,
        };
        Some(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Event::Registered => "REGISTERED",
            Event::Ready => "READY",
            Event::PutState => "PUT_STATE",
            Event::DelState => "DEL_STATE",
            Event::Invoke => "INVOKE_CONTRACT",
            Event::Completed => "COMPLETED",
            Event::GetState => "GET_STATE",
            Event::GetStateByRange => "GET_STATE_BY_RANGE",
            Event::GetQueryResult => "GET_QUERY_RESULT",
            Event::GetHistoryForKey => "GET_HISTORY_FOR_KEY",
            Event::QueryStateNext => "QUERY_STATE_NEXT",
            Event::QueryStateClose => "QUERY_STATE_CLOSE",
            Event::Error => "ERROR",
            Event::Response => "RESPONSE",
            Event::Init => "INIT",
            Event::Transaction => "TRANSACTION",
        })
    }
}

/// Returns the state reached by raising `event` in `state`, or `None` if the event is not
/// legal there.
pub fn transition(state: State, event: Event) -> Option<State> {
    match (state, event) {
        (State::Created, Event::Registered) => Some(State::Established),
        (State::Established, Event::Ready) => Some(State::Ready),
        (State::Ready, Event::Registered) | (State::Ready, Event::Ready) => None,
        (State::Ready, _) => Some(State::Ready),
        _ => None,
    }
}

/// A hook run by the state machine on behalf of `T`.
pub type Hook<T, E> = fn(&T, &ContractMessage) -> Result<(), E>;

pub struct Fsm<T, E> {
    current: RwLock<State>,
    transition_lock: Mutex<()>,
    before: HashMap<Event, Hook<T, E>>,
    after: HashMap<Event, Hook<T, E>>,
    enter: HashMap<State, Hook<T, E>>,
}

impl<T, E: fmt::Display> Fsm<T, E> {
    pub fn current(&self) -> State {
        match self.current.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Returns true if `event` is legal in the current state.
    pub fn can(&self, event: Event) -> bool {
        transition(self.current(), event).is_some()
    }

    /// Raises `event` against the current state.
    ///
    /// # Errors
    ///
    /// * `FsmError::InvalidEvent` if the event is not legal in the current state; nothing is
    ///   run and the state is unchanged.
    /// * `FsmError::Cancelled` if the `before` hook rejected the event.
    /// * `FsmError::CallbackError` if an `enter` or `after` hook failed after the state changed.
    pub fn event(&self, target: &T, event: Event, msg: &ContractMessage) -> Result<(), FsmError> {
        let _guard = self
            .transition_lock
            .lock()
            .map_err(|_| FsmError::Poisoned)?;

        let src = self.current();
        let dst = transition(src, event).ok_or(FsmError::InvalidEvent { event, state: src })?;

        if let Some(hook) = self.before.get(&event) {
            hook(target, msg).map_err(|err| FsmError::Cancelled {
                event,
                reason: err.to_string(),
            })?;
        }

        self.set_current(dst);

        if src != dst {
            self.run_enter(target, dst, msg)?;
        }

        if let Some(hook) = self.after.get(&event) {
            hook(target, msg).map_err(|err| FsmError::CallbackError(err.to_string()))?;
        }

        Ok(())
    }

    /// Forces the machine into the terminal state, running its `enter` hook once.  Returns
    /// false if the machine had already ended.
    pub fn terminate(&self, target: &T, msg: &ContractMessage) -> Result<bool, FsmError> {
        let _guard = self
            .transition_lock
            .lock()
            .map_err(|_| FsmError::Poisoned)?;

        if self.current() == State::End {
            return Ok(false);
        }

        self.set_current(State::End);
        self.run_enter(target, State::End, msg)?;
        Ok(true)
    }

    fn set_current(&self, state: State) {
        match self.current.write() {
            Ok(mut current) => *current = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    fn run_enter(&self, target: &T, state: State, msg: &ContractMessage) -> Result<(), FsmError> {
        if let Some(hook) = self.enter.get(&state) {
            hook(target, msg).map_err(|err| FsmError::CallbackError(err.to_string()))?;
        }
        Ok(())
    }
}

/// Builds an `Fsm` starting in `created` with the given hooks.
pub struct FsmBuilder<T, E> {
    before: HashMap<Event, Hook<T, E>>,
    after: HashMap<Event, Hook<T, E>>,
    enter: HashMap<State, Hook<T, E>>,
}

impl<T, E> Default for FsmBuilder<T, E> {
    fn default() -> Self {
        FsmBuilder {
            before: HashMap::new(),
            after: HashMap::new(),
            enter: HashMap::new(),
        }
    }
}

impl<T, E> FsmBuilder<T, E> {
    pub fn new() -> Self {
        FsmBuilder::default()
    }

    pub fn with_before(mut self, event: Event, hook: Hook<T, E>) -> Self {
        self.before.insert(event, hook);
        self
    }

    pub fn with_after(mut self, event: Event, hook: Hook<T, E>) -> Self {
        self.after.insert(event, hook);
        self
    }

    pub fn with_enter(mut self, state: State, hook: Hook<T, E>) -> Self {
        self.enter.insert(state, hook);
        self
    }

    pub fn build(self) -> Fsm<T, E> {
        Fsm {
            current: RwLock::new(State::Created),
            transition_lock: Mutex::new(()),
            before: self.before,
            after: self.after,
            enter: self.enter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    const ALL_EVENTS: [Event; 16] = [
        Event::Registered,
        Event::Ready,
        Event::PutState,
        Event::DelState,
        Event::Invoke,
        Event::Completed,
        Event::GetState,
        Event::GetStateByRange,
        Event::GetQueryResult,
        Event::GetHistoryForKey,
        Event::QueryStateNext,
        Event::QueryStateClose,
        Event::Error,
        Event::Response,
        Event::Init,
        Event::Transaction,
    ];

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        cancel: bool,
    }

    impl Recorder {
        fn push(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn before(recorder: &Recorder, _: &ContractMessage) -> Result<(), String> {
        recorder.push("before");
        if recorder.cancel {
            Err("bad payload".into())
        } else {
            Ok(())
        }
    }

    fn after(recorder: &Recorder, _: &ContractMessage) -> Result<(), String> {
        recorder.push("after");
        Ok(())
    }

    fn enter(recorder: &Recorder, _: &ContractMessage) -> Result<(), String> {
        recorder.push("enter");
        Ok(())
    }

    fn fsm() -> Fsm<Recorder, String> {
        let mut builder = FsmBuilder::new()
            .with_enter(State::Established, enter)
            .with_enter(State::Ready, enter)
            .with_enter(State::End, enter);
        for event in ALL_EVENTS.iter() {
            builder = builder.with_before(*event, before).with_after(*event, after);
        }
        builder.build()
    }

    fn msg() -> ContractMessage {
        ContractMessage::new(MessageType::Undefined, "ch", "tx1", vec![])
    }

    fn into_ready(fsm: &Fsm<Recorder, String>, recorder: &Recorder) {
        fsm.event(recorder, Event::Registered, &msg()).unwrap();
        fsm.event(recorder, Event::Ready, &msg()).unwrap();
    }

    #[test]
    fn transition_table() {
        for event in ALL_EVENTS.iter() {
            let created = transition(State::Created, *event);
            let established = transition(State::Established, *event);
            let ready = transition(State::Ready, *event);
            match event {
                Event::Registered => {
                    assert_eq!(Some(State::Established), created);
                    assert_eq!(None, established);
                    assert_eq!(None, ready);
                }
                Event::Ready => {
                    assert_eq!(None, created);
                    assert_eq!(Some(State::Ready), established);
                    assert_eq!(None, ready);
                }
                _ => {
                    assert_eq!(None, created);
                    assert_eq!(None, established);
                    assert_eq!(Some(State::Ready), ready);
                }
            }
            assert_eq!(None, transition(State::End, *event));
        }
    }

    #[test]
    fn hooks_run_in_order() {
        let fsm = fsm();
        let recorder = Recorder::default();

        fsm.event(&recorder, Event::Registered, &msg()).unwrap();
        assert_eq!(State::Established, fsm.current());
        assert_eq!(vec!["before", "enter", "after"], recorder.calls());

        fsm.event(&recorder, Event::Ready, &msg()).unwrap();
        assert_eq!(State::Ready, fsm.current());

        // self transitions do not re-enter the state
        fsm.event(&recorder, Event::GetState, &msg()).unwrap();
        assert_eq!(State::Ready, fsm.current());
        assert_eq!(
            vec!["before", "enter", "after", "before", "enter", "after", "before", "after"],
            recorder.calls()
        );
    }

    #[test]
    fn illegal_event_is_rejected() {
        let fsm = fsm();
        let recorder = Recorder::default();

        for event in ALL_EVENTS.iter().filter(|e| **e != Event::Registered) {
            assert!(!fsm.can(*event));
            match fsm.event(&recorder, *event, &msg()) {
                Err(FsmError::InvalidEvent { state, .. }) => assert_eq!(State::Created, state),
                res => panic!("Expected InvalidEvent, got {:?}", res),
            }
        }
        assert_eq!(State::Created, fsm.current());
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn before_hook_cancels() {
        let fsm = fsm();
        let recorder = Recorder {
            cancel: true,
            ..Recorder::default()
        };

        match fsm.event(&recorder, Event::Registered, &msg()) {
            Err(FsmError::Cancelled { event, reason }) => {
                assert_eq!(Event::Registered, event);
                assert_eq!("bad payload", reason);
            }
            res => panic!("Expected Cancelled, got {:?}", res),
        }
        assert_eq!(State::Created, fsm.current());
        assert_eq!(vec!["before"], recorder.calls());
    }

    #[test]
    fn terminate_runs_enter_once() {
        let fsm = fsm();
        let recorder = Recorder::default();
        into_ready(&fsm, &recorder);

        assert!(fsm.terminate(&recorder, &msg()).unwrap());
        assert!(!fsm.terminate(&recorder, &msg()).unwrap());
        assert_eq!(State::End, fsm.current());
        assert_eq!(
            1,
            recorder.calls()[6..].iter().filter(|c| *c == "enter").count()
        );
        assert!(!fsm.can(Event::GetState));
    }

    #[test]
    fn message_types_map_to_events() {
        assert_eq!(
            Some(Event::Registered),
            Event::from_message_type(MessageType::Register)
        );
        assert_eq!(
            Some(Event::Invoke),
            Event::from_message_type(MessageType::InvokeContract)
        );
        assert_eq!(None, Event::from_message_type(MessageType::Keepalive));
    }
}
