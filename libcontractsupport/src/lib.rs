/*
 * Copyright 2018 Bitwise IO, Inc.
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

//! Node-side support for smart contracts.
//!
//! A contract runs as a separate process connected to the node.  For each connected contract
//! the node runs a session `handler::Handler`, which drives the contract through the
//! registration handshake, sends it transactions, and serves the ledger requests the contract
//! makes while executing them.

#[macro_use]
extern crate log;

pub mod context;
pub mod fsm;
pub mod handler;
pub mod ledger;
pub mod protocol;
#[allow(renamed_and_removed_lints)]
pub mod protos;
pub mod query;
pub mod support;
pub mod transport;

/// Returns the first eight characters of a transaction id, for log lines.
pub fn short_tx_id(tx_id: &str) -> &str {
    match tx_id.char_indices().nth(8) {
        Some((end, _)) => &tx_id[..end],
        None => tx_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_tx_id_truncates() {
        assert_eq!("01234567", short_tx_id("0123456789abcdef"));
        assert_eq!("01234567", short_tx_id("01234567"));
        assert_eq!("0123", short_tx_id("0123"));
        assert_eq!("", short_tx_id(""));
        assert_eq!("ééééééé1", short_tx_id("ééééééé12"));
    }
}
