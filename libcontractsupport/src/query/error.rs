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

use crate::ledger::LedgerError;
use crate::protos::ProtoConversionError;

#[derive(Debug)]
pub enum QueryError {
    /// No open cursor has the given id.
    CursorNotFound(String),
    /// The cursor table of the transaction context could not be locked.
    ContextUnavailable,
    LedgerError(LedgerError),
    SerializationError(ProtoConversionError),
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            QueryError::CursorNotFound(_) => None,
            QueryError::ContextUnavailable => None,
            QueryError::LedgerError(err) => Some(err),
            QueryError::SerializationError(err) => Some(err),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryError::CursorNotFound(id) => write!(f, "query iterator not found: {}", id),
            QueryError::ContextUnavailable => f.write_str("transaction context unavailable"),
            QueryError::LedgerError(err) => write!(f, "{}", err),
            QueryError::SerializationError(err) => {
                write!(f, "unable to serialize query result: {}", err)
            }
        }
    }
}

impl From<LedgerError> for QueryError {
    fn from(err: LedgerError) -> Self {
        QueryError::LedgerError(err)
    }
}

impl From<ProtoConversionError> for QueryError {
    fn from(err: ProtoConversionError) -> Self {
        QueryError::SerializationError(err)
    }
}
