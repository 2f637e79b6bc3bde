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
use std::time::Duration;

use crate::query::DEFAULT_MAX_RESULT_BATCH_SIZE;

const DEFAULT_REQUEST_WORKERS: usize = 4;

/// Runtime settings of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    max_result_batch_size: usize,
    request_workers: usize,
    execute_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_result_batch_size: DEFAULT_MAX_RESULT_BATCH_SIZE,
            request_workers: DEFAULT_REQUEST_WORKERS,
            execute_timeout: None,
        }
    }
}

impl SessionConfig {
    /// The maximum number of query results returned to a contract at once.
    pub fn max_result_batch_size(&self) -> usize {
        self.max_result_batch_size
    }

    /// The number of threads running ledger requests for the session.
    pub fn request_workers(&self) -> usize {
        self.request_workers
    }

    /// How long `send_execute_message` waits for the contract to finish; `None` waits forever.
    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout
    }
}

#[derive(Debug, PartialEq)]
pub enum SessionConfigBuildError {
    InvalidValue(String),
}

impl Error for SessionConfigBuildError {}

impl fmt::Display for SessionConfigBuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionConfigBuildError::InvalidValue(ref s) => write!(f, "InvalidValue: {}", s),
        }
    }
}

#[derive(Default, Clone)]
pub struct SessionConfigBuilder {
    max_result_batch_size: Option<usize>,
    request_workers: Option<usize>,
    execute_timeout: Option<Duration>,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        SessionConfigBuilder::default()
    }

    pub fn with_max_result_batch_size(mut self, size: usize) -> SessionConfigBuilder {
        self.max_result_batch_size = Some(size);
        self
    }

    pub fn with_request_workers(mut self, workers: usize) -> SessionConfigBuilder {
        self.request_workers = Some(workers);
        self
    }

    pub fn with_execute_timeout(mut self, timeout: Duration) -> SessionConfigBuilder {
        self.execute_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<SessionConfig, SessionConfigBuildError> {
        let max_result_batch_size = self
            .max_result_batch_size
            .unwrap_or(DEFAULT_MAX_RESULT_BATCH_SIZE);
        if max_result_batch_size == 0 {
            return Err(SessionConfigBuildError::InvalidValue(
                "max_result_batch_size must be greater than 0".into(),
            ));
        }

        let request_workers = self.request_workers.unwrap_or(DEFAULT_REQUEST_WORKERS);
        if request_workers == 0 {
            return Err(SessionConfigBuildError::InvalidValue(
                "request_workers must be greater than 0".into(),
            ));
        }

        Ok(SessionConfig {
            max_result_batch_size,
            request_workers,
            execute_timeout: self.execute_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfigBuilder::new().build().unwrap();
        assert_eq!(SessionConfig::default(), config);
        assert_eq!(100, config.max_result_batch_size());
        assert_eq!(None, config.execute_timeout());
    }

    #[test]
    fn rejects_zero() {
        assert!(SessionConfigBuilder::new()
            .with_max_result_batch_size(0)
            .build()
            .is_err());
        assert!(SessionConfigBuilder::new()
            .with_request_workers(0)
            .build()
            .is_err());

        let config = SessionConfigBuilder::new()
            .with_request_workers(1)
            .with_execute_timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(1, config.request_workers());
        assert_eq!(Some(Duration::from_secs(3)), config.execute_timeout());
    }
}
