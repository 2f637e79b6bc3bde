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

//! A fixed set of threads running the ledger requests of a session, so that slow requests
//! never block the dispatch loops.

use std::io;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

enum WorkerMessage {
    Run(Job),
    Shutdown,
}

pub struct WorkerPool {
    sender: Mutex<Sender<WorkerMessage>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(name: &str, size: usize) -> Result<Self, io::Error> {
        let (sender, receiver) = channel();
        let receiver = Arc::new(Mutex::new(receiver));

        for i in 0..size {
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || run_worker(&receiver))?;
        }

        Ok(WorkerPool {
            sender: Mutex::new(sender),
            size,
        })
    }

    /// Queues a job.  Returns false if the pool has shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.lock() {
            Ok(sender) => sender.send(WorkerMessage::Run(Box::new(job))).is_ok(),
            Err(_) => false,
        }
    }

    /// Stops every worker once the jobs already queued have run.
    pub fn shutdown(&self) {
        if let Ok(sender) = self.sender.lock() {
            for _ in 0..self.size {
                if sender.send(WorkerMessage::Shutdown).is_err() {
                    break;
                }
            }
        }
    }
}

fn run_worker(receiver: &Mutex<Receiver<WorkerMessage>>) {
    loop {
        let msg = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
        };
        match msg {
            Ok(WorkerMessage::Run(job)) => job(),
            Ok(WorkerMessage::Shutdown) | Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn runs_jobs() {
        let pool = WorkerPool::new("test-pool", 2).unwrap();
        let (tx, rx) = channel();

        for i in 0..10 {
            let tx = tx.clone();
            assert!(pool.submit(move || tx.send(i).unwrap()));
        }

        let mut results: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        results.sort();
        assert_eq!((0..10).collect::<Vec<_>>(), results);

        pool.shutdown();
    }
}
