//! Scripted mock peer for controller and transport tests.
//!
//! Stands behind the same request channel the production serial task
//! serves: every write is recorded and becomes the key for subsequent
//! reads, which pop from that command's scripted response queue. An
//! exhausted queue answers with the empty line, matching a real read
//! timeout.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::transport::serial_link::{LinkRequest, SerialLink};

pub(crate) type WriteLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn spawn_mock_link(script: &[(&str, &[&str])]) -> (SerialLink, WriteLog) {
    let mut responses: HashMap<String, VecDeque<String>> = HashMap::new();
    for (command, replies) in script {
        responses
            .entry((*command).to_string())
            .or_default()
            .extend(replies.iter().map(|reply| (*reply).to_string()));
    }

    let (sender, mut receiver) = mpsc::channel(32);
    let writes: WriteLog = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&writes);

    tokio::spawn(async move {
        let mut last_command = String::new();
        while let Some(request) = receiver.recv().await {
            match request {
                LinkRequest::Write { line, respond_to } => {
                    observed.lock().expect("write log not poisoned").push(line.clone());
                    last_command = line;
                    let _ = respond_to.send(Ok(()));
                }
                LinkRequest::Read { respond_to } => {
                    let line = responses
                        .get_mut(&last_command)
                        .and_then(VecDeque::pop_front)
                        .unwrap_or_default();
                    let _ = respond_to.send(Ok(line));
                }
                LinkRequest::Shutdown => break,
            }
        }
    });

    (SerialLink::new(sender), writes)
}

/// COIN TYPE response: scaling 10, two decimals, credits 1,2,5,10,20,50
/// giving denominations 10..=500.
pub(crate) fn coin_config_line() -> String {
    "p,0000000A020102050A143200000000000000000000".to_string()
}

pub(crate) fn write_count(log: &WriteLog, command: &str) -> usize {
    log.lock()
        .expect("write log not poisoned")
        .iter()
        .filter(|written| *written == command)
        .count()
}
