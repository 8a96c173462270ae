//! Run-record table.
//!
//! One task owns the table. Writers send changes over a channel and wait for
//! the acknowledgement; readers get `Arc`ed snapshots from a `watch` channel
//! and never block writers.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::policy::RestartPolicy;
use super::state::{RecordChange, RunRecord};
use crate::types::{Error, Result};

/// Immutable view of every component's run record, keyed by name.
pub type StatusSnapshot = Arc<BTreeMap<String, RunRecord>>;

#[derive(Debug)]
enum Command {
    Register {
        name: String,
        policy: RestartPolicy,
        ack: oneshot::Sender<Result<()>>,
    },
    Update {
        name: String,
        change: RecordChange,
        ack: oneshot::Sender<Result<()>>,
    },
}

/// Write side of the record table.
#[derive(Debug, Clone)]
pub(crate) struct RecordKeeper {
    tx: mpsc::Sender<Command>,
}

impl RecordKeeper {
    /// Spawn the owning task. Must be called inside a Tokio runtime.
    pub(crate) fn spawn() -> (Self, StatusHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let (snapshots, watcher) = watch::channel(StatusSnapshot::default());
        let task = tokio::spawn(run_table(rx, snapshots));
        (Self { tx }, StatusHandle { rx: watcher }, task)
    }

    pub(crate) async fn register(&self, name: &str, policy: RestartPolicy) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(
            Command::Register {
                name: name.to_string(),
                policy,
                ack,
            },
            done,
        )
        .await
    }

    pub(crate) async fn update(&self, name: &str, change: RecordChange) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(
            Command::Update {
                name: name.to_string(),
                change,
                ack,
            },
            done,
        )
        .await
    }

    async fn send(&self, command: Command, done: oneshot::Receiver<Result<()>>) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::internal("record table is closed"))?;
        done.await
            .map_err(|_| Error::internal("record table dropped the update"))?
    }
}

async fn run_table(mut rx: mpsc::Receiver<Command>, snapshots: watch::Sender<StatusSnapshot>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Register { name, policy, ack } => {
                let mut result = Ok(());
                snapshots.send_if_modified(|table| {
                    if table.contains_key(&name) {
                        result = Err(Error::duplicate_component(name.clone()));
                        return false;
                    }
                    Arc::make_mut(table).insert(name.clone(), RunRecord::new(name.clone(), policy));
                    true
                });
                let _ = ack.send(result);
            }
            Command::Update { name, change, ack } => {
                let mut result = Ok(());
                snapshots.send_if_modified(|table| {
                    let Some(current) = table.get(&name) else {
                        result = Err(Error::not_found(format!("component {name}")));
                        return false;
                    };
                    let mut record = current.clone();
                    if let Err(err) = record.apply(&change) {
                        result = Err(err);
                        return false;
                    }
                    Arc::make_mut(table).insert(name.clone(), record);
                    true
                });
                if let Err(err) = &result {
                    tracing::warn!(component = %name, error = %err, "rejected run record update");
                }
                let _ = ack.send(result);
            }
        }
    }
    tracing::debug!("record table closed");
}

/// Cloneable, non-blocking read handle on the run-record table.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<StatusSnapshot>,
}

impl StatusHandle {
    /// Consistent snapshot of every run record.
    pub fn status(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    pub fn get(&self, name: &str) -> Option<RunRecord> {
        self.rx.borrow().get(name).cloned()
    }

    /// Wait until `predicate` holds for the table, returning that snapshot.
    ///
    /// Returns the last snapshot if the table shuts down first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> StatusSnapshot
    where
        F: FnMut(&BTreeMap<String, RunRecord>) -> bool,
    {
        let mut rx = self.rx.clone();
        let snapshot = match rx.wait_for(|table| predicate(table)).await {
            Ok(table) => table.clone(),
            Err(_) => self.status(),
        };
        snapshot
    }
}
