use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::{future, prelude::*};
use log::info;
use tarpc::{
    context,
    server::{self, Channel},
    tokio_serde::formats::Json,
};
use tokio::time;

use crate::{Ledger, MapReduce, TaskKind, TaskReply};

const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;
const MAX_CHANNELS: usize = 16;
const DONE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// RPC-facing handle. Every handler takes the single ledger lock for its
/// whole critical section and releases it before replying; the lock is
/// never held across I/O.
#[derive(Clone)]
struct CoordinatorServer {
    ledger: Arc<Mutex<Ledger>>,
}

impl MapReduce for CoordinatorServer {
    async fn request_task(self, _: context::Context) -> TaskReply {
        self.ledger.lock().unwrap().request_task(Instant::now())
    }

    async fn report_task(self, _: context::Context, task_id: usize, kind: TaskKind) {
        self.ledger.lock().unwrap().report_completion(kind, task_id);
    }
}

/// Failure detection: tasks claimed by workers that never report back are
/// reclaimed here. This is the only liveness channel to workers.
async fn sweep_loop(ledger: Arc<Mutex<Ledger>>, interval: Duration, deadline: Duration) {
    let mut tick = time::interval(interval);
    loop {
        tick.tick().await;
        let mut l = ledger.lock().unwrap();
        if l.is_done() {
            return;
        }
        l.sweep_timeouts(Instant::now(), deadline);
    }
}

pub struct Coordinator {
    /// UNIX socket the workers rendezvous on.
    pub socket: PathBuf,
    /// Input files; one map task each.
    pub files: Vec<PathBuf>,
    pub n_reduce: usize,
    /// How long a claimed task may stay unreported before reassignment.
    pub task_deadline: Duration,
    /// How often the timeout monitor wakes.
    pub sweep_interval: Duration,
}

impl Coordinator {
    /// Serve the job to completion. Resolves once every task has been
    /// reported complete and the terminal flag is set.
    pub async fn launch(&self) -> anyhow::Result<()> {
        let ledger = Arc::new(Mutex::new(Ledger::new(self.files.clone(), self.n_reduce)));
        tokio::spawn(sweep_loop(
            ledger.clone(),
            self.sweep_interval,
            self.task_deadline,
        ));

        // A previous run may have left its socket behind.
        let _ = fs::remove_file(&self.socket);
        let mut listener =
            tarpc::serde_transport::unix::listen(&self.socket, Json::default).await?;
        listener.config_mut().max_frame_length(MAX_FRAME_LENGTH);
        info!("coordinator listening on {}", self.socket.display());

        let server = CoordinatorServer {
            ledger: ledger.clone(),
        };
        let serve = listener
            .filter_map(|r| future::ready(r.ok()))
            .map(server::BaseChannel::with_defaults)
            .map(move |channel| channel.execute(server.clone().serve()).for_each(spawn_call))
            .buffer_unordered(MAX_CHANNELS)
            .for_each(|_| async {});

        let done = async {
            loop {
                time::sleep(DONE_POLL_INTERVAL).await;
                if ledger.lock().unwrap().is_done() {
                    // Let in-flight Exit replies drain before the socket
                    // goes away; stragglers treat the lost channel as
                    // "job over" anyway.
                    time::sleep(DONE_POLL_INTERVAL).await;
                    break;
                }
            }
        };

        tokio::select! {
            _ = serve => {}
            _ = done => info!("job complete, shutting down"),
        }
        let _ = fs::remove_file(&self.socket);
        Ok(())
    }
}

async fn spawn_call(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}
