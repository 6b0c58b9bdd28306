use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod app;
mod coordinator;
mod ledger;
mod worker;
pub use coordinator::Coordinator;
pub use ledger::Ledger;
pub use worker::{MapFn, ReduceFn, Worker};

#[tarpc::service]
pub trait MapReduce {
    /// Ask the coordinator for the next unit of work.
    async fn request_task() -> TaskReply;
    /// Report a finished task. The call itself is the acknowledgment.
    async fn report_task(task_id: usize, kind: TaskKind);
}

/// Closed set of task types on the wire. `Wait` and `Exit` are control
/// replies, never ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Map,
    Reduce,
    Wait,
    Exit,
}

/// Reply to `request_task`. Fields that do not apply to `kind` are left at
/// their default and must be ignored by the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReply {
    pub kind: TaskKind,
    pub task_id: usize,
    /// Set for Map assignments only.
    pub input_file: Option<PathBuf>,
    /// Number of reduce partitions; Map assignments need it to bucket output.
    pub n_reduce: usize,
    /// Number of map tasks; Reduce assignments need it to locate partitions.
    pub n_map: usize,
}

impl TaskReply {
    pub fn wait() -> Self {
        TaskReply {
            kind: TaskKind::Wait,
            task_id: 0,
            input_file: None,
            n_reduce: 0,
            n_map: 0,
        }
    }

    pub fn exit() -> Self {
        TaskReply {
            kind: TaskKind::Exit,
            ..TaskReply::wait()
        }
    }
}

/// One record emitted by a Map function and consumed by a Reduce function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// FNV-1a, sign bit masked. The hash must be identical in every worker
/// process so that all occurrences of a key, whichever map task emits
/// them, land in the same reduce partition.
pub fn ihash(key: &str) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for b in key.bytes() {
        h ^= u32::from(b);
        h = h.wrapping_mul(16_777_619);
    }
    h & 0x7fff_ffff
}

/// Intermediate partition produced by `map_id`, consumed by `reduce_id`.
pub fn partition_path(dir: &Path, map_id: usize, reduce_id: usize) -> PathBuf {
    dir.join(format!("mr-{map_id}-{reduce_id}"))
}

/// Final output shard for `reduce_id`.
pub fn output_path(dir: &Path, reduce_id: usize) -> PathBuf {
    dir.join(format!("mr-out-{reduce_id}"))
}

/// Default socket path for the coordinator, derived from the invoking
/// user's identity so concurrent jobs on a shared host do not collide.
pub fn rendezvous_path() -> PathBuf {
    let user = env::var("USER").unwrap_or_else(|_| "anon".to_owned());
    PathBuf::from(format!("/var/tmp/mapred-{user}.sock"))
}
