use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::{TaskKind, TaskReply};

#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskState {
    Idle,
    InProgress { since: Instant },
    Completed,
}

/// One unit of work. Its id is its index in the phase's task vector and
/// stays stable for the lifetime of the job.
#[derive(Debug)]
struct TaskEntry {
    state: TaskState,
    /// Map tasks only.
    input_file: Option<PathBuf>,
}

/// The coordinator's record of every task in the job. Pure state machine:
/// no I/O, no clock of its own. Callers hold the owning lock and pass in
/// `Instant::now()`, which keeps the scheduling logic testable.
#[derive(Debug)]
pub struct Ledger {
    map_tasks: Vec<TaskEntry>,
    reduce_tasks: Vec<TaskEntry>,
    n_map: usize,
    n_reduce: usize,
    map_completed: usize,
    reduce_completed: usize,
    done: bool,
}

impl Ledger {
    /// One Map task per input file, `n_reduce` Reduce tasks. The task
    /// count is fixed here for the rest of the job.
    pub fn new(files: Vec<PathBuf>, n_reduce: usize) -> Self {
        let map_tasks: Vec<TaskEntry> = files
            .into_iter()
            .map(|f| TaskEntry {
                state: TaskState::Idle,
                input_file: Some(f),
            })
            .collect();
        let reduce_tasks = (0..n_reduce)
            .map(|_| TaskEntry {
                state: TaskState::Idle,
                input_file: None,
            })
            .collect();
        let n_map = map_tasks.len();
        info!("job initialized: {n_map} map tasks, {n_reduce} reduce tasks");
        Ledger {
            map_tasks,
            reduce_tasks,
            n_map,
            n_reduce,
            map_completed: 0,
            reduce_completed: 0,
            done: false,
        }
    }

    /// Hand out the lowest-id idle task of the current phase, stamping it
    /// in-progress as of `now`. `Wait` means some task of the phase is
    /// still in flight; `Exit` means the job is over and flips the
    /// terminal flag.
    pub fn request_task(&mut self, now: Instant) -> TaskReply {
        if self.map_completed < self.n_map {
            for (id, task) in self.map_tasks.iter_mut().enumerate() {
                if task.state == TaskState::Idle {
                    task.state = TaskState::InProgress { since: now };
                    debug!("assigning map task {id}");
                    return TaskReply {
                        kind: TaskKind::Map,
                        task_id: id,
                        input_file: task.input_file.clone(),
                        n_reduce: self.n_reduce,
                        n_map: 0,
                    };
                }
            }
            return TaskReply::wait();
        }

        if self.reduce_completed < self.n_reduce {
            for (id, task) in self.reduce_tasks.iter_mut().enumerate() {
                if task.state == TaskState::Idle {
                    task.state = TaskState::InProgress { since: now };
                    debug!("assigning reduce task {id}");
                    return TaskReply {
                        kind: TaskKind::Reduce,
                        task_id: id,
                        input_file: None,
                        n_reduce: 0,
                        n_map: self.n_map,
                    };
                }
            }
            return TaskReply::wait();
        }

        if !self.done {
            info!("all tasks completed, job done");
            self.done = true;
        }
        TaskReply::exit()
    }

    /// Record a completion. Only an in-progress task can complete; a late
    /// report from a straggler whose task timed out (and was possibly
    /// reassigned) is a no-op, which is what keeps the completion
    /// counters from double-counting.
    pub fn report_completion(&mut self, kind: TaskKind, id: usize) {
        let (tasks, completed) = match kind {
            TaskKind::Map => (&mut self.map_tasks, &mut self.map_completed),
            TaskKind::Reduce => (&mut self.reduce_tasks, &mut self.reduce_completed),
            TaskKind::Wait | TaskKind::Exit => {
                warn!("ignoring report for non-schedulable task kind {kind:?}");
                return;
            }
        };
        match tasks.get_mut(id) {
            Some(task) if matches!(task.state, TaskState::InProgress { .. }) => {
                task.state = TaskState::Completed;
                *completed += 1;
                debug!("{kind:?} task {id} completed ({completed} done)");
            }
            Some(_) => debug!("ignoring stale report for {kind:?} task {id}"),
            None => warn!("ignoring report for unknown {kind:?} task {id}"),
        }
    }

    /// Revert every task in-progress longer than `deadline` back to idle
    /// so it can be reassigned. Returns how many were reclaimed.
    pub fn sweep_timeouts(&mut self, now: Instant, deadline: Duration) -> usize {
        let mut reclaimed = 0;
        for (kind, tasks) in [
            (TaskKind::Map, &mut self.map_tasks),
            (TaskKind::Reduce, &mut self.reduce_tasks),
        ] {
            for (id, task) in tasks.iter_mut().enumerate() {
                if let TaskState::InProgress { since } = task.state {
                    if now.duration_since(since) > deadline {
                        info!("{kind:?} task {id} timed out, reclaiming for reassignment");
                        task.state = TaskState::Idle;
                        reclaimed += 1;
                    }
                }
            }
        }
        reclaimed
    }

    /// Terminal flag; set by the first `request_task` after the last
    /// reduce completion and never reverted.
    pub fn is_done(&self) -> bool {
        self.done
    }
}
