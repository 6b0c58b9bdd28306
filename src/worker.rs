use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use atomicwrites::{AllowOverwrite, AtomicFile};
use log::{debug, info, warn};
use tarpc::{client, context, tokio_serde::formats::Json};
use tokio::time;

use crate::{
    ihash, output_path, partition_path, KeyValue, MapReduceClient, TaskKind, TaskReply,
};

/// Plugin contract. Both functions must be pure and deterministic:
/// timeout reassignment can execute the same task twice, and correctness
/// rests on both executions publishing equivalent artifacts.
pub type MapFn = fn(&Path, &str) -> Vec<KeyValue>;
pub type ReduceFn = fn(&str, &[String]) -> String;

const WAIT_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_ATTEMPTS: u32 = 15;
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// A stateless worker process. All its state is the plugin pair and the
/// working directory it shares with the other workers.
pub struct Worker {
    /// Directory for intermediate partitions and output shards.
    pub dir: PathBuf,
    /// Coordinator rendezvous socket.
    pub socket: PathBuf,
    pub map: MapFn,
    pub reduce: ReduceFn,
}

impl Worker {
    /// Poll for work until the coordinator says `Exit` or becomes
    /// unreachable; both mean the job is over. Local I/O failure is fatal
    /// to this worker, and the coordinator's timeout sweep will hand the
    /// stuck task to somebody else.
    pub async fn launch(&self) -> anyhow::Result<()> {
        let client = match self.connect().await {
            Some(client) => client,
            None => {
                info!("coordinator unreachable, assuming job is over");
                return Ok(());
            }
        };

        loop {
            let reply = match client.request_task(context::current()).await {
                Ok(reply) => reply,
                Err(_) => {
                    info!("lost the coordinator, exiting");
                    return Ok(());
                }
            };
            match reply.kind {
                TaskKind::Map => {
                    self.run_map(&reply)?;
                    if client
                        .report_task(context::current(), reply.task_id, TaskKind::Map)
                        .await
                        .is_err()
                    {
                        info!("lost the coordinator, exiting");
                        return Ok(());
                    }
                }
                TaskKind::Reduce => {
                    self.run_reduce(&reply)?;
                    if client
                        .report_task(context::current(), reply.task_id, TaskKind::Reduce)
                        .await
                        .is_err()
                    {
                        info!("lost the coordinator, exiting");
                        return Ok(());
                    }
                }
                TaskKind::Wait => time::sleep(WAIT_INTERVAL).await,
                TaskKind::Exit => {
                    info!("job finished, exiting");
                    return Ok(());
                }
            }
        }
    }

    /// Workers may come up before the coordinator does, so the initial
    /// connection is retried briefly. After that, channel failure is
    /// permanent.
    async fn connect(&self) -> Option<MapReduceClient> {
        for attempt in 0..CONNECT_ATTEMPTS {
            match tarpc::serde_transport::unix::connect(&self.socket, Json::default).await {
                Ok(transport) => {
                    return Some(MapReduceClient::new(client::Config::default(), transport).spawn())
                }
                Err(err) => {
                    debug!("connect attempt {attempt} failed: {err}");
                    time::sleep(CONNECT_BACKOFF).await;
                }
            }
        }
        None
    }

    /// Run the plugin map over one input file and publish one partition
    /// per reduce task. Each partition is written to a private temp file
    /// and renamed into place, so a reduce task never sees a partial
    /// partition and a crash here leaves no visible artifact.
    fn run_map(&self, reply: &TaskReply) -> anyhow::Result<()> {
        let input = reply
            .input_file
            .as_ref()
            .context("map assignment carried no input file")?;
        anyhow::ensure!(reply.n_reduce > 0, "map assignment with zero reduce partitions");

        let contents = fs::read_to_string(input)
            .with_context(|| format!("reading map input {}", input.display()))?;
        let records = (self.map)(input, &contents);
        debug!(
            "map task {}: {} records from {}",
            reply.task_id,
            records.len(),
            input.display()
        );

        let mut buckets: Vec<Vec<KeyValue>> = vec![Vec::new(); reply.n_reduce];
        for kv in records {
            let r = ihash(&kv.key) as usize % reply.n_reduce;
            buckets[r].push(kv);
        }

        for (r, bucket) in buckets.iter().enumerate() {
            let mut body = String::new();
            for kv in bucket {
                body.push_str(&serde_json::to_string(kv)?);
                body.push('\n');
            }
            let path = partition_path(&self.dir, reply.task_id, r);
            AtomicFile::new(&path, AllowOverwrite)
                .write(|f| f.write_all(body.as_bytes()))
                .with_context(|| format!("publishing partition {}", path.display()))?;
        }
        Ok(())
    }

    /// Merge every map task's partition for this reduce id, group by key,
    /// run the plugin reduce per distinct key, and publish the shard
    /// atomically. Re-execution overwrites the shard with equivalent
    /// content.
    fn run_reduce(&self, reply: &TaskReply) -> anyhow::Result<()> {
        let mut intermediate: Vec<KeyValue> = Vec::new();
        for m in 0..reply.n_map {
            let path = partition_path(&self.dir, m, reply.task_id);
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    // That map task may have failed and be in flight again.
                    warn!("partition {} missing, skipping", path.display());
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("reading {}", path.display()))
                }
            };
            for line in contents.lines() {
                intermediate.push(
                    serde_json::from_str(line)
                        .with_context(|| format!("malformed record in {}", path.display()))?,
                );
            }
        }

        // Stable sort: within a key, values keep map-task order.
        intermediate.sort_by(|a, b| a.key.cmp(&b.key));

        let mut body = String::new();
        let mut i = 0;
        while i < intermediate.len() {
            let mut j = i + 1;
            while j < intermediate.len() && intermediate[j].key == intermediate[i].key {
                j += 1;
            }
            let values: Vec<String> = intermediate[i..j]
                .iter()
                .map(|kv| kv.value.clone())
                .collect();
            let output = (self.reduce)(&intermediate[i].key, &values);
            body.push_str(&format!("{} {}\n", intermediate[i].key, output));
            i = j;
        }

        let path = output_path(&self.dir, reply.task_id);
        AtomicFile::new(&path, AllowOverwrite)
            .write(|f| f.write_all(body.as_bytes()))
            .with_context(|| format!("publishing shard {}", path.display()))?;
        debug!("reduce task {}: shard {} published", reply.task_id, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::wc;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn worker(dir: &Path, map: MapFn, reduce: ReduceFn) -> Worker {
        Worker {
            dir: dir.to_owned(),
            socket: PathBuf::from("unused.sock"),
            map,
            reduce,
        }
    }

    fn map_assignment(id: usize, input: &Path, n_reduce: usize) -> TaskReply {
        TaskReply {
            kind: TaskKind::Map,
            task_id: id,
            input_file: Some(input.to_owned()),
            n_reduce,
            n_map: 0,
        }
    }

    fn reduce_assignment(id: usize, n_map: usize) -> TaskReply {
        TaskReply {
            kind: TaskKind::Reduce,
            task_id: id,
            input_file: None,
            n_reduce: 0,
            n_map,
        }
    }

    fn read_partition(dir: &Path, m: usize, r: usize) -> Vec<KeyValue> {
        fs::read_to_string(partition_path(dir, m, r))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn map_routes_a_key_to_exactly_one_partition() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.txt");
        fs::write(&input, "cat dog cat bird cat").unwrap();

        let w = worker(tmp.path(), wc::map, wc::reduce);
        w.run_map(&map_assignment(0, &input, 4)).unwrap();

        let mut partitions_with_cat = Vec::new();
        for r in 0..4 {
            let records = read_partition(tmp.path(), 0, r);
            if records.iter().any(|kv| kv.key == "cat") {
                assert_eq!(records.iter().filter(|kv| kv.key == "cat").count(), 3);
                partitions_with_cat.push(r);
            }
        }
        assert_eq!(partitions_with_cat.len(), 1);
        assert_eq!(partitions_with_cat[0], ihash("cat") as usize % 4);
    }

    #[test]
    fn map_then_reduce_round_trip() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "the quick brown fox the").unwrap();
        fs::write(&b, "the lazy dog").unwrap();

        let w = worker(tmp.path(), wc::map, wc::reduce);
        w.run_map(&map_assignment(0, &a, 2)).unwrap();
        w.run_map(&map_assignment(1, &b, 2)).unwrap();
        w.run_reduce(&reduce_assignment(0, 2)).unwrap();
        w.run_reduce(&reduce_assignment(1, 2)).unwrap();

        let mut counts = HashMap::new();
        for r in 0..2 {
            let shard = fs::read_to_string(output_path(tmp.path(), r)).unwrap();
            for line in shard.lines() {
                let (k, v) = line.split_once(' ').unwrap();
                assert!(counts.insert(k.to_owned(), v.to_owned()).is_none());
            }
        }
        let expect = [
            ("the", "3"),
            ("quick", "1"),
            ("brown", "1"),
            ("fox", "1"),
            ("lazy", "1"),
            ("dog", "1"),
        ];
        assert_eq!(counts.len(), expect.len());
        for (k, v) in expect {
            assert_eq!(counts[k], v, "count for {k}");
        }
    }

    #[test]
    fn reduce_sees_values_in_map_task_order() {
        fn tag_map(file: &Path, _contents: &str) -> Vec<KeyValue> {
            vec![KeyValue {
                key: "k".to_owned(),
                value: file.file_name().unwrap().to_str().unwrap().to_owned(),
            }]
        }
        fn join_reduce(_key: &str, values: &[String]) -> String {
            values.join(",")
        }

        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "x").unwrap();

        let w = worker(tmp.path(), tag_map, join_reduce);
        w.run_map(&map_assignment(0, &a, 1)).unwrap();
        w.run_map(&map_assignment(1, &b, 1)).unwrap();
        w.run_reduce(&reduce_assignment(0, 2)).unwrap();

        let shard = fs::read_to_string(output_path(tmp.path(), 0)).unwrap();
        assert_eq!(shard, "k a.txt,b.txt\n");
    }

    #[test]
    fn reduce_tolerates_missing_partitions() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.txt");
        fs::write(&input, "solo solo").unwrap();

        let w = worker(tmp.path(), wc::map, wc::reduce);
        // Claim n_map = 3 but only map task 1 ever published.
        w.run_map(&map_assignment(1, &input, 1)).unwrap();
        w.run_reduce(&reduce_assignment(0, 3)).unwrap();

        let shard = fs::read_to_string(output_path(tmp.path(), 0)).unwrap();
        assert_eq!(shard, "solo 2\n");
    }

    #[test]
    fn reexecuted_map_publishes_identical_partitions() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.txt");
        fs::write(&input, "a b a c").unwrap();

        let w = worker(tmp.path(), wc::map, wc::reduce);
        let assignment = map_assignment(0, &input, 3);
        w.run_map(&assignment).unwrap();
        let first: Vec<_> = (0..3).map(|r| read_partition(tmp.path(), 0, r)).collect();

        // Timeout reassignment re-runs the same task; last rename wins with
        // byte-identical content.
        w.run_map(&assignment).unwrap();
        let second: Vec<_> = (0..3).map(|r| read_partition(tmp.path(), 0, r)).collect();
        assert_eq!(first, second);
    }
}
