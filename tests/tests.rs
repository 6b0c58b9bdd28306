use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::runtime::Runtime;

use mapred::{app::wc, output_path, Coordinator, Worker};

const N_REDUCE: usize = 4;
const N_WORKERS: usize = 4;

fn write_inputs(dir: &std::path::Path) -> Vec<PathBuf> {
    let texts = [
        "the quick brown fox jumps over the lazy dog",
        "pack my box with five dozen liquor jugs and the fox",
        "how vexingly quick daft zebras jump over the dog",
        "sphinx of black quartz judge my vow the sphinx",
    ];
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = dir.join(format!("in-{i}.txt"));
            fs::write(&path, text).unwrap();
            path
        })
        .collect()
}

/// Run a full job over the real socket with several workers and check the
/// collected shards against an in-process sequential run.
#[test]
fn distributed_word_count_matches_sequential() {
    let _ = pretty_env_logger::try_init();

    let tmp = TempDir::new().expect("unable to create temporary working directory");
    let dir = tmp.path().to_owned();
    let files = write_inputs(&dir);
    let socket = dir.join("mr.sock");

    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let coordinator = {
            let socket = socket.clone();
            let files = files.clone();
            tokio::spawn(async move {
                Coordinator {
                    socket,
                    files,
                    n_reduce: N_REDUCE,
                    task_deadline: Duration::from_secs(10),
                    sweep_interval: Duration::from_secs(2),
                }
                .launch()
                .await
                .unwrap();
            })
        };

        let mut workers = Vec::new();
        for _ in 0..N_WORKERS {
            let dir = dir.clone();
            let socket = socket.clone();
            workers.push(tokio::spawn(async move {
                Worker {
                    dir,
                    socket,
                    map: wc::map,
                    reduce: wc::reduce,
                }
                .launch()
                .await
                .unwrap();
            }));
        }

        coordinator.await.unwrap();
        for worker in workers {
            worker.await.unwrap();
        }
    });

    // Every shard must exist, and no key may appear in more than one.
    let mut result = HashMap::<String, String>::new();
    for r in 0..N_REDUCE {
        let shard = fs::read_to_string(output_path(&dir, r)).unwrap();
        for line in shard.lines() {
            let (k, v) = line.split_once(' ').unwrap();
            assert!(
                result.insert(k.to_owned(), v.to_owned()).is_none(),
                "key {k} appeared in more than one shard"
            );
        }
    }

    let seq_result = {
        let mut grouped = HashMap::<String, Vec<String>>::new();
        for file in &files {
            let contents = fs::read_to_string(file).unwrap();
            for kv in wc::map(file, &contents) {
                grouped.entry(kv.key).or_default().push(kv.value);
            }
        }
        grouped
            .into_iter()
            .map(|(k, vs)| {
                let v = wc::reduce(&k, &vs);
                (k, v)
            })
            .collect::<HashMap<_, _>>()
    };

    assert_eq!(result, seq_result);
}
