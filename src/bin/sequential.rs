//! Single-process MapReduce, sharded the same way as the distributed
//! engine. Useful as a correctness oracle.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use atomicwrites::{AllowOverwrite, AtomicFile};
use structopt::StructOpt;

use mapred::{app, ihash, output_path};

#[derive(StructOpt, Debug)]
#[structopt(name = "sequential", about = env!("CARGO_PKG_DESCRIPTION"))]
struct Opt {
    /// Directory to write output shards into
    #[structopt(short, long, default_value = ".")]
    dir: PathBuf,

    /// Map/Reduce application to run (wc, tfidf)
    #[structopt(short, long, default_value = "wc")]
    app: String,

    #[structopt(long, default_value = "10")]
    nreduce: usize,

    /// Files to process
    #[structopt(name = "FILE", parse(from_os_str), required = true)]
    files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let (map, reduce) =
        app::lookup(&opt.app).with_context(|| format!("unknown application {:?}", opt.app))?;

    // Values accumulate in file order, matching what a reduce task sees.
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for file in &opt.files {
        let contents =
            fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        for kv in map(file, &contents) {
            grouped.entry(kv.key).or_default().push(kv.value);
        }
    }

    let mut shards: Vec<Vec<(String, String)>> = vec![Vec::new(); opt.nreduce];
    for (key, values) in grouped {
        let out = reduce(&key, &values);
        let r = ihash(&key) as usize % opt.nreduce;
        shards[r].push((key, out));
    }

    for (r, mut shard) in shards.into_iter().enumerate() {
        shard.sort();
        let mut body = String::new();
        for (key, out) in &shard {
            body.push_str(&format!("{key} {out}\n"));
        }
        let path = output_path(&opt.dir, r);
        AtomicFile::new(&path, AllowOverwrite)
            .write(|f| f.write_all(body.as_bytes()))
            .with_context(|| format!("publishing shard {}", path.display()))?;
    }
    Ok(())
}
