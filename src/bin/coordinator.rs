use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use mapred::Coordinator;

#[derive(StructOpt, Debug)]
#[structopt(name = "coordinator", about = env!("CARGO_PKG_DESCRIPTION"))]
struct Opt {
    /// Rendezvous socket; defaults to a per-user path under /var/tmp
    #[structopt(short, long)]
    socket: Option<PathBuf>,

    /// Seconds a claimed task may go unreported before reassignment
    #[structopt(long, default_value = "10")]
    task_deadline: u64,

    /// Seconds between timeout sweeps
    #[structopt(long, default_value = "2")]
    sweep_interval: u64,

    /// Number of reduce partitions
    #[structopt(long, default_value = "10")]
    nreduce: usize,

    /// Input files; one map task each
    #[structopt(name = "FILE", parse(from_os_str), required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    Coordinator {
        socket: opt.socket.unwrap_or_else(mapred::rendezvous_path),
        files: opt.files,
        n_reduce: opt.nreduce,
        task_deadline: Duration::from_secs(opt.task_deadline),
        sweep_interval: Duration::from_secs(opt.sweep_interval),
    }
    .launch()
    .await
}
