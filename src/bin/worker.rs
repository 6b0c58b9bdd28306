use std::path::PathBuf;

use anyhow::Context as _;
use structopt::StructOpt;

use mapred::{app, Worker};

#[derive(StructOpt, Debug)]
#[structopt(name = "worker", about = env!("CARGO_PKG_DESCRIPTION"))]
struct Opt {
    /// Coordinator rendezvous socket; defaults to the per-user path
    #[structopt(short, long)]
    socket: Option<PathBuf>,

    /// Working directory shared with the other workers
    #[structopt(short, long, default_value = ".")]
    dir: PathBuf,

    /// Map/Reduce application to run (wc, tfidf)
    #[structopt(short, long, default_value = "wc")]
    app: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let (map, reduce) =
        app::lookup(&opt.app).with_context(|| format!("unknown application {:?}", opt.app))?;
    Worker {
        dir: opt.dir,
        socket: opt.socket.unwrap_or_else(mapred::rendezvous_path),
        map,
        reduce,
    }
    .launch()
    .await
}
