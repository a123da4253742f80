use hearsay::{bootstrap, Config, Node};
use std::{net::SocketAddr, path::PathBuf, process, time::Duration};
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(StructOpt, Debug)]
#[structopt(name = "hearsay", rename_all = "kebab-case")]
struct Opts {
    /// File listing the initial members, one host:port per line.
    #[structopt(long, parse(from_os_str), default_value = "config/start_ips")]
    bootstrap: PathBuf,

    /// This node's own entry. Found by matching the local IP address against
    /// the bootstrap list when left out.
    #[structopt(long)]
    local: Option<String>,

    /// Address to bind the gossip socket to.
    #[structopt(long)]
    bind: Option<SocketAddr>,

    #[structopt(long, default_value = "100")]
    gossip_interval_ms: u64,

    #[structopt(long, default_value = "10000")]
    cleanup_timeout_ms: u64,

    /// Simulated loss: a datagram is sent only if a draw in 0..100 is above
    /// this value.
    #[structopt(long, default_value = "30")]
    loss: u32,

    /// Send every datagram.
    #[structopt(long)]
    no_loss: bool,
}

impl Opts {
    fn config(&self) -> Config {
        let loss = if self.no_loss { None } else { Some(self.loss) };

        let config = Config::default()
            .with_gossip_interval(Duration::from_millis(self.gossip_interval_ms))
            .with_cleanup_timeout(Duration::from_millis(self.cleanup_timeout_ms))
            .with_loss_threshold(loss);

        match self.bind {
            Some(addr) => config.with_bind_addr(addr),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hearsay=info")),
        )
        .init();

    let opts = Opts::from_args();

    if let Err(e) = run(opts).await {
        error!(error = %e, "Fatal");
        process::exit(1);
    }
}

async fn run(opts: Opts) -> hearsay::Result<()> {
    let peers = bootstrap::load(&opts.bootstrap)?;

    let local = match &opts.local {
        Some(local) => local.clone(),
        None => bootstrap::identify_local(&peers, bootstrap::local_ip()?)?,
    };
    info!(%local, "I am");

    let node = Node::bind_udp(opts.config(), local, peers).await?;
    let handle = node.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            handle.shutdown();
        }
    });

    node.run().await
}
