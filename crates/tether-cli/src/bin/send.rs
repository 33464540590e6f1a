use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use tether_arq::{run_sender, SenderConfig, TracingLogger, TransferStats, UdpTransport};
use tether_cli::SendArgs;

fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let args = match SendArgs::try_parse() {
        Ok(args) => args,
        Err(e) => return tether_cli::usage_exit(e),
    };

    tether_cli::init_tracing();
    tether_cli::finish(run(args))
}

fn run(args: SendArgs) -> anyhow::Result<()> {
    let arq = args.arq.to_config();
    arq.validate().context("invalid transfer settings")?;

    let peer = SocketAddr::new(args.target_ip, args.target_port);
    let local = tether_cli::local_bind_addr(args.local_port, &peer);
    let transport = UdpTransport::bind(local, arq.recv_timeout)
        .with_context(|| format!("cannot bind UDP {}", local))?;

    info!(%peer, %local, file = %args.file_path.display(), chunk_size = arq.chunk_size, "sending");

    let stats = Arc::new(TransferStats::new());
    let config = SenderConfig {
        file_path: args.file_path,
        peer_addr: peer,
        arq,
        logger: Some(Arc::new(TracingLogger)),
    };
    let result = run_sender(config, transport, stats).context("transfer failed")?;

    info!(
        file = %result.file_name,
        bytes = result.file_size,
        chunks = result.chunks,
        retransmits = result.retransmits,
        sha256 = %result.file_sha256,
        "sent in {:.2}s ({:.1} KB/s)",
        result.elapsed.as_secs_f64(),
        tether_cli::throughput(result.file_size, result.elapsed) / 1024.0,
    );
    Ok(())
}
