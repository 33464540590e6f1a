use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use tether_arq::{run_receiver, ReceiverConfig, TracingLogger, TransferStats, UdpTransport};
use tether_cli::RecvArgs;

fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let args = match RecvArgs::try_parse() {
        Ok(args) => args,
        Err(e) => return tether_cli::usage_exit(e),
    };

    tether_cli::init_tracing();
    tether_cli::finish(run(args))
}

fn run(args: RecvArgs) -> anyhow::Result<()> {
    let arq = args.arq.to_config();
    arq.validate().context("invalid transfer settings")?;

    let peer = SocketAddr::new(args.target_ip, args.target_port);
    let local = tether_cli::local_bind_addr(args.local_port, &peer);
    let transport = UdpTransport::bind(local, arq.recv_timeout)
        .with_context(|| format!("cannot bind UDP {}", local))?;

    info!(%peer, %local, output_dir = %args.output_dir.display(), "waiting for sender");

    let stats = Arc::new(TransferStats::new());
    let config = ReceiverConfig {
        peer_addr: peer,
        output_dir: args.output_dir,
        arq,
        logger: Some(Arc::new(TracingLogger)),
    };
    let result = run_receiver(config, transport, stats).context("transfer failed")?;

    // The file is kept either way; a mismatch is reported, not fatal.
    if result.digest_match {
        info!(sha256 = %result.actual_sha256, "file digest verified");
    } else {
        warn!(
            expected = %result.expected_sha256,
            actual = %result.actual_sha256,
            "file digest mismatch"
        );
    }

    info!(
        path = %result.output_path.display(),
        bytes = result.bytes_written,
        chunks = result.chunks,
        "received in {:.2}s ({:.1} KB/s)",
        result.elapsed.as_secs_f64(),
        tether_cli::throughput(result.bytes_written, result.elapsed) / 1024.0,
    );
    Ok(())
}
