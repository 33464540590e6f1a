/// Argument parsing and process plumbing shared by `tether-send` and
/// `tether-recv`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser};
use tether_arq::{ArqConfig, DEFAULT_MAX_RETRIES, DEFAULT_OUTPUT_DIR, MAX_PAYLOAD_SIZE};

const DEFAULT_LOG_FILTER: &str = "tether_arq=info,tether_cli=info,tether_send=info,tether_recv=info";

/// Protocol tunables, settable by flag or environment.
#[derive(Debug, Clone, Args)]
pub struct ArqArgs {
    /// Payload bytes per DATA packet (1-1024)
    #[arg(long, env = "TETHER_CHUNK_SIZE", default_value_t = MAX_PAYLOAD_SIZE)]
    pub chunk_size: usize,

    /// Receive timeout in milliseconds
    #[arg(long, env = "TETHER_RECV_TIMEOUT_MS", default_value_t = 1000)]
    pub recv_timeout_ms: u64,

    /// Consecutive timeouts tolerated before giving up
    #[arg(long, env = "TETHER_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
}

impl ArqArgs {
    pub fn to_config(&self) -> ArqConfig {
        ArqConfig {
            chunk_size: self.chunk_size,
            recv_timeout: Duration::from_millis(self.recv_timeout_ms),
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tether-send", version, about = "Send one file over UDP, stop-and-wait")]
pub struct SendArgs {
    /// Receiver IP address
    pub target_ip: IpAddr,
    /// Receiver UDP port
    pub target_port: u16,
    /// Local UDP port to bind
    pub local_port: u16,
    /// File to send
    pub file_path: PathBuf,

    #[command(flatten)]
    pub arq: ArqArgs,
}

#[derive(Debug, Parser)]
#[command(name = "tether-recv", version, about = "Receive one file over UDP, stop-and-wait")]
pub struct RecvArgs {
    /// Local UDP port to bind
    pub local_port: u16,
    /// Sender UDP port
    pub target_port: u16,
    /// Sender IP address
    pub target_ip: IpAddr,

    /// Directory the received file is written into
    #[arg(long, env = "TETHER_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub arq: ArqArgs,
}

/// Init logging from `RUST_LOG`, falling back to info for the tether crates.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
}

/// Wildcard address in the peer's family.
pub fn local_bind_addr(port: u16, peer: &SocketAddr) -> SocketAddr {
    let ip: IpAddr = match peer {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    SocketAddr::new(ip, port)
}

/// Print a clap error. Help and version exit 0, bad arguments exit 1.
pub fn usage_exit(err: clap::Error) -> ExitCode {
    let _ = err.print();
    if err.use_stderr() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Log a fatal error with its cause chain and map it to exit code 1.
pub fn finish(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Bytes per second over `elapsed`, for the closing summary line.
pub fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { bytes as f64 / secs } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_positional_order() {
        let args =
            SendArgs::try_parse_from(["tether-send", "10.0.0.2", "6000", "6001", "photo.jpg"]).unwrap();
        assert_eq!(args.target_ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(args.target_port, 6000);
        assert_eq!(args.local_port, 6001);
        assert_eq!(args.file_path, PathBuf::from("photo.jpg"));
    }

    #[test]
    fn test_recv_positional_order() {
        let args = RecvArgs::try_parse_from(["tether-recv", "6000", "6001", "10.0.0.1"]).unwrap();
        assert_eq!(args.local_port, 6000);
        assert_eq!(args.target_port, 6001);
        assert_eq!(args.target_ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = RecvArgs::try_parse_from([
            "tether-recv",
            "6000",
            "6001",
            "::1",
            "--chunk-size",
            "512",
            "--recv-timeout-ms",
            "250",
            "--max-retries",
            "3",
            "--output-dir",
            "/tmp/inbox",
        ])
        .unwrap();
        let config = args.arq.to_config();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.recv_timeout, Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
        assert_eq!(args.output_dir, PathBuf::from("/tmp/inbox"));
    }

    #[test]
    fn test_bad_arguments_are_errors() {
        // missing file path
        let err = SendArgs::try_parse_from(["tether-send", "10.0.0.2", "6000", "6001"]).unwrap_err();
        assert!(err.use_stderr());
        // port out of range
        assert!(RecvArgs::try_parse_from(["tether-recv", "70000", "6001", "10.0.0.1"]).is_err());
        // not an IP
        assert!(RecvArgs::try_parse_from(["tether-recv", "6000", "6001", "localhost"]).is_err());
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = SendArgs::try_parse_from(["tether-send", "--help"]).unwrap_err();
        assert!(!err.use_stderr());
    }

    #[test]
    fn test_local_bind_addr_matches_family() {
        let v4: SocketAddr = "10.0.0.2:6000".parse().unwrap();
        let v6: SocketAddr = "[::1]:6000".parse().unwrap();
        assert_eq!(local_bind_addr(7000, &v4), "0.0.0.0:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(local_bind_addr(7000, &v6), "[::]:7000".parse::<SocketAddr>().unwrap());
    }
}
