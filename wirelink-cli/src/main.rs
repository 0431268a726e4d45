//! CLI for wirelink message clients and HTTP transfers.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod message;
mod transfer;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;
use wirelink::{ByteOrder, DialOptions, LengthPrefix, PrefixWidth};

#[derive(Parser)]
#[command(
    name = "wirelink",
    version,
    about = "Send and receive messages over TCP, UDP and WebSocket"
)]
struct Cli {
    #[command(flatten)]
    dial: DialArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one message per argument, then close.
    Send(message::SendArgs),

    /// Print received messages, one per line.
    Recv(message::RecvArgs),

    /// Download a URL into a file.
    Download(transfer::DownloadArgs),

    /// Upload a file as the body of a POST request.
    Upload(transfer::UploadArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Connection options shared by all subcommands.
#[derive(clap::Args)]
struct DialArgs {
    /// Proxy URL (falls back to $WIRELINK_PROXY).
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Connect timeout in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Extra header (format: Name:Value). Repeatable.
    #[arg(short = 'H', long = "header", global = true)]
    headers: Vec<String>,

    /// Length prefix width in bytes for TCP framing.
    #[arg(long, global = true, default_value = "4", value_parser = ["1", "2", "4", "8"])]
    prefix: String,

    /// Encode the TCP length prefix little-endian.
    #[arg(long, global = true)]
    little_endian: bool,
}

impl DialArgs {
    /// Builds dial options from the flags and the environment.
    fn options(&self) -> Result<DialOptions> {
        let width = match self.prefix.as_str() {
            "1" => PrefixWidth::U8,
            "2" => PrefixWidth::U16,
            "8" => PrefixWidth::U64,
            _ => PrefixWidth::U32,
        };
        let order = if self.little_endian {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        };

        let mut opts = DialOptions::from_env().framing(LengthPrefix::new(width, order));
        if let Some(proxy) = &self.proxy {
            opts = opts.proxy(proxy);
        }
        if let Some(secs) = self.connect_timeout {
            opts = opts.connect_timeout(Duration::from_secs(secs));
        }
        for (name, value) in self.header_pairs()? {
            opts = opts.header(name, value);
        }
        Ok(opts)
    }

    /// Splits each `Name:Value` header flag.
    fn header_pairs(&self) -> Result<Vec<(&str, &str)>> {
        self.headers
            .iter()
            .map(|h| {
                h.split_once(':')
                    .map(|(k, v)| (k.trim(), v.trim()))
                    .with_context(|| format!("invalid header {h:?}, expected Name:Value"))
            })
            .collect()
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = Cli::parse().dispatch() {
        eprintln!("wirelink: {e:#}");
        std::process::exit(1);
    }
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Send(args) => message::send(&args, &self.dial.options()?),
            Command::Recv(args) => message::recv(&args, &self.dial.options()?),
            Command::Download(args) => transfer::download(&args, &self.dial),
            Command::Upload(args) => transfer::upload(&args, &self.dial),
            Command::Completions { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Self::command(),
                    "wirelink",
                    &mut std::io::stdout(),
                );
                Ok(())
            }
        }
    }
}

/// Formats bytes into a human-readable size string.
#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn header_flags_are_split() {
        let cli = Cli::parse_from([
            "wirelink",
            "-H",
            "Authorization: Bearer t",
            "recv",
            "ws://h:1",
        ]);
        assert_eq!(
            cli.dial.header_pairs().unwrap(),
            [("Authorization", "Bearer t")]
        );

        let cli = Cli::parse_from(["wirelink", "recv", "h:1", "-H", "broken"]);
        assert!(cli.dial.header_pairs().is_err());
    }

    #[test]
    fn human_sizes() {
        assert_eq!(human_size(512), "512.0 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }
}
