//! `wirelink send` and `wirelink recv`.

use std::io::Write;

use anyhow::{Context, Result};
use wirelink::{DialOptions, Endpoint, Error, MessageClient};

/// Arguments for `wirelink send`.
#[derive(clap::Args)]
pub struct SendArgs {
    /// Endpoint (tcp://host:port, udp://host:port, ws://..., or host:port).
    endpoint: Endpoint,

    /// Messages to send, one per argument.
    #[arg(required = true, num_args = 1..)]
    messages: Vec<String>,

    /// Parse each message as JSON and send it re-encoded.
    #[arg(long)]
    json: bool,
}

/// Arguments for `wirelink recv`.
#[derive(clap::Args)]
pub struct RecvArgs {
    /// Endpoint (tcp://host:port, udp://host:port, ws://..., or host:port).
    endpoint: Endpoint,

    /// Stop after this many messages.
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Message written once before reading, e.g. to register with the peer.
    #[arg(long)]
    greeting: Option<String>,
}

pub fn send(args: &SendArgs, opts: &DialOptions) -> Result<()> {
    // Validate everything before dialing.
    let values = if args.json {
        args.messages
            .iter()
            .map(|m| {
                serde_json::from_str::<serde_json::Value>(m)
                    .with_context(|| format!("invalid JSON: {m}"))
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    let client = wirelink::connect(&args.endpoint, opts)
        .with_context(|| format!("failed to connect to {}", args.endpoint))?;
    if args.json {
        for value in &values {
            client.write_json(value)?;
        }
    } else {
        for message in &args.messages {
            client.write(message.as_bytes())?;
        }
    }
    tracing::debug!(count = args.messages.len(), "messages sent");
    client.close()?;
    Ok(())
}

pub fn recv(args: &RecvArgs, opts: &DialOptions) -> Result<()> {
    let client = wirelink::connect(&args.endpoint, opts)
        .with_context(|| format!("failed to connect to {}", args.endpoint))?;
    if let Some(greeting) = &args.greeting {
        client.write(greeting.as_bytes())?;
    }

    let mut stdout = std::io::stdout().lock();
    let mut received = 0usize;
    while args.count.is_none_or(|n| received < n) {
        let message = match client.read() {
            Ok(m) => m,
            Err(e) if e.is_clean_eof() => break,
            Err(e) => return Err(e.into()),
        };
        stdout.write_all(&message)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
        received += 1;
    }

    match client.close() {
        Ok(()) | Err(Error::Closed) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
