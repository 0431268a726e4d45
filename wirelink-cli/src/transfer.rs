//! `wirelink download` and `wirelink upload`.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use wirelink::{HttpClient, HttpClientBuilder};

use crate::{DialArgs, human_size};

/// Arguments for `wirelink download`.
#[derive(clap::Args)]
pub struct DownloadArgs {
    /// URL to fetch.
    url: String,

    /// Destination file.
    file: PathBuf,
}

/// Arguments for `wirelink upload`.
#[derive(clap::Args)]
pub struct UploadArgs {
    /// URL to POST to.
    url: String,

    /// File sent as the request body.
    file: PathBuf,

    /// Send as multipart/form-data under this field name.
    #[arg(long, value_name = "FIELD")]
    form: Option<String>,
}

pub fn download(args: &DownloadArgs, dial: &DialArgs) -> Result<()> {
    let http = client(&args.url, dial)?;
    let file = File::create(&args.file)
        .with_context(|| format!("failed to create {}", args.file.display()))?;
    let n = http.download_progress("", io::BufWriter::new(file), |done, total| {
        report(done, total);
    })?;
    eprintln!();
    eprintln!("{} -> {}", human_size(n), args.file.display());
    Ok(())
}

pub fn upload(args: &UploadArgs, dial: &DialArgs) -> Result<()> {
    let http = client(&args.url, dial)?;
    let file = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;

    let response = if let Some(field) = &args.form {
        let filename = args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        http.upload_form("", field, &filename, file, &[])?
    } else {
        let total = file.metadata()?.len();
        let response = http.upload_progress("", file, total, |done| report(done, Some(total)))?;
        eprintln!();
        response
    };

    let mut body = response.into_body().into_reader();
    let mut stdout = io::stdout().lock();
    io::copy(&mut body, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Builds an HTTP client whose base URL is the full target URL.
fn client(url: &str, dial: &DialArgs) -> Result<HttpClient> {
    let mut builder: HttpClientBuilder = HttpClient::builder(url);
    let proxy = dial
        .proxy
        .clone()
        .or_else(|| std::env::var(wirelink::ENV_PROXY).ok().filter(|p| !p.is_empty()));
    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }
    if let Some(secs) = dial.connect_timeout {
        builder = builder.connect_timeout(std::time::Duration::from_secs(secs));
    }
    for (name, value) in dial.header_pairs()? {
        builder = builder.header(name, value);
    }
    Ok(builder.build()?)
}

/// Rewrites the progress line on stderr.
fn report(done: u64, total: Option<u64>) {
    match total {
        Some(total) => eprint!("\r{} / {}", human_size(done), human_size(total)),
        None => eprint!("\r{}", human_size(done)),
    }
}
