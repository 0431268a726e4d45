//! Request/response façade with progress-instrumented transfers.
//!
//! Routes are appended verbatim to the base URL. Every status other than
//! 200 is turned into [`Error::RemoteStatus`] carrying the response body.
//!
//! ```no_run
//! use wirelink::HttpClient;
//!
//! let http = HttpClient::builder("https://files.example.com")
//!     .header("Authorization", "Bearer token")
//!     .build()?;
//! let mut out = std::fs::File::create("report.pdf")?;
//! http.download_progress("/reports/1.pdf", &mut out, |done, total| {
//!     eprintln!("{done}/{total:?}");
//! })?;
//! # Ok::<(), wirelink::Error>(())
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use ureq::{Agent, RequestBuilder, SendBody};

use crate::{Error, Progress, Result};

/// A response whose status was 200.
pub type Response = ureq::http::Response<ureq::Body>;

/// Read size for progress-reporting downloads.
const CHUNK_SIZE: usize = 32 * 1024;

/// Upper bound on the body captured into [`Error::RemoteStatus`].
const MAX_ERROR_BODY: u64 = 64 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

/// Builder for [`HttpClient`].
#[derive(Debug, Clone)]
#[must_use = "call .build() to create the client"]
pub struct HttpClientBuilder {
    /// Prefix for every route.
    base_url: String,
    /// Headers sent with every request.
    headers: Vec<(String, String)>,
    /// Proxy URL (`http://`, `https://`, `socks5://`).
    proxy: Option<String>,
    /// Whole-request timeout.
    timeout: Option<Duration>,
    /// Bound on establishing the connection alone.
    connect_timeout: Option<Duration>,
}

impl HttpClientBuilder {
    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Routes requests through `url`.
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    /// Bounds each request, body transfer included.
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bounds connection setup only; body transfers may run longer.
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<HttpClient> {
        let mut config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(self.timeout)
            .timeout_connect(self.connect_timeout);
        if let Some(url) = &self.proxy {
            let proxy = ureq::Proxy::new(url).map_err(|e| Error::Http(e.to_string()))?;
            config = config.proxy(Some(proxy));
        }
        Ok(HttpClient {
            base_url: self.base_url,
            headers: self.headers,
            agent: Agent::new_with_config(config.build()),
        })
    }
}

/// Blocking HTTP client bound to a base URL.
pub struct HttpClient {
    /// Prefix for every route.
    base_url: String,
    /// Headers sent with every request.
    headers: Vec<(String, String)>,
    /// Connection pool and transport configuration.
    agent: Agent,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Starts building a client for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> HttpClientBuilder {
        HttpClientBuilder {
            base_url: base_url.into(),
            headers: Vec::new(),
            proxy: None,
            timeout: None,
            connect_timeout: None,
        }
    }

    /// Creates a client with no default headers, proxy or timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    /// Replaces the headers sent with every request.
    pub fn set_headers<K, V>(&mut self, headers: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    /// Sends a GET request.
    pub fn get(&self, route: &str) -> Result<Response> {
        let url = self.url(route);
        debug!(%url, "GET");
        check(self.with_headers(self.agent.get(&url)).call())
    }

    /// Copies the body of `GET route` into `sink`, returning the byte count.
    pub fn download(&self, route: &str, mut sink: impl Write) -> Result<u64> {
        let mut body = self.get(route)?.into_body().into_reader();
        let n = io::copy(&mut body, &mut sink)?;
        sink.flush()?;
        Ok(n)
    }

    /// Like [`download`](Self::download), reporting progress after every chunk.
    ///
    /// `on_progress` receives the running total and the declared
    /// `Content-Length`, or `None` when the server did not send one.
    pub fn download_progress<F>(
        &self,
        route: &str,
        mut sink: impl Write,
        on_progress: F,
    ) -> Result<u64>
    where
        F: FnMut(u64, Option<u64>),
    {
        let response = self.get(route)?;
        let total = content_length(&response);
        let mut body = Progress::new(response.into_body().into_reader(), total, on_progress);
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            sink.write_all(&buf[..n])?;
        }
        sink.flush()?;
        Ok(body.transferred())
    }

    /// Sends a POST request with the given body and content type.
    pub fn post(&self, route: &str, content_type: &str, mut body: impl Read) -> Result<Response> {
        let url = self.url(route);
        debug!(%url, %content_type, "POST");
        let request = self
            .agent
            .post(&url)
            .header("Content-Type", content_type);
        check(self.with_headers(request).send(SendBody::from_reader(&mut body)))
    }

    /// POSTs `value` as JSON.
    pub fn post_json<T: Serialize + ?Sized>(&self, route: &str, value: &T) -> Result<Response> {
        let body = serde_json::to_vec(value)?;
        self.post(route, "application/json", body.as_slice())
    }

    /// POSTs `fields` as `application/x-www-form-urlencoded`.
    pub fn post_form(&self, route: &str, fields: &[(&str, &str)]) -> Result<Response> {
        let url = self.url(route);
        debug!(%url, "POST form");
        check(
            self.with_headers(self.agent.post(&url))
                .send_form(fields.iter().copied()),
        )
    }

    /// POSTs `body` as `application/octet-stream`.
    pub fn upload(&self, route: &str, body: impl Read) -> Result<Response> {
        self.post(route, OCTET_STREAM, body)
    }

    /// Like [`upload`](Self::upload) with a declared length, reporting the
    /// running byte count as the body is sent.
    ///
    /// The request carries `Content-Length: total`; `body` must yield exactly
    /// that many bytes.
    pub fn upload_progress<F>(
        &self,
        route: &str,
        body: impl Read,
        total: u64,
        mut on_progress: F,
    ) -> Result<Response>
    where
        F: FnMut(u64),
    {
        let url = self.url(route);
        debug!(%url, total, "POST upload");
        let mut body = Progress::new(body, Some(total), |done, _| on_progress(done));
        let request = self
            .agent
            .post(&url)
            .header("Content-Type", OCTET_STREAM)
            .header("Content-Length", total.to_string());
        check(self.with_headers(request).send(SendBody::from_reader(&mut body)))
    }

    /// POSTs a `multipart/form-data` body holding `file` under `field`,
    /// followed by the text `fields`.
    ///
    /// The body is streamed; `file` is not buffered.
    pub fn upload_form(
        &self,
        route: &str,
        field: &str,
        filename: &str,
        file: impl Read,
        fields: &[(&str, &str)],
    ) -> Result<Response> {
        let boundary = boundary();
        let head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {OCTET_STREAM}\r\n\r\n",
            escape_quotes(field),
            escape_quotes(filename),
        );
        let mut tail = String::from("\r\n");
        for (name, value) in fields {
            tail.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{value}\r\n",
                escape_quotes(name),
            ));
        }
        tail.push_str(&format!("--{boundary}--\r\n"));

        let body = io::Cursor::new(head)
            .chain(file)
            .chain(io::Cursor::new(tail));
        self.post(
            route,
            &format!("multipart/form-data; boundary={boundary}"),
            body,
        )
    }

    /// Joins the base URL and `route`.
    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    /// Adds the default headers to `request`.
    fn with_headers<B>(&self, mut request: RequestBuilder<B>) -> RequestBuilder<B> {
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }
}

/// Decodes a JSON response body into `T`.
pub fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.into_body().into_reader();
    Ok(serde_json::from_reader(body)?)
}

/// Maps transport errors and non-200 statuses to [`Error`].
fn check(result: std::result::Result<Response, ureq::Error>) -> Result<Response> {
    let response = result.map_err(|e| Error::Http(e.to_string()))?;
    let status = response.status().as_u16();
    if status == 200 {
        return Ok(response);
    }

    let mut body = Vec::new();
    // The status is the error; a body that fails to read is reported empty.
    let _ = response
        .into_body()
        .into_reader()
        .take(MAX_ERROR_BODY)
        .read_to_end(&mut body);
    Err(Error::RemoteStatus {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Returns the declared `Content-Length`, if any.
fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("content-length")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Generates a multipart boundary unlikely to occur in the payload.
fn boundary() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("wirelink{nanos:x}{:x}{seq:x}", std::process::id())
}

/// Escapes `\` and `"` for a quoted `Content-Disposition` parameter.
fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Seek};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    /// A request as seen by the test server.
    #[derive(Debug)]
    struct Captured {
        head: String,
        body: Vec<u8>,
    }

    impl Captured {
        fn header(&self, name: &str) -> Option<&str> {
            self.head.lines().skip(1).find_map(|line| {
                let (k, v) = line.split_once(':')?;
                k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
            })
        }
    }

    /// Serves one request with the raw `response`, then closes.
    fn serve(response: Vec<u8>) -> (String, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let captured = read_request(&stream);
            stream.write_all(&response).unwrap();
            captured
        });
        (base, handle)
    }

    fn read_request(stream: &TcpStream) -> Captured {
        let mut reader = BufReader::new(stream);
        let mut head = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let end = line == "\r\n" || line.is_empty();
            head.push_str(&line);
            if end {
                break;
            }
        }
        let mut captured = Captured {
            head,
            body: Vec::new(),
        };
        if captured
            .header("transfer-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
        {
            loop {
                let mut size = String::new();
                reader.read_line(&mut size).unwrap();
                let size = usize::from_str_radix(size.trim(), 16).unwrap();
                let mut chunk = vec![0u8; size + 2];
                reader.read_exact(&mut chunk).unwrap();
                if size == 0 {
                    break;
                }
                captured.body.extend_from_slice(&chunk[..size]);
            }
        } else if let Some(len) = captured.header("content-length") {
            let mut body = vec![0u8; len.parse().unwrap()];
            reader.read_exact(&mut body).unwrap();
            captured.body = body;
        }
        captured
    }

    fn reply(status: &str, extra: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n{extra}\r\n").into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn ok(body: &[u8]) -> Vec<u8> {
        reply("200 OK", &format!("Content-Length: {}\r\n", body.len()), body)
    }

    #[test]
    fn get_applies_default_headers() {
        let (base, server) = serve(ok(b"pong"));
        let http = HttpClient::builder(base).header("X-Api-Key", "k1").build().unwrap();
        let mut body = String::new();
        http.get("/ping")
            .unwrap()
            .into_body()
            .into_reader()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "pong");

        let req = server.join().unwrap();
        assert!(req.head.starts_with("GET /ping HTTP/1.1\r\n"), "{}", req.head);
        assert_eq!(req.header("x-api-key"), Some("k1"));
    }

    #[test]
    fn set_headers_replaces_defaults() {
        let (base, server) = serve(ok(b""));
        let mut http = HttpClient::builder(base).header("X-Old", "1").build().unwrap();
        http.set_headers([("X-New", "2")]);
        http.get("/").unwrap();

        let req = server.join().unwrap();
        assert_eq!(req.header("x-old"), None);
        assert_eq!(req.header("x-new"), Some("2"));
    }

    #[test]
    fn non_200_is_remote_status() {
        let (base, server) = serve(reply("404 Not Found", "Content-Length: 7\r\n", b"missing"));
        let http = HttpClient::new(base).unwrap();
        let err = http.get("/nope").unwrap_err();
        match &err {
            Error::RemoteStatus { status, body } => {
                assert_eq!(*status, 404);
                assert_eq!(body, "missing");
            }
            other => panic!("expected RemoteStatus, got {other:?}"),
        }
        assert_eq!(err.to_string(), "status code: 404, body: missing");
        server.join().unwrap();
    }

    #[test]
    fn download_progress_reports_declared_length() {
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let (base, server) = serve(ok(&payload));
        let http = HttpClient::new(base).unwrap();

        let mut calls = Vec::new();
        let mut sink = Vec::new();
        let n = http
            .download_progress("/blob", &mut sink, |done, total| calls.push((done, total)))
            .unwrap();

        assert_eq!(n, 100_000);
        assert_eq!(sink, payload);
        assert!(calls.iter().all(|&(_, total)| total == Some(100_000)));
        assert!(calls.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(calls.last().map(|c| c.0), Some(100_000));
        server.join().unwrap();
    }

    #[test]
    fn download_progress_without_length_reports_unknown_total() {
        let payload = vec![b'z'; 70_000];
        let (base, server) = serve(reply("200 OK", "", &payload));
        let http = HttpClient::new(base).unwrap();

        let mut calls = Vec::new();
        let mut sink = Vec::new();
        http.download_progress("/stream", &mut sink, |done, total| calls.push((done, total)))
            .unwrap();

        assert_eq!(sink, payload);
        assert!(!calls.is_empty());
        assert!(calls.iter().all(|&(_, total)| total.is_none()));
        assert_eq!(calls.last().map(|c| c.0), Some(70_000));
        server.join().unwrap();
    }

    #[test]
    fn download_into_file() {
        let (base, server) = serve(ok(b"file contents"));
        let http = HttpClient::new(base).unwrap();
        let mut file = tempfile::tempfile().unwrap();
        assert_eq!(http.download("/f", &mut file).unwrap(), 13);

        file.rewind().unwrap();
        let mut back = String::new();
        file.read_to_string(&mut back).unwrap();
        assert_eq!(back, "file contents");
        server.join().unwrap();
    }

    #[test]
    fn upload_progress_declares_length() {
        let data: Vec<u8> = (0..100u8).collect();
        let (base, server) = serve(ok(b"stored"));
        let http = HttpClient::new(base).unwrap();

        let mut seen = Vec::new();
        http.upload_progress("/up", data.as_slice(), 100, |done| seen.push(done))
            .unwrap();

        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        let req = server.join().unwrap();
        assert_eq!(req.header("content-length"), Some("100"));
        assert_eq!(req.header("content-type"), Some(OCTET_STREAM));
        assert_eq!(req.body, data);
    }

    #[test]
    fn upload_sends_octet_stream() {
        let (base, server) = serve(ok(b""));
        let http = HttpClient::new(base).unwrap();
        http.upload("/raw", &b"\x00\x01\x02"[..]).unwrap();

        let req = server.join().unwrap();
        assert_eq!(req.header("content-type"), Some(OCTET_STREAM));
        assert_eq!(req.body, [0, 1, 2]);
    }

    #[test]
    fn post_json_and_parse_response() {
        #[derive(serde::Deserialize)]
        struct Reply {
            id: u32,
            name: String,
        }

        let (base, server) = serve(ok(br#"{"id":7,"name":"seven"}"#));
        let http = HttpClient::new(base).unwrap();
        let response = http
            .post_json("/items", &serde_json::json!({"name": "seven"}))
            .unwrap();
        let reply: Reply = parse_response(response).unwrap();
        assert_eq!(reply.id, 7);
        assert_eq!(reply.name, "seven");

        let req = server.join().unwrap();
        assert!(req.head.starts_with("POST /items "));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.body, br#"{"name":"seven"}"#);
    }

    #[test]
    fn parse_response_rejects_invalid_json() {
        let (base, server) = serve(ok(b"not json"));
        let http = HttpClient::new(base).unwrap();
        let err = parse_response::<serde_json::Value>(http.get("/").unwrap()).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        server.join().unwrap();
    }

    #[test]
    fn post_form_is_urlencoded() {
        let (base, server) = serve(ok(b""));
        let http = HttpClient::new(base).unwrap();
        http.post_form("/login", &[("user", "ann"), ("pin", "1234")])
            .unwrap();

        let req = server.join().unwrap();
        assert_eq!(
            req.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(req.body, b"user=ann&pin=1234");
    }

    #[test]
    fn upload_form_builds_multipart_body() {
        let (base, server) = serve(ok(b""));
        let http = HttpClient::new(base).unwrap();
        http.upload_form(
            "/form",
            "file",
            "a.txt",
            &b"alpha"[..],
            &[("note", "first")],
        )
        .unwrap();

        let req = server.join().unwrap();
        let content_type = req.header("content-type").unwrap();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let expected = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             alpha\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             first\r\n\
             --{boundary}--\r\n"
        );
        assert_eq!(String::from_utf8(req.body).unwrap(), expected);
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(boundary(), boundary());
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(escape_quotes(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    #[test]
    fn unreachable_server_is_http_error() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let http = HttpClient::new(format!("http://127.0.0.1:{port}")).unwrap();
        assert!(matches!(http.get("/").unwrap_err(), Error::Http(_)));
    }

    #[test]
    fn connect_timeout_does_not_bound_body_transfer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&stream);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 4\r\n\r\nsl")
                .unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(400));
            stream.write_all(b"ow").unwrap();
        });

        let http = HttpClient::builder(base)
            .connect_timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let mut sink = Vec::new();
        assert_eq!(http.download("/slow", &mut sink).unwrap(), 4);
        assert_eq!(sink, b"slow");
        server.join().unwrap();
    }
}
