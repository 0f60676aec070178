#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mail_intake::api::client::ApiConfig;
use mail_intake::auth::credential_cache::SystemCredentials;
use mail_intake::daemon::retry::RetryPolicy;
use tiny_http::{Response, Server, StatusCode};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Local stand-in for the processing API.
///
/// The handler gets the request path and how many earlier requests hit the same path, and
/// returns the status and body to reply with.
pub struct FakeApi {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeApi {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, usize) -> (u16, String) + Send + 'static,
    {
        let port = {
            let probe = TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let server = Server::http(("127.0.0.1", port)).unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                request.as_reader().read_to_string(&mut body).unwrap();
                let path = request.url().to_string();
                let headers = request
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.to_string()))
                    .collect();

                let seen = {
                    let mut log = log.lock().unwrap();
                    let seen = log.iter().filter(|r: &&Recorded| r.path == path).count();
                    log.push(Recorded {
                        method: request.method().to_string(),
                        path: path.clone(),
                        headers,
                        body,
                    });
                    seen
                };

                let (status, reply) = handler(&path, seen);
                let response = Response::from_string(reply).with_status_code(StatusCode(status));
                let _ = request.respond(response);
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    /// Login always succeeds with token `t1`; submits get `submit(n)`.
    pub fn with_submit<F>(submit: F) -> Self
    where
        F: Fn(usize) -> (u16, String) + Send + 'static,
    {
        Self::start(move |path, n| match path {
            "/api/auth/login" => (
                200,
                r#"{"success":true,"token":"t1","expiresIn":900}"#.to_string(),
            ),
            "/api/mail/process" => submit(n),
            _ => (404, "{}".to_string()),
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

/// Answers every request with `status_line` and a body that stops before its declared
/// length, then hangs up. Returns the base URL.
pub fn truncated_reply_server(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let mut reader = BufReader::new(stream);
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0; content_length];
            let _ = reader.read_exact(&mut body);

            let mut stream = reader.into_inner();
            let reply = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\n\
                 Content-Length: 64\r\nConnection: close\r\n\r\n{{\"message\":"
            );
            let _ = stream.write_all(reply.as_bytes());
        }
    });
    format!("http://127.0.0.1:{port}")
}

pub fn credentials() -> SystemCredentials {
    SystemCredentials {
        email: "system@example.com".to_string(),
        password: "s3cret".to_string(),
    }
}

pub fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        credentials: credentials(),
        internal_token: Some("internal-token".to_string()),
        timeout: Duration::from_secs(5),
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}
