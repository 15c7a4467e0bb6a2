use std::io::Read;
use std::time::Duration;

use crate::error::HttpError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:10.0) Gecko/20100101 Firefox/10.0";

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Box<dyn Read + Send>) -> Self {
        Self { status, body }
    }

    pub fn text(mut self) -> Result<String, HttpError> {
        let mut text = String::new();
        self.body.read_to_string(&mut text)?;
        Ok(text)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse").field("status", &self.status).finish_non_exhaustive()
    }
}

pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;
}

// Blocking client; every request is bounded by `timeout`
#[derive(Debug, Clone)]
pub struct AttoHttpClient {
    timeout: Duration,
}

impl AttoHttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for AttoHttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl HttpClient for AttoHttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        log::debug!("GET {}", url);
        let response = attohttpc::get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json, text/plain, image/*, */*")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .timeout(self.timeout)
            .send()?;

        let (status, _headers, reader) = response.split();
        Ok(HttpResponse::new(status.as_u16(), Box::new(reader)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every requested URL.
    #[derive(Default)]
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<HttpResponse>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, status: u16, body: impl Into<Vec<u8>>) -> Self {
            self.respond_stream(status, Cursor::new(body.into()))
        }

        /// Queues a response whose body is read from `body` as the caller pulls it.
        pub fn respond_stream(self, status: u16, body: impl Read + Send + 'static) -> Self {
            self.responses.lock().unwrap().push_back(HttpResponse::new(status, Box::new(body)));
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn urls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HttpClient for ScriptedClient {
        fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.responses.lock().unwrap().pop_front() {
                Some(response) => Ok(response),
                None => Err(HttpError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no scripted response left",
                ))),
            }
        }
    }
}
