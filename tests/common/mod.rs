#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use gophermart::domain::order::OrderNumber;
use gophermart::domain::ports::{AccrualReply, AccrualTransport, Sleeper};
use gophermart::error::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Appends a Luhn check digit to `prefix`.
pub fn luhn_number(prefix: u64) -> String {
    let body = prefix.to_string();
    let sum: u32 = body
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    format!("{body}{check}")
}

pub fn reply(status: u16, retry_after: Option<&str>, body: &str) -> AccrualReply {
    AccrualReply {
        status,
        retry_after: retry_after.map(str::to_owned),
        body: body.as_bytes().to_vec(),
    }
}

pub fn no_content() -> AccrualReply {
    reply(204, None, "")
}

pub fn answer(number: &str, status: &str, accrual: Option<u64>) -> AccrualReply {
    let body = match accrual {
        Some(points) => format!(r#"{{"order":"{number}","status":"{status}","accrual":{points}}}"#),
        None => format!(r#"{{"order":"{number}","status":"{status}"}}"#),
    };
    reply(200, None, &body)
}

/// Per-order scripted replies. The last reply of a script repeats forever;
/// orders without a script get `204`.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<AccrualReply>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, number: &str, replies: Vec<AccrualReply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(number.to_string(), replies.into());
    }

    pub fn calls(&self, number: &str) -> usize {
        self.calls.lock().unwrap().get(number).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn next(&self, number: &str) -> AccrualReply {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(number.to_string())
            .or_default() += 1;
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(number) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or_else(no_content),
            None => no_content(),
        }
    }
}

#[async_trait]
impl AccrualTransport for ScriptedTransport {
    async fn fetch(&self, number: &OrderNumber) -> Result<AccrualReply> {
        Ok(self.next(number.as_str()))
    }
}

/// Returns immediately and remembers what it was asked to wait.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// An accrual service stub served over real HTTP on a random local port.
#[derive(Clone, Default)]
pub struct AccrualStub {
    transport: Arc<ScriptedTransport>,
}

impl AccrualStub {
    /// Starts the stub and returns it with its base URL.
    pub async fn start() -> (Self, String) {
        let stub = Self::default();
        let app = Router::new()
            .route("/api/orders/{number}", get(order_info))
            .with_state(stub.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (stub, format!("http://{addr}"))
    }

    pub fn script(&self, number: &str, replies: Vec<AccrualReply>) {
        self.transport.script(number, replies);
    }

    pub fn calls(&self, number: &str) -> usize {
        self.transport.calls(number)
    }
}

async fn order_info(State(stub): State<AccrualStub>, Path(number): Path<String>) -> Response {
    let reply = stub.transport.next(&number);
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(reply.status).unwrap())
        .header("Content-Type", "application/json");
    if let Some(retry_after) = reply.retry_after {
        builder = builder.header("Retry-After", retry_after);
    }
    builder.body(Body::from(reply.body)).unwrap()
}
