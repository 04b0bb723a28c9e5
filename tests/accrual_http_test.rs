mod common;

use common::{AccrualStub, RecordingSleeper, answer, no_content, reply};
use gophermart::application::accrual::AccrualClient;
use gophermart::application::cancellation::CancellationSignal;
use gophermart::domain::ledger::Points;
use gophermart::domain::order::{AccrualStatus, OrderNumber};
use gophermart::error::LoyaltyError;
use gophermart::infrastructure::http::HttpAccrualTransport;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

async fn client(base: &str, sleeper: Arc<RecordingSleeper>) -> AccrualClient {
    let transport = HttpAccrualTransport::new(base, Duration::from_secs(5)).unwrap();
    AccrualClient::new(Arc::new(transport), sleeper)
}

#[tokio::test]
async fn test_backoff_over_http() {
    let (stub, base) = AccrualStub::start().await;
    stub.script(
        "12345678903",
        vec![
            reply(429, Some("2"), "No more than 10 requests per minute allowed"),
            no_content(),
            no_content(),
            answer("12345678903", "PROCESSED", Some(500)),
        ],
    );
    let sleeper = RecordingSleeper::new();
    let client = client(&base, sleeper.clone()).await;
    let signal = CancellationSignal::new();

    let info = client
        .get_order_info(&OrderNumber::parse("12345678903").unwrap(), &signal.token())
        .await
        .unwrap();

    assert_eq!(info.status, AccrualStatus::Processed);
    assert_eq!(info.accrual, Some(Points::new(dec!(500))));
    assert_eq!(
        sleeper.slept(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(1),
            Duration::from_secs(1)
        ]
    );
    assert_eq!(stub.calls("12345678903"), 4);
}

#[tokio::test]
async fn test_server_error_over_http() {
    let (stub, base) = AccrualStub::start().await;
    stub.script("12345678903", vec![reply(500, None, "")]);
    let sleeper = RecordingSleeper::new();
    let client = client(&base, sleeper.clone()).await;
    let signal = CancellationSignal::new();

    let result = client
        .get_order_info(&OrderNumber::parse("12345678903").unwrap(), &signal.token())
        .await;

    assert!(matches!(result, Err(LoyaltyError::InternalError(_))));
    assert_eq!(stub.calls("12345678903"), 1);
    assert!(sleeper.slept().is_empty());
}

#[tokio::test]
async fn test_fractional_accrual_over_http() {
    let (stub, base) = AccrualStub::start().await;
    stub.script(
        "79927398713",
        vec![reply(
            200,
            None,
            r#"{"order":"79927398713","status":"PROCESSED","accrual":729.98}"#,
        )],
    );
    let client = client(&base, RecordingSleeper::new()).await;
    let signal = CancellationSignal::new();

    let info = client
        .get_order_info(&OrderNumber::parse("79927398713").unwrap(), &signal.token())
        .await
        .unwrap();

    assert_eq!(info.accrual, Some(Points::new(dec!(729.98))));
}

#[tokio::test]
async fn test_unreachable_service_is_an_error() {
    // Nothing listens on the port of a dropped listener.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let client = client(&base, RecordingSleeper::new()).await;
    let signal = CancellationSignal::new();

    let result = client
        .get_order_info(&OrderNumber::parse("12345678903").unwrap(), &signal.token())
        .await;

    assert!(matches!(result, Err(LoyaltyError::HttpError(_))));
}
