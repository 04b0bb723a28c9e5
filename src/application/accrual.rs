//! Client side of the accrual service's polling protocol.
//!
//! The service answers `429` with a `Retry-After` it expects the caller to
//! honour, `204` while it has not registered the order yet, and `500` when it
//! has failed. Anything else carries an order body.

use super::cancellation::CancellationToken;
use crate::domain::order::{AccrualOrder, OrderNumber};
use crate::domain::ports::{AccrualReply, AccrualTransportRef, SleeperRef};
use crate::error::{LoyaltyError, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Wait applied after a `204 No Content`.
pub const NO_CONTENT_DELAY: Duration = Duration::from_secs(1);

/// What the polling loop does after one reply.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Sleep, then repeat the same request.
    Retry(Duration),
    /// Stop polling and decode the body.
    Decode,
}

/// Classifies a single reply. `500` and a `429` without a usable
/// `Retry-After` are errors.
pub fn next_step(reply: &AccrualReply) -> Result<Step> {
    match reply.status {
        429 => {
            let raw = reply.retry_after.as_deref().ok_or_else(|| {
                LoyaltyError::InternalError("429 without Retry-After header".to_string())
            })?;
            let secs: u64 = raw.trim().parse().map_err(|_| {
                LoyaltyError::InternalError(format!("unparseable Retry-After: {:?}", raw))
            })?;
            Ok(Step::Retry(Duration::from_secs(secs)))
        }
        204 => Ok(Step::Retry(NO_CONTENT_DELAY)),
        500 => Err(LoyaltyError::InternalError(
            "accrual service internal error".to_string(),
        )),
        _ => Ok(Step::Decode),
    }
}

/// Polls the accrual service for one order until it has an answer.
pub struct AccrualClient {
    transport: AccrualTransportRef,
    sleeper: SleeperRef,
}

impl AccrualClient {
    pub fn new(transport: AccrualTransportRef, sleeper: SleeperRef) -> Self {
        Self { transport, sleeper }
    }

    /// Returns the service's view of `number`.
    ///
    /// Rate limits and "not registered yet" replies are absorbed here. The
    /// token is checked before every request and raced against the request
    /// and every sleep; once raised the call returns `Cancelled`.
    pub async fn get_order_info(
        &self,
        number: &OrderNumber,
        cancel: &CancellationToken,
    ) -> Result<AccrualOrder> {
        loop {
            if cancel.is_cancelled() {
                info!(order = %number, "stop polling order");
                return Err(LoyaltyError::Cancelled);
            }

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LoyaltyError::Cancelled),
                reply = self.transport.fetch(number) => reply.inspect_err(|e| {
                    error!(order = %number, error = %e, "failed to get order info from accrual service");
                })?,
            };

            match next_step(&reply) {
                Ok(Step::Retry(delay)) => {
                    if reply.status == 429 {
                        warn!(order = %number, retry_after_secs = delay.as_secs(), "rate limited");
                    } else {
                        debug!(order = %number, "order not registered yet");
                    }
                    self.pause(delay, cancel).await?;
                }
                Ok(Step::Decode) => return decode(number, &reply),
                Err(e) => {
                    error!(order = %number, status = reply.status, error = %e, "giving up on order");
                    return Err(e);
                }
            }
        }
    }

    /// Sleeps for `delay` unless cancelled first.
    pub async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LoyaltyError::Cancelled),
            _ = self.sleeper.sleep(delay) => Ok(()),
        }
    }
}

fn decode(number: &OrderNumber, reply: &AccrualReply) -> Result<AccrualOrder> {
    let order: AccrualOrder = serde_json::from_slice(&reply.body).map_err(|e| {
        error!(
            order = %number,
            status = reply.status,
            body = %String::from_utf8_lossy(&reply.body),
            "failed to decode accrual order"
        );
        LoyaltyError::InternalError(format!("undecodable accrual reply: {}", e))
    })?;
    if order.order != number.as_str() {
        warn!(order = %number, reported = %order.order, "accrual service answered for another order");
    }
    debug!(order = %number, status = ?order.status, accrual = ?order.accrual, "order info received");
    Ok(order)
}
