//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

/// Upper bound for any single pipeline run in tests.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `future`, failing the test instead of hanging on a stalled pipeline.
pub async fn within_timeout<F: std::future::Future>(future: F) -> Result<F::Output> {
    tokio::time::timeout(RUN_TIMEOUT, future)
        .await
        .map_err(|_| anyhow::anyhow!("pipeline did not finish within {:?}", RUN_TIMEOUT))
}

/// Digits of `number`, least significant first.
pub fn digits_of(mut number: u64) -> Vec<u64> {
    let mut digits = Vec::new();
    loop {
        digits.push(number % 10);
        number /= 10;
        if number == 0 {
            break;
        }
    }
    digits
}

/// External producer sending the digits of `number` one at a time.
///
/// The channel closes once the producer task finishes.
pub fn spawn_digit_producer(number: u64) -> mpsc::Receiver<u64> {
    let (sender, receiver) = mpsc::channel(1);
    tokio::spawn(async move {
        for digit in digits_of(number) {
            if sender.send(digit).await.is_err() {
                break;
            }
        }
    });
    receiver
}

/// Words of a text, lower-cased, punctuation stripped.
pub fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}
