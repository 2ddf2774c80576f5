// This file is part of btc-indexer.
// Copyright (C) 2026 darkknightbk52
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Two independent long-lived tasks subscribing to the upstream node's
//! `rawblock` and `rawtx` ZeroMQ topics, converging on one bounded channel.
//! Ordering is preserved within a topic; there is no ordering guarantee
//! across topics.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zeromq::{Socket, SocketRecv};

/// A single notification frame: `[topic, payload, sequence_number_le_u32]`.
pub type Frame = Vec<Vec<u8>>;

const RAWBLOCK: &str = "rawblock";
const RAWTX: &str = "rawtx";

/// Output channel capacity. A backpressure knob: if the Indexer Engine
/// falls behind, producers block here rather than unboundedly buffering.
pub const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub url: String,
    pub receive_timeout_secs: u64,
    pub retry_secs: u64,
}

/// Spawns the `rawblock` and `rawtx` subscription tasks and returns the
/// receiving end of their shared channel. Cancelling `cancel` terminates
/// both tasks and drops the sender, closing the channel.
pub fn run(config: Config, cancel: CancellationToken) -> mpsc::Receiver<Frame> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(subscribe_loop(RAWBLOCK, config.clone(), tx.clone(), cancel.clone()));
    tokio::spawn(subscribe_loop(RAWTX, config, tx, cancel));

    rx
}

async fn subscribe_loop(
    topic: &'static str,
    config: Config,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) {
    let receive_timeout = Duration::from_secs(config.receive_timeout_secs);
    let retry_delay = Duration::from_secs(config.retry_secs);

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut socket = match open_subscription(&config.url, topic).await {
            Ok(socket) => socket,
            Err(err) => {
                warn!(topic, err:err = &*err; "failed to open notification subscription");
                if wait_or_cancelled(retry_delay, &cancel).await {
                    return;
                }
                continue;
            }
        };

        info!(topic; "notification subscription opened");

        loop {
            let recv = tokio::time::timeout(receive_timeout, socket.recv());

            tokio::select! {
                _ = cancel.cancelled() => return,
                result = recv => match result {
                    // Receive timeout: the topic is low-frequency, silently continue.
                    Err(_elapsed) => continue,
                    Ok(Ok(message)) => {
                        let frame: Frame = message.into_vec().into_iter().map(|b| b.to_vec()).collect();
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    Ok(Err(err)) => {
                        warn!(topic, err:err = &err as &dyn std::error::Error; "notification receive error");
                        break;
                    }
                },
            }
        }

        if wait_or_cancelled(retry_delay, &cancel).await {
            return;
        }
    }
}

/// Sleeps for `delay` unless `cancel` fires first. Returns `true` if
/// cancellation won the race.
async fn wait_or_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

async fn open_subscription(
    url: &str,
    topic: &str,
) -> Result<zeromq::SubSocket, Box<dyn std::error::Error + Send + Sync>> {
    let mut socket = zeromq::SubSocket::new();
    socket.connect(url).await?;
    socket.subscribe(topic).await?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_capacity_is_the_documented_backpressure_knob() {
        assert_eq!(CHANNEL_CAPACITY, 100);
    }
}
