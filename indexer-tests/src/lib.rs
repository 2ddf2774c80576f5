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

//! Black-box test harness: a real Postgres (via `testcontainers`), the real
//! Indexer Engine and Sync Server crates wired together, and a stubbed
//! Chain Client that serves an in-memory block chain instead of a running
//! `bitcoind`.

pub mod chain;

pub mod proto {
    tonic::include_proto!("btc_indexer.v1");
}

pub use chain::MockClient;

use bitcoin::{Block, consensus::serialize};
use tokio::sync::mpsc;

/// A single `rawblock` notification frame, matching what `notification-source`
/// would have produced from the node's ZeroMQ publisher. `indexer_engine::run`
/// takes this shape structurally (it's a type alias for `Vec<Vec<u8>>`), so no
/// direct dependency on that crate is needed here.
pub fn raw_block_frame(block: &Block) -> Vec<Vec<u8>> {
    vec![b"rawblock".to_vec(), serialize(block), 0u32.to_le_bytes().to_vec()]
}

pub async fn send_raw_block(sender: &mpsc::Sender<Vec<Vec<u8>>>, block: &Block) {
    sender
        .send(raw_block_frame(block))
        .await
        .expect("notification channel accepts the frame");
}
