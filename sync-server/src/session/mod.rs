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

mod batch;
mod sequence;

use crate::{
    AddressWatcher, Config,
    proto::{SyncRequest, SyncResponse},
};
use anyhow::{Context, anyhow};
use persistence::Storage;
use tokio::sync::mpsc;
use tonic::Status;
use tokio_util::sync::CancellationToken;

/// Sorts `request.recent_blocks` ascending, classifies it as bulk or
/// sequential, and drives the chosen handler to completion.
pub(crate) async fn dispatch<S, W>(
    config: &Config,
    storage: &S,
    address_watcher: &W,
    mut request: SyncRequest,
    sender: &mpsc::Sender<Result<SyncResponse, Status>>,
    cancel: &CancellationToken,
) -> anyhow::Result<()>
where
    S: Storage,
    W: AddressWatcher,
{
    request.recent_blocks.sort_by_key(|block| block.height);
    let recent_blocks = request.recent_blocks;

    let latest = storage.latest_block().await.context("get latest block")?;
    let most_recent_height = recent_blocks.last().map(|block| block.height).unwrap_or(0);

    if most_recent_height == 0 || most_recent_height < latest.height - config.safe_distance {
        let from = if most_recent_height == 0 { 0 } else { most_recent_height + 1 };
        let to = latest.height - config.safe_distance;
        batch::handle(storage, address_watcher, from, to, sender).await
    } else {
        sequence::handle(config, storage, address_watcher, recent_blocks, sender, cancel).await
    }
}

async fn send(
    sender: &mpsc::Sender<Result<SyncResponse, Status>>,
    response: SyncResponse,
) -> anyhow::Result<()> {
    sender
        .send(Ok(response))
        .await
        .map_err(|_| anyhow!("client disconnected"))
}
