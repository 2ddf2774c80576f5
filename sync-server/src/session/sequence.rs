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

use crate::{
    AddressWatcher, Config, convert,
    proto::{self, SyncResponse, sync_response},
};
use anyhow::{Context, bail};
use log::debug;
use persistence::Storage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Drives one client's sequential tail. If the client's view has already
/// diverged from ours, emits a reorg response and returns immediately
/// (the client is expected to reconnect with a corrected recent-blocks
/// list); otherwise polls for the next height until it appears or the
/// session is cancelled.
pub(crate) async fn handle<S, W>(
    config: &Config,
    storage: &S,
    address_watcher: &W,
    recent_blocks_ascending: Vec<proto::Block>,
    sender: &mpsc::Sender<Result<SyncResponse, Status>>,
    cancel: &CancellationToken,
) -> anyhow::Result<()>
where
    S: Storage,
    W: AddressWatcher,
{
    if let Some((branch, new)) = check_reorg(storage, &recent_blocks_ascending).await? {
        send_reorg(sender, &branch, &new).await?;
        return Ok(());
    }

    let most_recent = recent_blocks_ascending
        .last()
        .context("sequential handler invoked with no recent blocks")?
        .clone();
    let next_height = most_recent.height + 1;

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
        config.get_block_interval_sec,
    ));
    ticker.tick().await; // first tick fires immediately; consume it up front

    loop {
        match storage.block(next_height).await {
            Ok(next_block) => {
                if next_block.previous_hash == most_recent.hash {
                    process_new_block(storage, address_watcher, next_block.height, sender).await?;
                    return Ok(());
                }

                let (branch, new) = check_reorg(storage, &recent_blocks_ascending)
                    .await?
                    .context("reorg detected by hash mismatch but check_reorg found none")?;
                send_reorg(sender, &branch, &new).await?;
                return Ok(());
            }
            Err(err) if err.is_not_found() => {
                debug!(height = next_height; "next block not yet available, retrying");
            }
            Err(err) => bail!("get next block, height {next_height}: {err}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
    }
}

async fn process_new_block<S, W>(
    storage: &S,
    address_watcher: &W,
    height: i64,
    sender: &mpsc::Sender<Result<SyncResponse, Status>>,
) -> anyhow::Result<()>
where
    S: Storage,
    W: AddressWatcher,
{
    let addresses = address_watcher.addresses();
    let mut entries = storage
        .blocks_data(height, height, &addresses)
        .await
        .with_context(|| format!("get block data, height {height}"))?;
    let entry = entries
        .pop()
        .with_context(|| format!("block missing, height {height}"))?;

    super::send(
        sender,
        SyncResponse {
            response: Some(sync_response::Response::SyncBlock(convert::build_sync_block(
                &entry,
            ))),
        },
    )
    .await
}

async fn send_reorg(
    sender: &mpsc::Sender<Result<SyncResponse, Status>>,
    branch: &proto::Block,
    new: &indexer_common::domain::Block,
) -> anyhow::Result<()> {
    super::send(
        sender,
        SyncResponse {
            response: Some(sync_response::Response::ReorgBlock(sync_response::ReorgBlock {
                height: branch.height,
                old_hash: branch.hash.clone(),
                new_hash: new.hash.clone(),
            })),
        },
    )
    .await
}

/// Compares each recent block's hash against the corresponding stored
/// block; returns the first (client's stale block, our current block) pair
/// that disagrees, or `None` if the client's view still matches ours.
///
/// Returning the pair atomically keeps emission conditional on *both*
/// sides being present, rather than on an `OR` of two independently
/// nullable values.
async fn check_reorg<S>(
    storage: &S,
    recent_blocks_ascending: &[proto::Block],
) -> anyhow::Result<Option<(proto::Block, indexer_common::domain::Block)>>
where
    S: Storage,
{
    let heights = recent_blocks_ascending
        .iter()
        .map(|block| block.height)
        .collect::<Vec<_>>();
    let local_blocks = storage
        .blocks(&heights)
        .await
        .with_context(|| format!("get blocks, heights {heights:?}"))?;

    for recent_block in recent_blocks_ascending {
        let local_block = local_blocks
            .get(&recent_block.height)
            .with_context(|| format!("block missing in local store, height {}", recent_block.height))?;

        if local_block.hash != recent_block.hash {
            return Ok(Some((recent_block.clone(), local_block.clone())));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DashMapAddressWatcher;
    use indexer_common::domain::{Block, BlocksData, Reorg};
    use persistence::{Error, HeightData};
    use std::{collections::HashMap, sync::Mutex};

    #[derive(Clone, Default)]
    struct MockStorage {
        blocks: std::sync::Arc<Mutex<HashMap<i64, Block>>>,
    }

    impl MockStorage {
        fn seed(&self, height: i64, hash: &str, previous_hash: &str) {
            self.blocks.lock().unwrap().insert(
                height,
                Block { height, hash: hash.to_owned(), previous_hash: previous_hash.to_owned() },
            );
        }
    }

    impl Storage for MockStorage {
        async fn latest_block(&self) -> Result<Block, Error> {
            unimplemented!()
        }

        async fn block(&self, height: i64) -> Result<Block, Error> {
            self.blocks.lock().unwrap().get(&height).cloned().ok_or(Error::NotFound)
        }

        async fn blocks(&self, heights: &[i64]) -> Result<HashMap<i64, Block>, Error> {
            let all = self.blocks.lock().unwrap();
            Ok(heights
                .iter()
                .filter_map(|height| all.get(height).map(|block| (*height, block.clone())))
                .collect())
        }

        async fn add_blocks_data(&self, _data: &BlocksData) -> Result<(), Error> {
            unimplemented!()
        }

        async fn reorg(&self, _event: &Reorg) -> Result<(), Error> {
            unimplemented!()
        }

        async fn blocks_data(
            &self,
            from_height: i64,
            to_height: i64,
            _addresses: &[String],
        ) -> Result<Vec<HeightData>, Error> {
            let blocks = self.blocks.lock().unwrap();
            Ok((from_height..=to_height)
                .filter_map(|height| blocks.get(&height))
                .map(|block| HeightData { block: block.clone(), tx_ins: Vec::new(), tx_outs: Vec::new() })
                .collect())
        }
    }

    fn proto_block(height: i64, hash: &str) -> proto::Block {
        proto::Block { height, hash: hash.to_owned(), previous_hash: String::new() }
    }

    #[tokio::test]
    async fn check_reorg_returns_none_when_the_client_matches_local_state() {
        let storage = MockStorage::default();
        storage.seed(1, "a", "");
        storage.seed(2, "b", "a");

        let recent = vec![proto_block(1, "a"), proto_block(2, "b")];
        let result = check_reorg(&storage, &recent).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn check_reorg_returns_the_first_diverging_pair() {
        let storage = MockStorage::default();
        storage.seed(1, "a", "");
        storage.seed(2, "b-local", "a");

        let recent = vec![proto_block(1, "a"), proto_block(2, "b-client")];
        let (branch, new) = check_reorg(&storage, &recent).await.unwrap().unwrap();
        assert_eq!(branch.height, 2);
        assert_eq!(branch.hash, "b-client");
        assert_eq!(new.hash, "b-local");
    }

    #[tokio::test]
    async fn handle_emits_reorg_up_front_then_a_new_block_once_it_chains() {
        let storage = MockStorage::default();
        storage.seed(1, "a", "");
        storage.seed(2, "b-local", "a");
        storage.seed(3, "c", "b-local");
        let watcher = DashMapAddressWatcher::default();
        let config = Config { addr: "127.0.0.1:0".parse().unwrap(), safe_distance: 100, get_block_interval_sec: 3 };
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let recent = vec![proto_block(1, "a"), proto_block(2, "b-client")];
        handle(&config, &storage, &watcher, recent, &tx, &cancel).await.unwrap();
        drop(tx);

        let mut responses = Vec::new();
        while let Some(response) = rx.recv().await {
            responses.push(response.unwrap().response.unwrap());
        }

        match &responses[0] {
            sync_response::Response::ReorgBlock(reorg) => {
                assert_eq!(reorg.height, 2);
                assert_eq!(reorg.old_hash, "b-client");
                assert_eq!(reorg.new_hash, "b-local");
            }
            other => panic!("expected ReorgBlock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handle_waits_for_a_not_yet_available_height_then_sends_it() {
        let storage = MockStorage::default();
        storage.seed(1, "a", "");
        let watcher = DashMapAddressWatcher::default();
        let config = Config { addr: "127.0.0.1:0".parse().unwrap(), safe_distance: 100, get_block_interval_sec: 1 };
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let recent = vec![proto_block(1, "a")];
        let storage_clone = storage.clone();
        let handle_fut = tokio::spawn(async move {
            handle(&config, &storage_clone, &watcher, recent, &tx, &cancel).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        storage.seed(2, "b", "a");

        handle_fut.await.unwrap().unwrap();

        let mut saw_sync_block = false;
        while let Some(response) = rx.recv().await {
            if let sync_response::Response::SyncBlock(_) = response.unwrap().response.unwrap() {
                saw_sync_block = true;
            }
        }
        assert!(saw_sync_block);
    }
}
