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
    AddressWatcher, convert,
    proto::{SyncResponse, sync_response},
};
use anyhow::Context;
use persistence::Storage;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tonic::Status;

/// Heights per `Storage::blocks_data` call. A client catching up from
/// height 0 against a tall chain is served this many heights at a time
/// rather than in a single unbounded query.
const BLOCK_BATCH_SIZE: i64 = 1000;

pub(crate) async fn handle<S, W>(
    storage: &S,
    address_watcher: &W,
    from_height: i64,
    to_height: i64,
    sender: &mpsc::Sender<Result<SyncResponse, Status>>,
) -> anyhow::Result<()>
where
    S: Storage,
    W: AddressWatcher,
{
    handle_with_batch_size(storage, address_watcher, from_height, to_height, sender, BLOCK_BATCH_SIZE).await
}

async fn handle_with_batch_size<S, W>(
    storage: &S,
    address_watcher: &W,
    from_height: i64,
    to_height: i64,
    sender: &mpsc::Sender<Result<SyncResponse, Status>>,
    batch_size: i64,
) -> anyhow::Result<()>
where
    S: Storage,
    W: AddressWatcher,
{
    super::send(
        sender,
        SyncResponse {
            response: Some(sync_response::Response::BeginStream(
                sync_response::BeginStream {},
            )),
        },
    )
    .await?;

    let mut from_height = from_height;
    while from_height <= to_height {
        let target_height = from_height.saturating_add(batch_size).min(to_height);
        let addresses = address_watcher.addresses();

        let entries = storage
            .blocks_data(from_height, target_height, &addresses)
            .await
            .with_context(|| {
                format!("get blocks data, from_height {from_height}, to_height {target_height}")
            })?;
        let mut by_height = entries
            .iter()
            .map(|entry| (entry.block.height, entry))
            .collect::<HashMap<_, _>>();

        for height in from_height..=target_height {
            let entry = by_height
                .remove(&height)
                .with_context(|| format!("block missing, height {height}"))?;

            super::send(
                sender,
                SyncResponse {
                    response: Some(sync_response::Response::SyncBlock(convert::build_sync_block(
                        entry,
                    ))),
                },
            )
            .await?;
        }

        from_height = target_height + 1;
    }

    super::send(
        sender,
        SyncResponse {
            response: Some(sync_response::Response::EndStream(sync_response::EndStream {})),
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DashMapAddressWatcher;
    use indexer_common::domain::{Block, BlocksData};
    use persistence::{Error, HeightData};
    use std::{collections::HashMap as StdHashMap, sync::Mutex};

    #[derive(Clone, Default)]
    struct MockStorage {
        blocks: std::sync::Arc<Mutex<StdHashMap<i64, Block>>>,
        queried_ranges: std::sync::Arc<Mutex<Vec<(i64, i64)>>>,
    }

    impl MockStorage {
        fn seed(&self, height: i64) {
            self.blocks.lock().unwrap().insert(
                height,
                Block {
                    height,
                    hash: format!("hash-{height}"),
                    previous_hash: format!("hash-{}", height - 1),
                },
            );
        }
    }

    impl Storage for MockStorage {
        async fn latest_block(&self) -> Result<Block, Error> {
            unimplemented!()
        }

        async fn block(&self, _height: i64) -> Result<Block, Error> {
            unimplemented!()
        }

        async fn blocks(&self, _heights: &[i64]) -> Result<StdHashMap<i64, Block>, Error> {
            unimplemented!()
        }

        async fn add_blocks_data(&self, _data: &BlocksData) -> Result<(), Error> {
            unimplemented!()
        }

        async fn reorg(&self, _event: &indexer_common::domain::Reorg) -> Result<(), Error> {
            unimplemented!()
        }

        async fn blocks_data(
            &self,
            from_height: i64,
            to_height: i64,
            _addresses: &[String],
        ) -> Result<Vec<HeightData>, Error> {
            self.queried_ranges.lock().unwrap().push((from_height, to_height));
            let blocks = self.blocks.lock().unwrap();
            Ok((from_height..=to_height)
                .filter_map(|height| blocks.get(&height))
                .map(|block| HeightData {
                    block: block.clone(),
                    tx_ins: Vec::new(),
                    tx_outs: Vec::new(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn handle_sends_begin_one_block_per_height_then_end() {
        let storage = MockStorage::default();
        storage.seed(1);
        storage.seed(2);
        let watcher = DashMapAddressWatcher::default();
        let (tx, mut rx) = mpsc::channel(16);

        handle(&storage, &watcher, 1, 2, &tx).await.unwrap();
        drop(tx);

        let mut responses = Vec::new();
        while let Some(response) = rx.recv().await {
            responses.push(response.unwrap().response.unwrap());
        }

        assert!(matches!(responses[0], sync_response::Response::BeginStream(_)));
        assert!(matches!(responses[1], sync_response::Response::SyncBlock(_)));
        assert!(matches!(responses[2], sync_response::Response::SyncBlock(_)));
        assert!(matches!(responses[3], sync_response::Response::EndStream(_)));
    }

    #[tokio::test]
    async fn handle_fails_fatally_on_a_missing_height() {
        let storage = MockStorage::default();
        storage.seed(1);
        let watcher = DashMapAddressWatcher::default();
        let (tx, mut rx) = mpsc::channel(16);

        let result = handle(&storage, &watcher, 1, 2, &tx).await;
        assert!(result.is_err());
        drop(tx);

        let mut saw_sync_block = false;
        while let Some(response) = rx.recv().await {
            if let sync_response::Response::SyncBlock(_) = response.unwrap().response.unwrap() {
                saw_sync_block = true;
            }
        }
        assert!(saw_sync_block);
    }

    #[tokio::test]
    async fn handle_with_batch_size_caps_each_query_at_the_batch_boundary() {
        let storage = MockStorage::default();
        for height in 1..=5 {
            storage.seed(height);
        }
        let watcher = DashMapAddressWatcher::default();
        let (tx, mut rx) = mpsc::channel(32);

        handle_with_batch_size(&storage, &watcher, 1, 5, &tx, 2).await.unwrap();
        drop(tx);

        assert_eq!(*storage.queried_ranges.lock().unwrap(), vec![(1, 2), (3, 4), (5, 5)]);

        let mut heights = Vec::new();
        while let Some(response) = rx.recv().await {
            if let sync_response::Response::SyncBlock(block) = response.unwrap().response.unwrap() {
                heights.push(block.block.unwrap().height);
            }
        }
        assert_eq!(heights, vec![1, 2, 3, 4, 5]);
    }
}
