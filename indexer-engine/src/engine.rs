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

use anyhow::{Context, bail};
use chain_client::Client;
use fastrace::trace;
use indexer_common::domain::{Block, Header, NetworkId, Reorg, Tx, TxIn, TxOut};
use log::{debug, info, warn};
use metrics::{Counter, counter};
use notification_source::Frame;
use persistence::Storage;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Height window fetched in one batch while catching up; mirrors the
/// upstream node's rawblock/rawtx notification pacing.
const BLOCK_BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkId,
    pub include_non_standard: bool,
    pub from_block_height: i64,
}

/// Initializes state from `storage`/`client`, then consumes `notifications`
/// until `cancel` fires or the channel closes.
pub async fn run<C, S>(
    config: Config,
    client: C,
    storage: S,
    mut notifications: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    C: Client,
    S: Storage,
{
    let mut engine = Engine::init(config, client, storage)
        .await
        .context("initialize indexer engine state")?;

    info!(
        height = engine.current_tip.height,
        hash:% = engine.current_tip.hash;
        "indexer engine caught up to current tip"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),

            frame = notifications.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = engine.sync(&frame).await {
                        warn!(err:? = err; "failed to sync notification");
                    }
                }

                None => {
                    warn!("notification channel closed");
                    return Ok(());
                }
            },
        }
    }
}

struct Engine<C, S> {
    config: Config,
    client: C,
    storage: S,
    current_tip: Block,
    blocks_indexed: Counter,
    reorgs_detected: Counter,
}

impl<C, S> Engine<C, S>
where
    C: Client,
    S: Storage,
{
    async fn init(config: Config, client: C, storage: S) -> anyhow::Result<Self> {
        let mut engine = Self {
            config,
            client,
            storage,
            current_tip: Block {
                height: -1,
                hash: String::new(),
                previous_hash: String::new(),
            },
            blocks_indexed: counter!("btc_indexer_blocks_indexed"),
            reorgs_detected: counter!("btc_indexer_reorgs_detected"),
        };

        match engine.storage.latest_block().await {
            Ok(block) => {
                if block.height < engine.config.from_block_height {
                    bail!(
                        "stored tip height {} is below configured from_block_height {}",
                        block.height,
                        engine.config.from_block_height
                    );
                }

                engine.current_tip = block;
            }

            Err(err) if err.is_not_found() => {
                let header = engine
                    .client
                    .header_by_height(engine.config.from_block_height)
                    .await
                    .context("get initial header")?;
                let highest = engine
                    .add_blocks(&[header])
                    .await
                    .context("add initial block")?;
                engine.current_tip = highest.into();
            }

            Err(err) => return Err(err).context("get latest block"),
        }

        Ok(engine)
    }

    /// Dispatches on the notification topic. `rawtx` carries no information
    /// the Storage schema needs beyond what the owning block already
    /// supplies, so it is deliberately dropped. Anything outside the known
    /// topics is ignored unless it looks like garbage from a node shutting
    /// down mid-message.
    async fn sync(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let topic = frame.first().map(Vec::as_slice).unwrap_or_default();

        match topic {
            b"rawblock" => {
                let payload = frame.get(1).context("rawblock notification missing payload")?;
                let raw_block: bitcoin::Block = bitcoin::consensus::deserialize(payload)
                    .context("deserialize raw block")?;
                self.sync_block(&raw_block).await
            }

            b"rawtx" => Ok(()),

            _ => {
                if topic.is_empty() || topic.is_ascii() {
                    Ok(())
                } else {
                    bail!("unexpected notification topic");
                }
            }
        }
    }

    #[trace]
    async fn sync_block(&mut self, raw_block: &bitcoin::Block) -> anyhow::Result<()> {
        let hash = raw_block.block_hash().to_string();
        let target = self
            .client
            .header_by_hash(&hash)
            .await
            .with_context(|| format!("get header by hash '{hash}'"))?;
        let target_height = target.height;

        while self.current_tip.height < target_height {
            let mut next_header = target.clone();

            if target_height - self.current_tip.height > BLOCK_BATCH_SIZE {
                let next_height = self.current_tip.height + BLOCK_BATCH_SIZE;
                next_header = self
                    .client
                    .header_by_height(next_height)
                    .await
                    .with_context(|| format!("get header at height '{next_height}'"))?;
            }

            let advanced_to = next_header.height;
            let header = self
                .sync_block_maybe_reorg(next_header)
                .await
                .with_context(|| format!("sync block maybe reorg, to height '{advanced_to}'"))?;

            if let Some(header) = header {
                self.current_tip = header.into();
            }
        }

        Ok(())
    }

    /// Walks backward from `header` until the chain it describes joins the
    /// stored chain at the current tip, or until a branch point is found and
    /// a reorg is recorded. Returns the new tip header on success, or `None`
    /// if `header` described a block at or behind the current tip.
    #[trace]
    async fn sync_block_maybe_reorg(&mut self, header: Header) -> anyhow::Result<Option<Header>> {
        if self.current_tip.height >= header.height {
            return Ok(None);
        }

        if self.current_tip.height == header.height - 1
            && self.current_tip.hash == header.previous_hash
        {
            let highest = self
                .add_blocks(&[header])
                .await
                .context("add a new block")?;
            return Ok(Some(highest));
        }

        let mut reorg = Reorg {
            from_height: self.current_tip.height,
            from_hash: self.current_tip.hash.clone(),
            to_height: self.current_tip.height,
            to_hash: self.current_tip.hash.clone(),
        };
        let mut headers = vec![header.clone()];
        let mut header = header;
        let mut reorg_needed = true;

        loop {
            if self.current_tip.height == header.height - 1
                && self.current_tip.hash == header.previous_hash
            {
                reorg_needed = false;
                break;
            }

            if self.current_tip.height > header.height - 1 {
                let block = match self.storage.block(header.height - 1).await {
                    Ok(block) => block,
                    Err(err) if err.is_not_found() => {
                        warn!(
                            height = header.height - 1;
                            "reorg examining: block not found in store"
                        );
                        break;
                    }
                    Err(err) => return Err(err).context("reorg examining: get block"),
                };

                if block.hash == header.previous_hash {
                    break;
                }

                reorg.from_height = block.height;
                reorg.from_hash = block.hash;
            }

            let previous_hash = header.previous_hash.clone();
            header = self
                .client
                .header_by_hash(&previous_hash)
                .await
                .with_context(|| format!("reorg examining: get header by hash '{previous_hash}'"))?;
            headers.push(header.clone());
        }

        if !reorg_needed {
            let highest = self
                .add_blocks(&headers)
                .await
                .with_context(|| format!("add new blocks, count '{}'", headers.len()))?;
            return Ok(Some(highest));
        }

        info!(reorg:? = reorg; "reorg detected");
        self.storage.reorg(&reorg).await.context("apply reorg")?;
        self.reorgs_detected.increment(1);

        let next = self
            .client
            .header_by_hash(&header.previous_hash)
            .await
            .with_context(|| {
                format!("get header after reorg by hash '{}'", header.previous_hash)
            })?;

        Ok(Some(next))
    }

    async fn add_blocks(&mut self, headers: &[Header]) -> anyhow::Result<Header> {
        let data = self
            .build_blocks_data(headers)
            .await
            .context("build blocks data")?;

        self.storage
            .add_blocks_data(&data)
            .await
            .context("add blocks data")?;
        self.blocks_indexed.increment(headers.len() as u64);

        Ok(headers[0].clone())
    }

    async fn build_blocks_data(
        &self,
        headers: &[Header],
    ) -> anyhow::Result<indexer_common::domain::BlocksData> {
        let mut blocks = Vec::with_capacity(headers.len());
        let mut raw_blocks = Vec::with_capacity(headers.len());

        for header in headers {
            let raw_block = self
                .client
                .raw_block(&header.hash)
                .await
                .with_context(|| format!("get raw block, hash '{}'", header.hash))?;
            blocks.push(Block::from(header.clone()));
            raw_blocks.push((header.height, raw_block));
        }

        let network = self.config.network.into();
        let mut txs = Vec::new();
        let mut tx_ins = Vec::new();
        let mut tx_outs = Vec::new();

        for (height, raw_block) in &raw_blocks {
            for tx in &raw_block.txdata {
                let is_coin_base = tx.is_coinbase();
                let hash = tx.compute_txid().to_string();

                txs.push(Tx {
                    height: *height,
                    hash: hash.clone(),
                    coin_base: is_coin_base,
                });

                let (ins, outs) = build_tx_data(
                    *height,
                    &hash,
                    tx,
                    is_coin_base,
                    network,
                    self.config.include_non_standard,
                );
                tx_ins.extend(ins);
                tx_outs.extend(outs);
            }
        }

        Ok(indexer_common::domain::BlocksData { blocks, txs, tx_ins, tx_outs })
    }
}

/// Builds the `tx_ins`/`tx_outs` rows for one transaction. `TxIn` rows are
/// always kept, even when address extraction fails -- the spent outpoint is
/// the important part. A `TxOut` whose address could not be resolved is
/// dropped unless `include_non_standard` is set.
fn build_tx_data(
    height: i64,
    tx_hash: &str,
    tx: &bitcoin::Transaction,
    is_coin_base: bool,
    network: bitcoin::Network,
    include_non_standard: bool,
) -> (Vec<TxIn>, Vec<TxOut>) {
    let mut tx_ins = Vec::with_capacity(tx.input.len());

    for (index, input) in tx.input.iter().enumerate() {
        let witness = input.witness.iter().map(<[u8]>::to_vec).collect::<Vec<_>>();
        let address = address_extractor::extract_from_tx_in(
            input.script_sig.as_bytes(),
            &witness,
            network,
        );

        tx_ins.push(TxIn {
            height,
            tx_hash: tx_hash.to_owned(),
            tx_index: index as i32,
            address,
            previous_tx_hash: input.previous_output.txid.to_string(),
            previous_tx_index: input.previous_output.vout as i32,
        });
    }

    let mut tx_outs = Vec::with_capacity(tx.output.len());

    for (index, output) in tx.output.iter().enumerate() {
        let pk_script = output.script_pubkey.as_bytes();
        let address = address_extractor::extract_from_tx_out(pk_script, network);

        if address == indexer_common::domain::NON_STANDARD_ADDRESS && !include_non_standard {
            debug!(tx_hash, tx_out_index = index; "ignoring non-standard tx_out");
            continue;
        }

        tx_outs.push(TxOut {
            height,
            tx_hash: tx_hash.to_owned(),
            tx_index: index as i32,
            value: output.value.to_sat() as i64,
            address,
            script_pub_key: pk_script.to_vec(),
            coin_base: is_coin_base,
        });
    }

    (tx_ins, tx_outs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use indexer_common::domain::BlocksData;
    use std::{collections::HashMap, sync::Mutex};

    #[derive(Clone, Default)]
    struct MockClient {
        headers_by_height: std::sync::Arc<Mutex<HashMap<i64, Header>>>,
        headers_by_hash: std::sync::Arc<Mutex<HashMap<String, Header>>>,
    }

    impl MockClient {
        fn with_chain(headers: Vec<Header>) -> Self {
            let client = Self::default();
            for header in headers {
                client
                    .headers_by_height
                    .lock()
                    .unwrap()
                    .insert(header.height, header.clone());
                client
                    .headers_by_hash
                    .lock()
                    .unwrap()
                    .insert(header.hash.clone(), header);
            }
            client
        }
    }

    impl Client for MockClient {
        async fn header_by_height(&self, height: i64) -> Result<Header, chain_client::Error> {
            self.headers_by_height
                .lock()
                .unwrap()
                .get(&height)
                .cloned()
                .ok_or(chain_client::Error::NotFound)
        }

        async fn header_by_hash(&self, hash: &str) -> Result<Header, chain_client::Error> {
            self.headers_by_hash
                .lock()
                .unwrap()
                .get(hash)
                .cloned()
                .ok_or(chain_client::Error::NotFound)
        }

        async fn raw_block(&self, hash: &str) -> Result<bitcoin::Block, chain_client::Error> {
            let header = self
                .headers_by_hash
                .lock()
                .unwrap()
                .get(hash)
                .cloned()
                .ok_or(chain_client::Error::NotFound)?;
            Ok(empty_block(&header))
        }
    }

    #[derive(Clone, Default)]
    struct MockStorage {
        blocks: std::sync::Arc<Mutex<HashMap<i64, Block>>>,
        reorgs: std::sync::Arc<Mutex<Vec<Reorg>>>,
    }

    impl Storage for MockStorage {
        async fn latest_block(&self) -> Result<Block, indexer_common::error::Error> {
            self.blocks
                .lock()
                .unwrap()
                .values()
                .max_by_key(|block| block.height)
                .cloned()
                .ok_or(indexer_common::error::Error::NotFound)
        }

        async fn block(&self, height: i64) -> Result<Block, indexer_common::error::Error> {
            self.blocks
                .lock()
                .unwrap()
                .get(&height)
                .cloned()
                .ok_or(indexer_common::error::Error::NotFound)
        }

        async fn blocks(
            &self,
            heights: &[i64],
        ) -> Result<HashMap<i64, Block>, indexer_common::error::Error> {
            let all = self.blocks.lock().unwrap();
            Ok(heights
                .iter()
                .filter_map(|height| all.get(height).map(|block| (*height, block.clone())))
                .collect())
        }

        async fn add_blocks_data(
            &self,
            data: &BlocksData,
        ) -> Result<(), indexer_common::error::Error> {
            let mut blocks = self.blocks.lock().unwrap();
            for block in &data.blocks {
                blocks.insert(block.height, block.clone());
            }
            Ok(())
        }

        async fn reorg(&self, event: &Reorg) -> Result<(), indexer_common::error::Error> {
            let mut blocks = self.blocks.lock().unwrap();
            blocks.retain(|height, _| *height < event.from_height);
            self.reorgs.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn blocks_data(
            &self,
            _from_height: i64,
            _to_height: i64,
            _addresses: &[String],
        ) -> Result<Vec<persistence::HeightData>, indexer_common::error::Error> {
            Ok(Vec::new())
        }
    }

    fn header(height: i64, hash: &str, previous_hash: &str) -> Header {
        Header { height, hash: hash.to_owned(), previous_hash: previous_hash.to_owned() }
    }

    fn empty_block(_header: &Header) -> bitcoin::Block {
        use bitcoin::{
            Block as BBlock,
            block::{Header as BHeader, Version},
            hashes::Hash,
        };

        BBlock {
            header: BHeader {
                version: Version::ONE,
                prev_blockhash: bitcoin::BlockHash::all_zeros(),
                merkle_root: bitcoin::hash_types::TxMerkleNode::all_zeros(),
                time: 0,
                bits: bitcoin::CompactTarget::from_consensus(0),
                nonce: 0,
            },
            txdata: Vec::new(),
        }
    }

    fn pad_hash(hash: &str) -> String {
        format!("{hash:0>64}")
    }

    fn config() -> Config {
        Config { network: NetworkId::TestNet3, include_non_standard: true, from_block_height: 0 }
    }

    #[tokio::test]
    async fn init_bootstraps_from_an_empty_store_at_the_configured_height() {
        let genesis = header(0, &pad_hash("a"), &pad_hash(""));
        let client = MockClient::with_chain(vec![genesis.clone()]);
        let storage = MockStorage::default();

        let engine = Engine::init(config(), client, storage).await.unwrap();

        assert_eq!(engine.current_tip.height, 0);
        assert_eq!(engine.current_tip.hash, genesis.hash);
    }

    #[tokio::test]
    async fn init_fails_when_the_stored_tip_is_behind_the_configured_start_height() {
        let storage = MockStorage::default();
        storage
            .blocks
            .lock()
            .unwrap()
            .insert(5, Block { height: 5, hash: pad_hash("e"), previous_hash: pad_hash("d") });
        let client = MockClient::default();

        let mut cfg = config();
        cfg.from_block_height = 10;

        let result = Engine::init(cfg, client, storage).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sync_block_maybe_reorg_extends_the_chain_on_a_direct_child() {
        let genesis = header(0, &pad_hash("a"), &pad_hash(""));
        let next = header(1, &pad_hash("b"), &pad_hash("a"));
        let client = MockClient::with_chain(vec![genesis.clone(), next.clone()]);
        let storage = MockStorage::default();
        storage.blocks.lock().unwrap().insert(0, Block::from(genesis.clone()));

        let mut engine = Engine { config: config(), client, storage, current_tip: genesis.into(), blocks_indexed: counter!("test_blocks_indexed"), reorgs_detected: counter!("test_reorgs_detected") };

        let result = engine.sync_block_maybe_reorg(next.clone()).await.unwrap();
        assert_matches!(result, Some(h) if h.height == 1);
    }

    #[tokio::test]
    async fn sync_block_maybe_reorg_ignores_a_header_at_or_behind_the_current_tip() {
        let genesis = header(0, &pad_hash("a"), &pad_hash(""));
        let client = MockClient::with_chain(vec![genesis.clone()]);
        let storage = MockStorage::default();

        let mut engine =
            Engine { config: config(), client, storage, current_tip: genesis.clone().into(), blocks_indexed: counter!("test_blocks_indexed"), reorgs_detected: counter!("test_reorgs_detected") };

        let result = engine.sync_block_maybe_reorg(genesis).await.unwrap();
        assert_matches!(result, None);
    }

    #[tokio::test]
    async fn sync_block_maybe_reorg_detects_and_applies_a_branch() {
        let genesis = header(0, &pad_hash("a"), &pad_hash(""));
        let stale = header(1, &pad_hash("b"), &pad_hash("a"));
        let fork_parent = header(1, &pad_hash("c"), &pad_hash("a"));
        let fork_tip = header(2, &pad_hash("d"), &pad_hash("c"));

        let client =
            MockClient::with_chain(vec![genesis.clone(), fork_parent.clone(), fork_tip.clone()]);
        let storage = MockStorage::default();
        storage.blocks.lock().unwrap().insert(0, Block::from(genesis.clone()));
        storage.blocks.lock().unwrap().insert(1, Block::from(stale.clone()));

        let mut engine =
            Engine { config: config(), client, storage, current_tip: stale.clone().into(), blocks_indexed: counter!("test_blocks_indexed"), reorgs_detected: counter!("test_reorgs_detected") };

        let result = engine.sync_block_maybe_reorg(fork_tip).await.unwrap();
        assert_matches!(result, Some(h) if h.height == 0 && h.hash == genesis.hash);

        let reorgs = engine.storage.reorgs.lock().unwrap();
        assert_eq!(reorgs.len(), 1);
        assert_eq!(reorgs[0].from_height, 1);
        assert_eq!(reorgs[0].from_hash, stale.hash);
    }
}
