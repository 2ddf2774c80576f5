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

//! An in-memory stand-in for a Bitcoin node: builds a linkable chain of
//! real, hashable `bitcoin::Block`s and serves them the way the Chain
//! Client's RPC surface would, without a running `bitcoind`.

use bitcoin::{
    Address, Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Witness,
    absolute::LockTime,
    block::{Header, Version},
    hashes::Hash,
    transaction,
};
use indexer_common::domain::Header as DomainHeader;
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, Mutex},
};

/// A well-known, valid testnet P2PKH address used as the payout for every
/// test block's coinbase, so address extraction has something real to do.
const PAYOUT_ADDRESS: &str = "mzBc4XEFSdzCDcTxAgf6EZXgsZWpztRhef";

#[derive(Clone, Default)]
pub struct MockClient {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    by_height: HashMap<i64, Block>,
    by_hash: HashMap<BlockHash, Block>,
}

impl MockClient {
    /// Builds and stores a new block at `height` chained onto `previous_hash`, paying its
    /// coinbase to [`PAYOUT_ADDRESS`]. Returns the raw block so the caller can encode a
    /// notification frame from it.
    pub fn mine(&self, height: i64, previous_hash: BlockHash) -> Block {
        self.mine_variant(height, previous_hash, 0)
    }

    /// Like [`Self::mine`], but `variant` perturbs the header's nonce so two blocks forked from
    /// the same parent at the same height hash differently -- needed to build a competing branch
    /// for reorg scenarios.
    pub fn mine_variant(&self, height: i64, previous_hash: BlockHash, variant: u32) -> Block {
        let block = build_block(height, previous_hash, variant);
        let mut inner = self.inner.lock().unwrap();
        inner.by_height.insert(height, block.clone());
        inner.by_hash.insert(block.block_hash(), block.clone());
        block
    }

    /// Discards every stored block at or above `height`, simulating a reorg on the node side.
    pub fn truncate(&self, height: i64) {
        let mut inner = self.inner.lock().unwrap();
        let stale_heights = inner
            .by_height
            .keys()
            .filter(|h| **h >= height)
            .copied()
            .collect::<Vec<_>>();
        for h in stale_heights {
            if let Some(block) = inner.by_height.remove(&h) {
                inner.by_hash.remove(&block.block_hash());
            }
        }
    }

    pub fn tip(&self) -> Option<Block> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_height
            .values()
            .max_by_key(|block| header_info(block).0)
            .cloned()
    }
}

impl chain_client::Client for MockClient {
    async fn header_by_height(&self, height: i64) -> Result<DomainHeader, chain_client::Error> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_height
            .get(&height)
            .map(to_domain_header)
            .ok_or(chain_client::Error::NotFound)
    }

    async fn header_by_hash(&self, hash: &str) -> Result<DomainHeader, chain_client::Error> {
        let hash = BlockHash::from_str(hash)
            .map_err(|err| chain_client::Error::InvalidHash(err.to_string()))?;
        let inner = self.inner.lock().unwrap();
        inner
            .by_hash
            .get(&hash)
            .map(to_domain_header)
            .ok_or(chain_client::Error::NotFound)
    }

    async fn raw_block(&self, hash: &str) -> Result<Block, chain_client::Error> {
        let hash = BlockHash::from_str(hash)
            .map_err(|err| chain_client::Error::InvalidHash(err.to_string()))?;
        let inner = self.inner.lock().unwrap();
        inner.by_hash.get(&hash).cloned().ok_or(chain_client::Error::NotFound)
    }
}

/// `(height, hash, previous_hash)` as derived from a block's own header: the test chain encodes
/// height into the header's `time` field since coinbase height-in-script is not worth building.
fn header_info(block: &Block) -> (i64, BlockHash, BlockHash) {
    (block.header.time as i64, block.block_hash(), block.header.prev_blockhash)
}

fn to_domain_header(block: &Block) -> DomainHeader {
    let (height, hash, previous_hash) = header_info(block);
    DomainHeader { height, hash: hash.to_string(), previous_hash: previous_hash.to_string() }
}

fn build_block(height: i64, previous_hash: BlockHash, variant: u32) -> Block {
    let payout = Address::from_str(PAYOUT_ADDRESS)
        .expect("valid testnet address")
        .assume_checked()
        .script_pubkey();

    let coinbase = Transaction {
        version: transaction::Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut { value: Amount::from_sat(5_000_000_000), script_pubkey: payout }],
    };

    Block {
        header: Header {
            version: Version::ONE,
            prev_blockhash: previous_hash,
            merkle_root: bitcoin::hash_types::TxMerkleNode::all_zeros(),
            // Smuggles the height through a field with no consensus meaning in this harness;
            // never treated as a real timestamp.
            time: height as u32,
            bits: CompactTarget::from_consensus(0),
            nonce: variant,
        },
        txdata: vec![coinbase],
    }
}
