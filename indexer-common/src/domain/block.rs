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

use serde::{Deserialize, Serialize};

/// Sentinel address recorded for a `TxIn`/`TxOut` whose script could not be
/// decoded into an address under the configured network.
pub const NON_STANDARD_ADDRESS: &str = "NonStandard";

/// A persisted block header. `height` and `hash` together identify the row;
/// `previous_hash` links it to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: i64,
    pub hash: String,
    pub previous_hash: String,
}

/// A header fetched from the Chain Client, carrying the same three fields as
/// `Block` plus whatever extra fields the node's RPC response included. The
/// extra fields are not persisted; they exist for forward compatibility with
/// future Chain Client consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub height: i64,
    pub hash: String,
    pub previous_hash: String,
}

impl From<Header> for Block {
    fn from(header: Header) -> Self {
        Block {
            height: header.height,
            hash: header.hash,
            previous_hash: header.previous_hash,
        }
    }
}

impl From<&Block> for Header {
    fn from(block: &Block) -> Self {
        Header {
            height: block.height,
            hash: block.hash.clone(),
            previous_hash: block.previous_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub height: i64,
    pub hash: String,
    pub coin_base: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub height: i64,
    pub tx_hash: String,
    pub tx_index: i32,
    pub address: String,
    pub previous_tx_hash: String,
    pub previous_tx_index: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub height: i64,
    pub tx_hash: String,
    pub tx_index: i32,
    pub value: i64,
    pub address: String,
    pub script_pub_key: Vec<u8>,
    pub coin_base: bool,
}

/// Historical audit record for one reorg cascade. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reorg {
    pub from_height: i64,
    pub from_hash: String,
    pub to_height: i64,
    pub to_hash: String,
}

/// The one complete blocks-and-their-data batch handed to
/// `Storage::add_blocks_data` in a single transaction. The four slices are
/// index-aligned only insofar as every `Tx`/`TxIn`/`TxOut` references a
/// height present in `blocks`; there is no 1:1 positional correspondence.
#[derive(Debug, Clone, Default)]
pub struct BlocksData {
    pub blocks: Vec<Block>,
    pub txs: Vec<Tx>,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl BlocksData {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_block_convert_losslessly_over_the_shared_fields() {
        let header = Header {
            height: 42,
            hash: "h".to_owned(),
            previous_hash: "p".to_owned(),
        };
        let block: Block = header.clone().into();
        assert_eq!(block.height, header.height);
        assert_eq!(block.hash, header.hash);
        assert_eq!(block.previous_hash, header.previous_hash);

        let round_tripped: Header = (&block).into();
        assert_eq!(round_tripped, header);
    }
}
