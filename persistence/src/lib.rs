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

//! Transactional multi-table persistence: parameter-chunked bulk inserts,
//! ordered reorg cascade, and address-filtered range reads. The Persistence
//! Manager is the sole owner of the database handle.

mod postgres;

pub use postgres::PostgresStorage;

use indexer_common::domain::{Block, BlocksData, Reorg, TxIn, TxOut};
use std::collections::HashMap;

/// Hard cap on bound parameters per statement that most database drivers
/// impose; `rows_per_chunk` is derived from this per table.
pub const PARAM_LIMIT: usize = 65_535;

/// The minimum number of rows a chunk holds, computed from the column count
/// of the table being inserted into.
pub fn rows_per_chunk(column_count: usize) -> usize {
    (PARAM_LIMIT / column_count).max(1)
}

/// One height's worth of projection data, as returned by `blocks_data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightData {
    pub block: Block,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Highest-height stored block. `Err(Error::NotFound)` if the store is empty.
    async fn latest_block(&self) -> Result<Block, Error>;

    /// The block at `height`. `Err(Error::NotFound)` if absent.
    async fn block(&self, height: i64) -> Result<Block, Error>;

    /// Mapping height to block for every height in `heights` that exists;
    /// heights with no stored block are simply absent from the result.
    async fn blocks(&self, heights: &[i64]) -> Result<HashMap<i64, Block>, Error>;

    /// Commits `data` atomically: any sub-insert error aborts the whole transaction.
    async fn add_blocks_data(&self, data: &BlocksData) -> Result<(), Error>;

    /// Deletes every row with `height >= event.from_height` across
    /// `blocks`/`txes`/`tx_ins`/`tx_outs`, then inserts the audit row, atomically.
    async fn reorg(&self, event: &Reorg) -> Result<(), Error>;

    /// Blocks in `[from_height, to_height]`, plus their `tx_ins`/`tx_outs`
    /// whose `address` is in `addresses`, grouped by height ascending.
    async fn blocks_data(
        &self,
        from_height: i64,
        to_height: i64,
        addresses: &[String],
    ) -> Result<Vec<HeightData>, Error>;
}

pub use indexer_common::error::Error;
