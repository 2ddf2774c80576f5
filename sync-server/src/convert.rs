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

use indexer_common::domain::{Block, TxIn, TxOut};
use persistence::HeightData;

pub(crate) fn to_proto_block(block: &Block) -> crate::proto::Block {
    crate::proto::Block {
        height: block.height,
        hash: block.hash.clone(),
        previous_hash: block.previous_hash.clone(),
    }
}

pub(crate) fn to_proto_tx_in(tx_in: &TxIn) -> crate::proto::TxIn {
    crate::proto::TxIn {
        tx_hash: tx_in.tx_hash.clone(),
        tx_index: tx_in.tx_index,
        height: tx_in.height,
        address: tx_in.address.clone(),
        previous_tx_hash: tx_in.previous_tx_hash.clone(),
        previous_tx_index: tx_in.previous_tx_index,
    }
}

pub(crate) fn to_proto_tx_out(tx_out: &TxOut) -> crate::proto::TxOut {
    crate::proto::TxOut {
        tx_hash: tx_out.tx_hash.clone(),
        tx_index: tx_out.tx_index,
        height: tx_out.height,
        value: tx_out.value,
        address: tx_out.address.clone(),
        script_pub_key: const_hex::encode(&tx_out.script_pub_key),
        coin_base: tx_out.coin_base,
    }
}

pub(crate) fn build_sync_block(entry: &HeightData) -> crate::proto::sync_response::SyncBlock {
    crate::proto::sync_response::SyncBlock {
        block: Some(to_proto_block(&entry.block)),
        tx_ins: entry.tx_ins.iter().map(to_proto_tx_in).collect(),
        tx_outs: entry.tx_outs.iter().map(to_proto_tx_out).collect(),
    }
}
