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

//! A thin JSON-RPC surface over a Bitcoin full node: header lookups by
//! height or hash, and raw block fetch. No retries -- the caller decides.

use bitcoincore_rpc::{
    Auth, RpcApi,
    bitcoin::{BlockHash as CoreBlockHash, hashes::Hash},
    jsonrpc,
};
use fastrace::trace;
use indexer_common::domain::{Header, NetworkId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// RPC error code Bitcoin Core returns for an unknown block hash.
const RPC_ERROR_BLOCK_NOT_FOUND: i32 = -5;

#[trait_variant::make(Send)]
pub trait Client
where
    Self: Clone + Send + Sync + 'static,
{
    /// Returns `{height, hash, previous_hash}` for the block at `height`.
    /// Fails with [`Error::Rpc`] if the node is unreachable or `height`
    /// exceeds the node's current tip.
    async fn header_by_height(&self, height: i64) -> Result<Header, Error>;

    /// Fails with [`Error::Rpc`] or [`Error::NotFound`].
    async fn header_by_hash(&self, hash: &str) -> Result<Header, Error>;

    /// Returns the fully deserialized block: header, transactions, and
    /// inputs/outputs with script bytes intact.
    async fn raw_block(&self, hash: &str) -> Result<bitcoin::Block, Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub network: NetworkId,
}

/// A [Client] backed by [`bitcoincore_rpc`]. The underlying client is
/// synchronous; every call is offloaded via [`tokio::task::spawn_blocking`]
/// so it behaves as a proper suspension point in the async task model.
#[derive(Clone)]
pub struct BitcoinCoreClient {
    inner: std::sync::Arc<bitcoincore_rpc::Client>,
}

impl BitcoinCoreClient {
    /// Connects to the node and verifies that its genesis hash matches
    /// `config.network`, failing construction otherwise.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let Config { host, user, pass, network } = config;

        let client = tokio::task::spawn_blocking(move || {
            bitcoincore_rpc::Client::new(&host, Auth::UserPass(user, pass))
        })
        .await
        .expect("spawn_blocking task panicked")?;

        let client = Self { inner: std::sync::Arc::new(client) };

        let genesis_hash = client.get_block_hash(0).await?;
        network
            .verify_genesis_hash(&genesis_hash)
            .map_err(Error::UnexpectedGenesisHash)?;

        Ok(client)
    }

    async fn get_block_hash(&self, height: i64) -> Result<String, Error> {
        let inner = self.inner.clone();
        let hash = tokio::task::spawn_blocking(move || inner.get_block_hash(height as u64))
            .await
            .expect("spawn_blocking task panicked")?;
        Ok(hash.to_string())
    }
}

impl Client for BitcoinCoreClient {
    #[trace]
    async fn header_by_height(&self, height: i64) -> Result<Header, Error> {
        let hash = self.get_block_hash(height).await?;
        self.header_by_hash(&hash).await
    }

    #[trace]
    async fn header_by_hash(&self, hash: &str) -> Result<Header, Error> {
        let core_hash =
            CoreBlockHash::from_str(hash).map_err(|e| Error::InvalidHash(e.to_string()))?;

        let inner = self.inner.clone();
        let info = tokio::task::spawn_blocking(move || inner.get_block_header_info(&core_hash))
            .await
            .expect("spawn_blocking task panicked")
            .map_err(classify)?;

        Ok(Header {
            height: info.height as i64,
            hash: info.hash.to_string(),
            previous_hash: info
                .previous_block_hash
                .map(|h| h.to_string())
                .unwrap_or_else(|| CoreBlockHash::all_zeros().to_string()),
        })
    }

    #[trace]
    async fn raw_block(&self, hash: &str) -> Result<bitcoin::Block, Error> {
        let core_hash =
            CoreBlockHash::from_str(hash).map_err(|e| Error::InvalidHash(e.to_string()))?;

        let inner = self.inner.clone();
        let block = tokio::task::spawn_blocking(move || inner.get_block(&core_hash))
            .await
            .expect("spawn_blocking task panicked")
            .map_err(classify)?;

        Ok(block)
    }
}

/// Maps a raw RPC error into [`Error::NotFound`] when Bitcoin Core reports
/// an unknown block hash, [`Error::Rpc`] otherwise.
fn classify(err: bitcoincore_rpc::Error) -> Error {
    match &err {
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::error::Error::Rpc(rpc))
            if rpc.code == RPC_ERROR_BLOCK_NOT_FOUND =>
        {
            Error::NotFound
        }
        _ => Error::Rpc(err),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("rpc error")]
    Rpc(#[source] bitcoincore_rpc::Error),

    #[error("not found")]
    NotFound,

    #[error("invalid block hash: {0}")]
    InvalidHash(String),

    #[error("node genesis hash does not match configured network")]
    UnexpectedGenesisHash(#[source] indexer_common::domain::UnexpectedGenesisHash),
}

impl From<bitcoincore_rpc::Error> for Error {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        classify(err)
    }
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoincore_rpc::jsonrpc::error::{Error as JsonRpcError, RpcError};

    fn rpc_error(code: i32) -> bitcoincore_rpc::Error {
        bitcoincore_rpc::Error::JsonRpc(JsonRpcError::Rpc(RpcError {
            code,
            message: "test".to_owned(),
            data: None,
        }))
    }

    #[test]
    fn classify_maps_block_not_found_code_to_not_found() {
        let err = classify(rpc_error(RPC_ERROR_BLOCK_NOT_FOUND));
        assert!(err.is_not_found());
    }

    #[test]
    fn classify_maps_other_codes_to_rpc() {
        let err = classify(rpc_error(-32600));
        assert!(!err.is_not_found());
        assert!(matches!(err, Error::Rpc(_)));
    }
}
