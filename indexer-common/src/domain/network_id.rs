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

use bitcoin::constants::genesis_block;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// The two networks this indexer is configured to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum NetworkId {
    MainNet,
    TestNet3,
}

impl NetworkId {
    /// The genesis block hash expected from a node on this network, as lowercase hex.
    pub fn genesis_hash(self) -> String {
        genesis_block(bitcoin::Network::from(self))
            .block_hash()
            .to_string()
    }

    /// Verifies that `hash`, as reported by a connected node, matches this network's genesis
    /// block. Called once by the Chain Client at construction time.
    pub fn verify_genesis_hash(self, hash: &str) -> Result<(), UnexpectedGenesisHash> {
        let expected = self.genesis_hash();
        if hash.eq_ignore_ascii_case(&expected) {
            Ok(())
        } else {
            Err(UnexpectedGenesisHash {
                network: self,
                expected,
                actual: hash.to_owned(),
            })
        }
    }
}

impl From<NetworkId> for bitcoin::Network {
    fn from(network: NetworkId) -> Self {
        match network {
            NetworkId::MainNet => bitcoin::Network::Bitcoin,
            NetworkId::TestNet3 => bitcoin::Network::Testnet,
        }
    }
}

impl FromStr for NetworkId {
    type Err = ParseNetworkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MainNet" => Ok(Self::MainNet),
            "TestNet3" => Ok(Self::TestNet3),
            other => Err(ParseNetworkIdError(other.to_owned())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unsupported network {0}; expected MainNet or TestNet3")]
pub struct ParseNetworkIdError(String);

#[derive(Debug, Error)]
#[error("node genesis hash {actual} does not match {network}'s expected genesis hash {expected}")]
pub struct UnexpectedGenesisHash {
    pub network: NetworkId,
    pub expected: String,
    pub actual: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn mainnet_genesis_hash_is_the_well_known_constant() {
        assert_eq!(
            NetworkId::MainNet.genesis_hash(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn verify_genesis_hash_rejects_a_mismatch() {
        let result = NetworkId::MainNet.verify_genesis_hash("not-a-real-hash");
        assert_matches!(result, Err(UnexpectedGenesisHash { .. }));
    }

    #[test]
    fn from_str_round_trips_the_display_form() {
        assert_eq!(
            "MainNet".parse::<NetworkId>().unwrap(),
            NetworkId::MainNet
        );
        assert_eq!(
            "TestNet3".parse::<NetworkId>().unwrap(),
            NetworkId::TestNet3
        );
        assert!("Regtest".parse::<NetworkId>().is_err());
    }
}
