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

//! One bidirectional gRPC stream per downstream client. Each inbound
//! `SyncRequest` is classified as a bulk rescan or a sequential single-block
//! push and handled to completion before the next request is read.

mod address_watcher;
mod convert;
mod grpc;
mod session;

mod proto {
    tonic::include_proto!("btc_indexer.v1");
}

pub use address_watcher::{AddressWatcher, DashMapAddressWatcher};
pub use grpc::serve;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub addr: SocketAddr,
    /// Blocks below the tip considered deep enough to rescan in bulk rather
    /// than push one at a time. Must be at least 100.
    pub safe_distance: i64,
    /// Sequential-handler polling interval, in `[3, 10]` seconds.
    pub get_block_interval_sec: u64,
}
