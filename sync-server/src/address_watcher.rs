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

use dashmap::DashSet;
use std::sync::Arc;

/// A process-wide set of addresses the Sync Server filters `tx_ins`/`tx_outs`
/// on. Queried once per batch; never cached across batches.
pub trait AddressWatcher
where
    Self: Clone + Send + Sync + 'static,
{
    fn addresses(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct DashMapAddressWatcher {
    addresses: Arc<DashSet<String>>,
}

impl DashMapAddressWatcher {
    pub fn watch(&self, address: impl Into<String>) {
        self.addresses.insert(address.into());
    }

    pub fn unwatch(&self, address: &str) {
        self.addresses.remove(address);
    }
}

impl AddressWatcher for DashMapAddressWatcher {
    fn addresses(&self) -> Vec<String> {
        self.addresses.iter().map(|entry| entry.clone()).collect()
    }
}
