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

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Serialize, de::DeserializeOwned};

/// Loads `T` from environment variables prefixed `IDX_`, nested fields
/// separated by `__` (e.g. `IDX_DATABASE__HOST`), layered over `defaults`.
/// Validation of the result is the caller's responsibility via a
/// `validate` method on `T` -- any failure there is fatal at startup.
pub fn load<T>(defaults: T) -> Result<T, figment::Error>
where
    T: Serialize + DeserializeOwned,
{
    Figment::new()
        .merge(Serialized::defaults(defaults))
        .merge(Env::prefixed("IDX_").split("__"))
        .extract()
}
