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

use logforth::record::Level;
use logforth::record::LevelFilter;
use logforth::{append, layout};

/// Initializes the process-wide logger. `prod` selects structured JSON
/// (production, machine-parsed) over a human-readable text layout
/// (development). Must be called exactly once, before any other task
/// starts; logging setup is the only true process-wide global state this
/// service has.
pub fn init(prod: bool) {
    if prod {
        let append = append::Stdout::default().with_layout(layout::JsonLayout::default());
        logforth::starter_log::builder()
            .dispatch(|d| d.filter(LevelFilter::MoreSevereEqual(Level::Info)).append(append))
            .apply();
    } else {
        let append = append::Stdout::default().with_layout(layout::TextLayout::default());
        logforth::starter_log::builder()
            .dispatch(|d| d.filter(LevelFilter::MoreSevereEqual(Level::Info)).append(append))
            .apply();
    }
}
