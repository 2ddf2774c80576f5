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

mod config;

use anyhow::Context;
use chain_client::BitcoinCoreClient;
use clap::Parser;
use config::Config;
use log::{error, info};
use metrics_exporter_prometheus::PrometheusBuilder;
use persistence::PostgresStorage;
use secrecy::ExposeSecret;
use std::panic;
use sync_server::DashMapAddressWatcher;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
struct Args {
    /// Emits structured JSON logs suitable for production log collection.
    #[arg(long)]
    prod: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    indexer_common::logging::init(args.prod);
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(err) = run().await {
        error!(err:? = err; "process exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = indexer_common::config::load(Config::defaults()).context("load configuration")?;
    info!(config:?; "starting btc-indexer");

    let Config {
        database_url,
        chain_client,
        notification_source,
        indexer_engine,
        sync_server,
        metrics_addr,
    } = config;

    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("install Prometheus metrics exporter")?;

    let mut sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;
    let cancel = CancellationToken::new();

    let client = BitcoinCoreClient::new(chain_client)
        .await
        .context("connect to Bitcoin node")?;
    let storage = PostgresStorage::connect(database_url.expose_secret())
        .await
        .context("connect to Postgres and run migrations")?;
    let address_watcher = DashMapAddressWatcher::default();

    let notifications = notification_source::run(notification_source, cancel.clone());

    let engine_task = tokio::spawn(indexer_engine::run(
        indexer_engine,
        client,
        storage.clone(),
        notifications,
        cancel.clone(),
    ));
    let sync_server_task =
        tokio::spawn(sync_server::serve(sync_server, storage, address_watcher, cancel.clone()));

    // Handle task completion or SIGTERM termination. "Successful" completion of either task is
    // unexpected, hence the error context below.
    tokio::select! {
        result = engine_task => result
            .context("indexer engine task panicked")
            .and_then(|r| r.context("indexer engine task failed")),

        result = sync_server_task => result
            .context("sync server task panicked")
            .and_then(|r| r.context("sync server task failed")),

        _ = sigterm.recv() => {
            info!("SIGTERM received");
            cancel.cancel();
            Ok(())
        }
    }
}
