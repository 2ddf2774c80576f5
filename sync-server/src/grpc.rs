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

use crate::{
    AddressWatcher, Config, session,
    proto::{
        SyncRequest, SyncResponse,
        sync_service_server::{SyncService, SyncServiceServer},
    },
};
use futures::StreamExt;
use log::{error, warn};
use tokio::{sync::mpsc, task};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tonic_reflection::server::v1::{ServerReflection, ServerReflectionServer};

const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("btc_indexer");

const RESPONSE_CHANNEL_CAPACITY: usize = 64;

pub async fn serve<S, W>(
    config: Config,
    storage: S,
    address_watcher: W,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    S: persistence::Storage,
    W: AddressWatcher,
{
    let service = SyncServiceServer::new(SyncServiceImpl { config: config.clone(), storage, address_watcher });
    let reflection = reflection_service();

    tonic::transport::Server::builder()
        .add_service(service)
        .add_service(reflection)
        .serve_with_shutdown(config.addr, cancel.cancelled())
        .await?;

    Ok(())
}

fn reflection_service() -> ServerReflectionServer<impl ServerReflection> {
    tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("v1 reflection can be built")
}

struct SyncServiceImpl<S, W> {
    config: Config,
    storage: S,
    address_watcher: W,
}

#[tonic::async_trait]
impl<S, W> SyncService for SyncServiceImpl<S, W>
where
    S: persistence::Storage,
    W: AddressWatcher,
{
    type SyncStream = ReceiverStream<Result<SyncResponse, Status>>;

    async fn sync(
        &self,
        request: Request<Streaming<SyncRequest>>,
    ) -> Result<Response<Self::SyncStream>, Status> {
        let mut inbound = request.into_inner();
        let (sender, receiver) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        task::spawn({
            let config = self.config.clone();
            let storage = self.storage.clone();
            let address_watcher = self.address_watcher.clone();
            let cancel = cancel.clone();

            async move {
                loop {
                    let request = match inbound.next().await {
                        Some(Ok(request)) => request,
                        Some(Err(err)) => {
                            warn!(err:? = err; "sync stream receive failed");
                            return;
                        }
                        None => return,
                    };

                    if let Err(err) =
                        session::dispatch(&config, &storage, &address_watcher, request, &sender, &cancel)
                            .await
                    {
                        error!(err:? = err; "sync session failed");
                        let _ = sender.send(Err(Status::internal(err.to_string()))).await;
                        return;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(receiver)))
    }
}
