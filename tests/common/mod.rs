//! Shared fixtures: a stand-in run service on the in-memory transport.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use runner_rpc::codec;
use runner_rpc::schema::{Run, RunList, RunRequest};
use runner_rpc::{
    // ---
    create_memory_transport_with_hub,
    Address,
    CorrelationId,
    Envelope,
    MemoryHub,
    RpcClient,
    RpcConfig,
    TransportPtr,
};

/// How the stand-in server answers.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// One reply per request.
    Reply,
    /// Never reply.
    Silent,
    /// Before each real reply, send one reply with a foreign correlation id
    /// and one with no correlation id at all.
    DecoysFirst,
    /// Collect this many requests, then reply to them newest first.
    ReverseBatch(usize),
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub correlation_id: String,
    pub reply_to: Address,
    pub user_id: i64,
}

pub struct RunServer {
    pub transport: TransportPtr,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
    task: JoinHandle<()>,
}

impl RunServer {
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub async fn shutdown(self) {
        self.transport.close().await.unwrap();
        self.task.await.expect("run server task panicked");
    }
}

/// Runs recorded for the scenario user (id 1).
pub fn scenario_runs() -> RunList {
    RunList::new(vec![Run::new(1000.0), Run::new(2500.5)])
}

/// Reply with `runs_for(user_id)` on every request arriving on `queue`.
pub async fn spawn_run_server(
    hub: Arc<MemoryHub>,
    queue: &str,
    behavior: Behavior,
    runs_for: fn(i64) -> RunList,
) -> RunServer {
    // ---
    let transport = create_memory_transport_with_hub(&RpcConfig::memory("run-server"), hub)
        .await
        .unwrap();
    let mut handle = transport.subscribe(queue.into()).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let task = {
        let transport = transport.clone();
        let seen = Arc::clone(&seen);

        tokio::spawn(async move {
            let mut batch: Vec<(SeenRequest, RunList)> = Vec::new();

            while let Some(env) = handle.inbox.recv().await {
                let request: RunRequest = codec::decode(&env.payload).unwrap();
                let req = SeenRequest {
                    correlation_id: env.correlation_id.as_deref().unwrap().to_string(),
                    reply_to: env.reply_to.clone().unwrap(),
                    user_id: request.user.id,
                };
                seen.lock().unwrap().push(req.clone());
                let runs = runs_for(req.user_id);

                match behavior {
                    Behavior::Silent => {}
                    Behavior::Reply => reply(&transport, &req, &runs).await,
                    Behavior::DecoysFirst => {
                        let decoy = SeenRequest {
                            correlation_id: CorrelationId::generate().to_string(),
                            ..req.clone()
                        };
                        reply(&transport, &decoy, &RunList::new(vec![Run::new(-1.0)])).await;

                        let mut anonymous = response_for(&req, &RunList::default());
                        anonymous.correlation_id = None;
                        transport.publish(anonymous).await.unwrap();

                        reply(&transport, &req, &runs).await;
                    }
                    Behavior::ReverseBatch(size) => {
                        batch.push((req, runs));
                        if batch.len() == size {
                            while let Some((req, runs)) = batch.pop() {
                                reply(&transport, &req, &runs).await;
                            }
                        }
                    }
                }
            }
        })
    };

    RunServer {
        transport,
        seen,
        task,
    }
}

fn response_for(req: &SeenRequest, runs: &RunList) -> Envelope {
    Envelope::response(
        req.reply_to.clone(),
        codec::encode(runs).unwrap(),
        Arc::from(req.correlation_id.as_str()),
        Arc::from(codec::CONTENT_TYPE),
    )
}

async fn reply(transport: &TransportPtr, req: &SeenRequest, runs: &RunList) {
    transport.publish(response_for(req, runs)).await.unwrap();
}

/// A client on `hub` publishing to `queue`.
pub async fn client_on(hub: Arc<MemoryHub>, queue: &str, config: RpcConfig) -> RpcClient {
    // ---
    let config = config.with_request_queue(queue);
    let transport = create_memory_transport_with_hub(&config, hub).await.unwrap();
    RpcClient::with_transport(transport, config).await.unwrap()
}

#[cfg(feature = "logging")]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init_logging() {}
