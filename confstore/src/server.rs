use crate::config;
use crate::follower_service::ConfigFollowerSVC;
use crate::metrics;
use crate::store::ConfigStore;
use crate::wire::pb::config_follower_server::ConfigFollowerServer;
use crate::wire::pb::config_writer_server::ConfigWriterServer;
use crate::writer_service::ConfigWriterSVC;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, TextEncoder};
use serde_derive::Serialize;
use tokio::sync::Mutex;

static INSTANCE: OnceCell<Mutex<Server>> = OnceCell::new();
pub fn instance() -> &'static Mutex<Server> {
    INSTANCE.get_or_init(|| Mutex::new(Server::builder()))
}

/// Summary document served beside the metrics endpoint.
#[derive(Debug, Serialize)]
struct StoreStatus {
    current_version: i64,
    floor_version: i64,
    retained_entries: usize,
}

pub struct Server {
    store: ConfigStore,
}

impl Server {
    fn builder() -> Self {
        let data_path = config::instance().lock().unwrap().data_path.clone();
        let store = ConfigStore::open(&data_path).expect("failed to open config store");
        log::info!(
            "recovered store at version {}, floor {}",
            store.current_version(),
            store.floor_version()
        );
        Server { store }
    }

    pub fn store(&self) -> ConfigStore {
        self.store.clone()
    }

    pub async fn start(&mut self) {
        self.start_grpc_server().await;
        self.start_metrics_server().await;
    }

    pub fn stop(&mut self) {
        log::info!("server stop");
    }

    async fn start_grpc_server(&mut self) {
        let addr = config::instance()
            .lock()
            .unwrap()
            .addr
            .as_str()
            .parse()
            .unwrap();
        let mut server = tonic::transport::Server::builder();
        let follower_service = ConfigFollowerSVC::default();
        let writer_service = ConfigWriterSVC::default();
        let grpc_server = server
            .add_service(ConfigFollowerServer::new(follower_service))
            .add_service(ConfigWriterServer::new(writer_service))
            .serve(addr);
        tokio::spawn(async move {
            tokio::pin!(grpc_server);
            grpc_server.await.unwrap();
        });
        log::info!("grpc server started on {}", addr);
    }

    async fn start_metrics_server(&mut self) {
        let addr = config::instance()
            .lock()
            .unwrap()
            .metrics_addr
            .as_str()
            .parse()
            .unwrap();
        let store = self.store.clone();
        let make_svc = make_service_fn(move |_| {
            let registry = metrics::REGISTRY_INSTANCE.clone();
            let store = store.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                    let registry = registry.clone();
                    let store = store.clone();
                    async move {
                        if req.uri().path() == "/status" {
                            let status = StoreStatus {
                                current_version: store.current_version(),
                                floor_version: store.floor_version(),
                                retained_entries: store.window_len(),
                            };
                            let body = serde_json::to_vec(&status).unwrap();
                            return Ok::<_, hyper::Error>(Response::new(Body::from(body)));
                        }
                        let encoder = TextEncoder::new();
                        let metric_families = registry.gather();
                        let mut buffer = Vec::new();
                        encoder.encode(&metric_families, &mut buffer).unwrap();
                        Ok::<_, hyper::Error>(Response::new(Body::from(buffer)))
                    }
                }))
            }
        });
        metrics::init_registry();
        metrics::CURRENT_VERSION_GAUGE.set(self.store.current_version());
        metrics::FLOOR_VERSION_GAUGE.set(self.store.floor_version());
        let server = hyper::Server::bind(&addr).serve(make_svc);
        tokio::spawn(async move {
            tokio::pin!(server);
            server.await.unwrap()
        });
        log::info!("metrics server started on {}", addr);
    }
}
