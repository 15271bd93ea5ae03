use crate::config::ServerConfig;
use crate::error::FrameworkError;
use crate::http::{HttpResponse, Request};
use crate::middleware::{endpoint, MiddlewareChain, MiddlewarePlan};
use crate::routing::{RouteTable, Router};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Global middleware in front of the router
#[derive(Clone)]
pub struct Pipeline {
    chain: MiddlewareChain,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(middleware: MiddlewarePlan, routes: RouteTable) -> Self {
        Self {
            chain: middleware.into_chain(),
            router: Arc::new(Router::from_table(routes)),
        }
    }

    /// Run one request through the middleware and the router
    pub async fn handle(&self, request: Request) -> HttpResponse {
        let router = Arc::clone(&self.router);
        let response = self
            .chain
            .execute(
                request,
                endpoint(move |request| {
                    let router = Arc::clone(&router);
                    async move { router.dispatch(request).await }
                }),
            )
            .await;
        self.router.finish(response)
    }
}

pub struct Server {
    pipeline: Arc<Pipeline>,
    host: String,
    port: u16,
}

impl Server {
    pub fn new(pipeline: Pipeline) -> Self {
        let config = ServerConfig::default();
        Self {
            pipeline: Arc::new(pipeline),
            host: config.host,
            port: config.port,
        }
    }

    /// Server bound to the address in a resolved configuration
    pub fn from_config(pipeline: Pipeline, config: &ServerConfig) -> Self {
        Self::new(pipeline).host(&config.host).port(config.port)
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn get_addr(&self) -> Result<SocketAddr, FrameworkError> {
        let ip: IpAddr = match self.host.as_str() {
            "localhost" => IpAddr::from([127, 0, 0, 1]),
            host => host
                .parse()
                .map_err(|_| FrameworkError::config(format!("invalid server host '{}'", host)))?,
        };
        Ok(SocketAddr::new(ip, self.port))
    }

    pub async fn run(self) -> Result<(), FrameworkError> {
        let addr = self.get_addr()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, "trellis server listening on http://{}", addr);

        let pipeline = self.pipeline;

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let pipeline = pipeline.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                    let pipeline = pipeline.clone();
                    async move { Ok::<_, Infallible>(handle_request(pipeline, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(%peer, error = %err, "error serving connection");
                }
            });
        }
    }
}

async fn handle_request(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<hyper::body::Incoming>,
) -> hyper::Response<Full<Bytes>> {
    match Request::from_hyper(req).await {
        Ok(request) => pipeline.handle(request).await.into_hyper(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request");
            HttpResponse::from(e).status(400).into_hyper()
        }
    }
}
