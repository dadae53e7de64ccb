pub mod entity;
pub mod ids;
pub mod models;
use tokio::{sync::OnceCell, task::JoinHandle};

use std::{sync::Arc, time::Duration};

use iroh::Endpoint;
use zel_core::{prelude::RpcServerBuilder, protocol::RpcClient, IrohBundle};

use crate::service::{
    comments::{CommentsClient, CommentsServer, CommentsService},
    communities::CommunitiesService,
    feed::{FeedClient, FeedServer, FeedService},
    posts::{PostsClient, PostsServer, PostsService},
    ratings::RatingsService,
    tokens::TokensService,
    users::UsersService,
};

pub mod service;

pub mod error;

pub mod config;

#[cfg(test)]
pub(crate) mod test_utils;

static RALLY_CORE: OnceCell<Arc<RallyCore>> = OnceCell::const_new();
static ALPN: &[u8] = b"rally::0.1.0";

pub async fn core() -> Arc<RallyCore> {
    RALLY_CORE
        .get_or_init(|| async move { Arc::new(RallyCore::start().await.expect("failed to init")) })
        .await
        .clone()
}

/// Main runtime handle for Rally.
pub struct RallyCore {
    pub config: config::RallyConfig,

    /// Server bundle that accepts inbound RPC traffic.
    pub server: IrohBundle,

    /// Client-side endpoint connected to the local server.
    pub client_endpoint: Endpoint,

    /// Library services used directly by the auth and HTTP layers.
    pub users: UsersService,
    pub communities: CommunitiesService,
    pub ratings: RatingsService,
    pub tokens: TokensService,

    /// Typed clients for the local server.
    pub feed: FeedClient,
    pub posts: PostsClient,
    pub comments: CommentsClient,

    token_pruner: JoinHandle<()>,
}

fn spawn_token_pruner(tokens: TokensService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(error) = tokens.prune_expired(chrono::Utc::now()).await {
                tracing::error!(%error, "failed to prune revoked tokens");
            }
        }
    })
}

impl RallyCore {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let config = config::get_or_init().await?;
        tracing::debug!(feed = ?config.feed, comments = ?config.comments, "loaded config");
        // ----------------
        // Server endpoint
        // ----------------
        let mut server_builder = IrohBundle::builder(Some(config.secret_key.clone())).await?;
        let server_endpoint = server_builder.endpoint().clone();

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let users = UsersService::new(db.clone(), config.auth.clone());
        let communities = CommunitiesService::new(db.clone());
        let ratings = RatingsService::new(db.clone());
        let tokens = TokensService::new(db.clone(), &config.auth);

        let feed_service = FeedService::new(db.clone(), config.feed.clone());
        let posts_service = PostsService::new(db.clone());
        let comments_service = CommentsService::new(db.clone(), config.comments.clone());

        // Register RPC servers
        let rpc_server_builder = RpcServerBuilder::new(ALPN, server_endpoint.clone());

        let rpc_server_builder = feed_service.register_service(rpc_server_builder);
        let rpc_server_builder = posts_service.register_service(rpc_server_builder);
        let rpc_server_builder = comments_service.register_service(rpc_server_builder);

        let rpc_server = rpc_server_builder.build();

        let server = server_builder.accept(ALPN, rpc_server).finish().await;

        server.wait_online().await;
        tracing::info!("rally server online");

        // ----------------
        // Client endpoint
        // ----------------
        let client_endpoint = Endpoint::builder()
            .secret_key(config.client_secret_key.clone())
            .alpns(vec![ALPN.to_vec()])
            .bind()
            .await?;

        client_endpoint.online().await;

        // Connect client endpoint -> server endpoint
        let conn = client_endpoint
            .connect(server.endpoint.addr(), ALPN)
            .await?;

        let feed = FeedClient::new(RpcClient::new(conn.clone()).await?);
        let posts = PostsClient::new(RpcClient::new(conn.clone()).await?);
        let comments = CommentsClient::new(RpcClient::new(conn).await?);

        let token_pruner = spawn_token_pruner(
            tokens.clone(),
            Duration::from_secs(config.auth.prune_interval_secs.max(1)),
        );

        Ok(Self {
            config,
            server,
            client_endpoint,
            users,
            communities,
            ratings,
            tokens,
            feed,
            posts,
            comments,
            token_pruner,
        })
    }

    pub async fn shutdown(self) -> Result<(), Box<dyn std::error::Error>> {
        self.token_pruner.abort();

        // Close client endpoint
        self.client_endpoint.close().await;

        // Shutdown server bundle
        self.server.shutdown(Duration::from_secs(5)).await?;
        tracing::info!("rally server stopped");
        Ok(())
    }
}

pub mod prelude {
    pub use super::ids;
    pub use super::entity;
    pub use super::models;

    pub use super::service;

    pub use super::error;

    pub use super::config;

    pub use zel_core;
}
