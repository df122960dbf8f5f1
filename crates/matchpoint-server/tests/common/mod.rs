use std::net::SocketAddr;

use matchpoint_core::game::UserId;
use matchpoint_server::build_app;
use matchpoint_server::config::ServerConfig;
use matchpoint_server::state::AppState;

/// A server bound to an ephemeral port, with direct access to the app
/// state so tests can register notification channels.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (app, state) = build_app(config);
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            state,
            client: reqwest::Client::new(),
            _server: server,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// POST a JSON body as `user`.
    pub async fn post(
        &self,
        user: UserId,
        path: &str,
        body: serde_json::Value,
    ) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("x-user-id", user.to_string())
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// GET as `user`.
    pub async fn get(&self, user: UserId, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("x-user-id", user.to_string())
            .send()
            .await
            .unwrap()
    }
}

/// Decode a notification frame into (topic, payload).
pub fn decode_frame(frame: &[u8]) -> (String, serde_json::Value) {
    let value: serde_json::Value = serde_json::from_slice(frame).unwrap();
    (
        value["topic"].as_str().unwrap().to_string(),
        value["payload"].clone(),
    )
}
