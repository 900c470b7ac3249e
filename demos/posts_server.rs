//! Posts server example
//!
//! Serves a small in-memory collection of posts over Braid-HTTP.
//!
//! Run with: cargo run --example posts_server
//!
//! ```text
//! # Watch post 1
//! curl -N -H "Subscribe: true" http://localhost:3000/post/1
//!
//! # Change its title with a one-patch PUT
//! curl -X PUT http://localhost:3000/post/1 \
//!   -H "Version: 2" -H "Parents: 1" -H "Patches: 1" \
//!   --data-binary $'Content-Length: 31\r\nContent-Type: application/json\r\n\r\n{"type":"title","value":"New!"}\r\n'
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use braid_axum_server::{BraidContext, BraidLayer, ServerConfig, Version};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

struct Post {
    version: String,
    fields: Map<String, Value>,
}

#[derive(Clone)]
struct AppState {
    posts: Arc<RwLock<HashMap<String, Post>>>,
}

impl AppState {
    fn seeded() -> Self {
        let mut posts = HashMap::new();
        for (id, title, body) in [
            ("1", "Hello World", "This is the first post"),
            ("2", "Hello World 2", "This is the second post"),
        ] {
            let mut fields = Map::new();
            fields.insert("title".into(), json!(title));
            fields.insert("body".into(), json!(body));
            let post = Post {
                version: "1".to_string(),
                fields,
            };
            posts.insert(id.to_string(), post);
        }

        AppState {
            posts: Arc::new(RwLock::new(posts)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let braid = BraidLayer::with_config(ServerConfig {
        heartbeat_interval: 30,
        ..Default::default()
    });

    let app = Router::new()
        .route("/heartbeat", get(|| async { "OK" }))
        .route("/post/{id}", get(get_post).put(put_post))
        .with_state(AppState::seeded())
        .layer(braid.middleware())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "posts server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ctx: BraidContext,
) -> Response {
    let posts = state.posts.read().await;
    let Some(post) = posts.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let current =
        Version::new(post.version.clone()).with_body(Value::Object(post.fields.clone()).to_string());
    match ctx.create_version(current) {
        Some(response) => response,
        None => match ctx.subscription_response() {
            Some(stream) => stream.into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
    }
}

async fn put_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ctx: BraidContext,
) -> Response {
    let Some(version) = ctx.version() else {
        return (StatusCode::BAD_REQUEST, "PUT requires a Version header").into_response();
    };
    let Some(patches) = version.patches.as_deref() else {
        return (StatusCode::BAD_REQUEST, "PUT requires a Patches header").into_response();
    };

    // Each patch is {"type": <field>, "value": <new value>}
    let mut edits = Vec::with_capacity(patches.len());
    for patch in patches {
        match serde_json::from_slice::<Value>(patch.content()) {
            Ok(edit) => edits.push(edit),
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    }

    {
        let mut posts = state.posts.write().await;
        let Some(post) = posts.get_mut(&id) else {
            return StatusCode::NOT_FOUND.into_response();
        };
        for edit in &edits {
            if let (Some(field), Some(value)) = (edit["type"].as_str(), edit.get("value")) {
                post.fields.insert(field.to_string(), value.clone());
            }
        }
        post.version = version.version.clone();
    }

    tracing::info!(post = %id, version = %version.version, patches = patches.len(), "applied patches");

    let delivered = ctx.advertise(version);
    tracing::debug!(post = %id, delivered, "advertised update");

    StatusCode::OK.into_response()
}
