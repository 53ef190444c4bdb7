use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use crate::conn::Conn;
use crate::options::Options;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::transport::{polling, send, streaming, websocket};

type AppHandler = dyn Fn(Conn) -> BoxFuture<'static, ()> + Send + Sync;

/// Owns the session registry and the application callback, and builds the
/// axum routes for every transport.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    options: Options,
    registry: SessionRegistry,
    app: Box<AppHandler>,
}

impl Handler {
    /// `app` runs once per session, on its own task, after the first
    /// transport has attached.
    pub fn new<F, Fut>(options: Options, app: F) -> Self
    where
        F: Fn(Conn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let registry = SessionRegistry::new(options.heartbeat_delay, options.disconnect_delay);
        Self {
            inner: Arc::new(HandlerInner {
                options,
                registry,
                app: Box::new(move |conn| Box::pin(app(conn))),
            }),
        }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub(crate) fn start(&self, session: &Arc<Session>) {
        debug!(session = %session.id(), "starting application handler");
        let run = (self.inner.app)(Conn::new(Arc::clone(session)));
        tokio::spawn(run);
    }

    /// Routes relative to the endpoint prefix; nest the result under it.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/", get(greeting))
            .route("/info", get(info))
            .route("/:server/:session/xhr", post(polling::xhr))
            .route("/:server/:session/jsonp", get(polling::jsonp))
            .route("/:server/:session/xhr_send", post(send::xhr_send))
            .route("/:server/:session/jsonp_send", post(send::jsonp_send))
            .route("/:server/:session/xhr_streaming", post(streaming::xhr_streaming))
            .route("/:server/:session/eventsource", get(streaming::eventsource))
            .route("/:server/:session/htmlfile", get(streaming::htmlfile));
        if self.options().websocket {
            router = router.route("/:server/:session/websocket", get(websocket::websocket));
        }
        router.with_state(self.clone())
    }
}

async fn greeting() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        "Welcome to SockJS!\n",
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    websocket: bool,
    cookie_needed: bool,
    origins: Vec<&'static str>,
    entropy: u32,
}

async fn info(State(handler): State<Handler>) -> Response {
    let body = InfoResponse {
        websocket: handler.options().websocket,
        cookie_needed: false,
        origins: vec!["*:*"],
        entropy: rand::random(),
    };
    (
        [(
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, max-age=0",
        )],
        Json(body),
    )
        .into_response()
}
