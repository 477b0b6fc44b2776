use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use sketch_core::sketch::{CancelToken, SolverConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod protocol;
mod session;

use protocol::{parse_command, Command, Reply};
use session::Session;

/// Server settings, read from the environment.
#[derive(Debug, Clone)]
struct Config {
    addr: SocketAddr,
    log_path: Option<PathBuf>,
    solver: SolverConfig,
}

impl Config {
    fn from_env() -> Result<Self, String> {
        let addr = match std::env::var("SKETCH_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| format!("SKETCH_ADDR '{}': {}", raw, e))?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };
        let log_path = std::env::var_os("SKETCH_LOG").map(PathBuf::from);
        let mut solver = SolverConfig::default();
        if let Ok(raw) = std::env::var("SKETCH_MAX_ITERATIONS") {
            solver.max_iterations = raw
                .parse()
                .map_err(|e| format!("SKETCH_MAX_ITERATIONS '{}': {}", raw, e))?;
        }
        Ok(Self {
            addr,
            log_path,
            solver,
        })
    }
}

// Application State
struct AppState {
    session: Arc<Mutex<Session>>,
    /// Token of the drag currently solving, if any.
    drag: std::sync::Mutex<Option<CancelToken>>,
}

impl AppState {
    /// Cancel the running drag and register a new one.
    fn start_drag(&self) -> CancelToken {
        let token = CancelToken::new();
        let mut slot = self.drag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    let session = match Session::open(config.log_path.as_deref(), config.solver.clone()) {
        Ok(session) => session,
        Err(e) => {
            warn!("Failed to open session: {}", e);
            std::process::exit(1);
        }
    };

    let shared_state = Arc::new(AppState {
        session: Arc::new(Mutex::new(session)),
        drag: std::sync::Mutex::new(None),
    });

    // build our application with a route
    let app = Router::new()
        .route("/", get(root))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state);

    info!("listening on {}", config.addr);
    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Failed to bind {}: {}", config.addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        warn!("Server error: {}", e);
    }
}

async fn root() -> &'static str {
    concat!("Sketch solver backend ", env!("CARGO_PKG_VERSION"))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Work the socket reader hands to the executor, in arrival order.
enum Job {
    Run { command: Command, cancel: CancelToken },
    Reply(Reply),
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("Client connected");
    let (mut sender, mut receiver) = socket.split();

    // Send initial sketch state
    let snapshot = state.session.lock().await.snapshot();
    if sender
        .send(Message::Text(Reply::Snapshot { snapshot }.to_text()))
        .await
        .is_err()
    {
        return;
    }

    // Commands run on their own task so the reader keeps draining frames;
    // a drag arriving mid-solve cancels the one in flight.
    let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
    let executor_state = state.clone();
    let executor = tokio::spawn(async move {
        while let Some(job) = queue.recv().await {
            let reply = match job {
                Job::Run { command, cancel } => execute(&executor_state, command, cancel).await,
                Job::Reply(reply) => reply,
            };
            if sender.send(Message::Text(reply.to_text())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        tracing::debug!("Received message: {}", text);

        if jobs.send(admit(&state, &text)).is_err() {
            break;
        }
    }
    drop(jobs);
    if let Err(e) = executor.await {
        warn!("Command executor failed: {}", e);
    }
    info!("Client disconnected");
}

/// Parse a frame into a job. A drag cancels the previous drag right away,
/// even while that one is still solving.
fn admit(state: &AppState, text: &str) -> Job {
    match parse_command(text) {
        Ok(command) => {
            let cancel = if command.is_drag() {
                state.start_drag()
            } else {
                CancelToken::new()
            };
            Job::Run { command, cancel }
        }
        Err(reply) => Job::Reply(reply),
    }
}

async fn execute(state: &AppState, command: Command, cancel: CancelToken) -> Reply {
    let mut session = state.session.clone().lock_owned().await;
    let outcome = tokio::task::spawn_blocking(move || session.execute(command, &cancel)).await;
    match outcome {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            if !e.is_informational() {
                warn!("Command failed: {}", e);
            }
            Reply::from(&e)
        }
        Err(e) => {
            warn!("Command task failed: {}", e);
            protocol::format_error("INTERNAL", &format!("Command task failed: {}", e), "error")
        }
    }
}
