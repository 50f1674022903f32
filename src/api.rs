use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::models::DowntimeInterval;
use crate::presenter::StatusBoard;

pub async fn get_status(State(board): State<StatusBoard>) -> Response {
    match board.latest() {
        Some(state) => Json(state).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no cycle completed yet").into_response(),
    }
}

pub async fn get_downtime(State(board): State<StatusBoard>) -> Json<Vec<DowntimeInterval>> {
    Json(board.downtime())
}

pub fn create_router(board: StatusBoard) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/downtime", get(get_downtime))
        .with_state(board)
}

pub async fn start_server(port: u16, board: StatusBoard) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Status API: http://localhost:{}/api/status", port);
    serve(listener, board).await
}

pub async fn serve(listener: TcpListener, board: StatusBoard) -> std::io::Result<()> {
    axum::serve(listener, create_router(board)).await
}
