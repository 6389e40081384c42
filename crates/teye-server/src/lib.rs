use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

pub mod admin;
pub mod error_response;
pub mod health;
pub mod middleware;
pub mod orchestrate;
pub mod pending;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

pub use state::AppState;

/// Binds `addr`, serves `routes::app_router`, and spawns the two background
/// reclamation loops the service needs: expired sessions (spec §4.4, ttl
/// sweep) and stale admin sessions. Both are best-effort; a sweep failing to
/// find anything to do is the common case, not an error.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let session_reaper_state = state.clone();
    let admin_session_reaper_state = state.clone();
    let app = routes::app_router(state);

    let session_reaper = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            let reclaimed = session_reaper_state.sessions.cleanup_stale(teye_types::now_ms()).await;
            for session_id in reclaimed {
                session_reaper_state.cancellations.cancel(&session_id).await;
                session_reaper_state.bus.close(&session_id).await;
                info!(session_id = %session_id, "reclaimed stale session");
            }
        }
    });

    let admin_session_reaper = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            admin_session_reaper_state
                .admin_sessions
                .cleanup_stale(teye_types::now_ms())
                .await;
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "teye-server listening");
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await;

    session_reaper.abort();
    admin_session_reaper.abort();
    result?;
    Ok(())
}
