use std::sync::Arc;

use vesper_protocol::frames::ResFrame;

use crate::app::AppState;
use crate::ws::handlers;
use crate::ws::message::WsSink;

/// Route a WS method call to the correct handler.
///
/// `_tx` is threaded through for methods that will want to send intermediate
/// events (streaming terminal output, progress ticks) rather than a single
/// reply; none of the current handlers need it yet.
pub async fn route(
    method: &str,
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &Arc<AppState>,
    _tx: &mut WsSink,
) -> ResFrame {
    match method {
        "ping" => ResFrame::ok(req_id, serde_json::json!({ "pong": true })),

        "agent.status" => {
            let model = app.agent.get_model().await;
            let provider = app.agent.provider().name();
            ResFrame::ok(
                req_id,
                serde_json::json!({
                    "agents": [{
                        "id": "main",
                        "model": model,
                        "provider": provider,
                        "status": "idle"
                    }]
                }),
            )
        }

        "sessions.list" => handlers::handle_sessions_list(params, req_id, app).await,
        "sessions.get" => handlers::handle_sessions_get(params, req_id, app).await,

        "memory.search" => handlers::handle_memory_search(params, req_id, app).await,
        "memory.learn" => handlers::handle_memory_learn(params, req_id, app).await,
        "memory.forget" => handlers::handle_memory_forget(params, req_id, app).await,

        "cron.list" => handlers::handle_cron_list(req_id, app).await,
        "cron.add" => handlers::handle_cron_add(params, req_id, app).await,
        "cron.remove" => handlers::handle_cron_remove(params, req_id, app).await,

        "terminal.exec" => handlers::handle_terminal_exec(params, req_id, app).await,
        "terminal.create" => handlers::handle_terminal_create(params, req_id, app).await,
        "terminal.write" => handlers::handle_terminal_write(params, req_id, app).await,
        "terminal.read" => handlers::handle_terminal_read(params, req_id, app).await,
        "terminal.kill" => handlers::handle_terminal_kill(params, req_id, app).await,
        "terminal.list" => handlers::handle_terminal_list(req_id, app).await,
        "terminal.exec_bg" => handlers::handle_terminal_exec_bg(params, req_id, app).await,
        "terminal.job_status" => handlers::handle_terminal_job_status(params, req_id, app).await,
        "terminal.job_list" => handlers::handle_terminal_job_list(req_id, app).await,
        "terminal.job_kill" => handlers::handle_terminal_job_kill(params, req_id, app).await,

        _ => ResFrame::err(
            req_id,
            "METHOD_NOT_FOUND",
            &format!("method '{}' not yet implemented", method),
        ),
    }
}
