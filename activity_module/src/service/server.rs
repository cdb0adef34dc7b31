use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info};

use crate::scheduler::{IngestMailTask, ModuleExecutor, Scheduler, TaskKind};
use crate::store::ProjectStore;

use super::config::ServiceConfig;
use super::state::AppState;
use super::BoxError;

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);

    // Make sure the record stores exist before anything else touches them.
    let _ = ProjectStore::new(&config.project_db_path)?;
    let _ = mailbox_module::MailboxStore::new(&config.mailbox_db_path)?;

    let mut scheduler = Scheduler::load(&config.scheduler_db_path, ModuleExecutor)?;
    if !scheduler.has_enabled_ingest_task() {
        let task_id = scheduler.add_cron_task(
            &config.ingest_cron,
            TaskKind::IngestMail(IngestMailTask {
                project_db_path: config.project_db_path.clone(),
                mailbox_db_path: config.mailbox_db_path.clone(),
            }),
        )?;
        info!("registered mail ingestion task {}", task_id);
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let scheduler_stop = stop_flag.clone();
    let poll_interval = config.scheduler_poll_interval;
    let scheduler_handle = std::thread::spawn(move || {
        scheduler.run_loop(poll_interval, &scheduler_stop);
    });

    let state = AppState {
        config: config.clone(),
    };
    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/:database/ir/attachment/:id", get(download_attachment))
        .with_state(state);

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("activity service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    stop_flag.store(true, Ordering::Relaxed);
    if scheduler_handle.join().is_err() {
        error!("scheduler thread panicked");
    }
    serve_result?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /{database}/ir/attachment/{id}
///
/// Raw attachment bytes with the MIME type inferred from the name. 404
/// for an unknown database segment or attachment id.
async fn download_attachment(
    State(state): State<AppState>,
    Path((database, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(expected) = state.config.api_token.as_deref() {
        let authorized = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token == expected)
            .unwrap_or(false);
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    if database != state.config.database_name {
        return StatusCode::NOT_FOUND.into_response();
    }
    let id: i64 = match id.parse() {
        Ok(value) => value,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let store = match ProjectStore::new(&state.config.project_db_path) {
        Ok(store) => store,
        Err(err) => {
            error!("failed to open project store: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match store.attachment(id) {
        Ok(Some(attachment)) => {
            let mime = mime_guess::from_path(&attachment.name).first_or_octet_stream();
            let disposition = format!(
                "attachment; filename*=UTF-8''{}",
                urlencoding::encode(&attachment.name)
            );
            (
                StatusCode::OK,
                [
                    (CONTENT_TYPE, mime.essence_str().to_string()),
                    (CONTENT_LENGTH, attachment.data.len().to_string()),
                    (CONTENT_DISPOSITION, disposition),
                ],
                attachment.data,
            )
                .into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("failed to read attachment {}: {}", id, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
