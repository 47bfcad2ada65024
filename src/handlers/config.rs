use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`: the configuration the server is running with.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "limits": {
                "max_upload_bytes": config.limits.max_upload_bytes
            },
            "transcoder": {
                "ffmpeg_path": config.transcoder.ffmpeg_path,
                "work_dir": config.transcoder.work_dir,
                "preload": config.transcoder.preload
            }
        }
    })))
}
