/**
 * Project Routes
 * Client project file uploads, stored under uploads/projects.
 */
use axum::{extract::Multipart, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routes::{db_pool, error};
use crate::storage;

const MAX_PROJECT_FILE_SIZE: usize = 25 * 1024 * 1024; // 25MB

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUploadResponse {
    pub success: bool,
    pub message: String,
    pub file_path: String,
}

/// POST /api/projects/upload - multipart name/email/file
pub async fn upload_project(mut multipart: Multipart) -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let mut name = String::new();
    let mut email = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                return error(StatusCode::BAD_REQUEST, "Invalid multipart data").into_response();
            }
        };

        match field.name().unwrap_or("") {
            "name" => name = field.text().await.unwrap_or_default(),
            "email" => email = field.text().await.unwrap_or_default(),
            "file" => {
                let original_name = field.file_name().unwrap_or("upload.bin").to_string();
                match field.bytes().await {
                    Ok(b) => file = Some((original_name, b.to_vec())),
                    Err(e) => {
                        tracing::error!("Failed to read project file: {}", e);
                        return error(StatusCode::BAD_REQUEST, "Failed to read file data")
                            .into_response();
                    }
                }
            }
            _ => {}
        }
    }

    let Some((original_name, bytes)) = file else {
        return error(StatusCode::BAD_REQUEST, "No file provided").into_response();
    };

    if bytes.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Empty file").into_response();
    }
    if bytes.len() > MAX_PROJECT_FILE_SIZE {
        return error(StatusCode::BAD_REQUEST, "File too large. Maximum size is 25MB.")
            .into_response();
    }

    // Client filenames are untrusted; keep only the extension.
    let ext = original_name
        .rsplit('.')
        .next()
        .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin")
        .to_lowercase();
    let filename = format!("{}.{}", Uuid::new_v4(), ext);

    let file_path = match storage::save_local("projects", &filename, &bytes).await {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("Failed to save project file: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file")
                .into_response();
        }
    };

    match sqlx::query("INSERT INTO projects (name, email, file_path) VALUES ($1, $2, $3)")
        .bind(name.trim())
        .bind(email.trim())
        .bind(&file_path)
        .execute(pool.as_ref())
        .await
    {
        Ok(_) => (
            StatusCode::CREATED,
            Json(ProjectUploadResponse {
                success: true,
                message: "File uploaded successfully".to_string(),
                file_path,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error saving project: {}", e);
            // The file is already on disk; remove it rather than leaving an orphan.
            storage::delete_local(&file_path).await;
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save project").into_response()
        }
    }
}
