/**
 * Review Routes
 * Site review CRUD and the average-rating rollup.
 */
use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Review;
use crate::routes::{db_pool, error};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub name: Option<String>,
    pub rating: i32,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewRequest {
    pub name: Option<String>,
    pub rating: Option<i32>,
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageRatingResponse {
    pub average: f64,
    pub count: i64,
}

fn valid_rating(rating: i32) -> bool {
    (1..=5).contains(&rating)
}

/// POST /api/reviews
pub async fn create_review(Json(payload): Json<CreateReviewRequest>) -> impl IntoResponse {
    if !valid_rating(payload.rating) {
        return error(StatusCode::BAD_REQUEST, "Rating must be between 1 and 5").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Review>(
        r#"
        INSERT INTO reviews (name, rating, feedback)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(payload.name.as_deref().unwrap_or("Guest User"))
    .bind(payload.rating)
    .bind(payload.feedback.as_deref().unwrap_or(""))
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(review) => (StatusCode::CREATED, Json(review)).into_response(),
        Err(e) => {
            tracing::error!("Database error creating review: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create review").into_response()
        }
    }
}

/// GET /api/reviews
pub async fn list_reviews() -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Review>("SELECT * FROM reviews ORDER BY created_at DESC")
        .fetch_all(pool.as_ref())
        .await
    {
        Ok(reviews) => (StatusCode::OK, Json(reviews)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing reviews: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch reviews").into_response()
        }
    }
}

/// GET /api/reviews/average
pub async fn average_rating() -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, (Option<f64>, i64)>(
        "SELECT AVG(rating)::float8, COUNT(*) FROM reviews",
    )
    .fetch_one(pool.as_ref())
    .await
    {
        Ok((average, count)) => (
            StatusCode::OK,
            Json(AverageRatingResponse {
                average: average.unwrap_or(0.0),
                count,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error computing average rating: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to calculate average rating",
            )
            .into_response()
        }
    }
}

/// GET /api/reviews/{id}
pub async fn get_review(Path(id): Path<Uuid>) -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(review)) => (StatusCode::OK, Json(review)).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "Review not found").into_response(),
        Err(e) => {
            tracing::error!("Database error fetching review: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// PUT /api/reviews/{id}
pub async fn update_review(
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> impl IntoResponse {
    if let Some(rating) = payload.rating {
        if !valid_rating(rating) {
            return error(StatusCode::BAD_REQUEST, "Rating must be between 1 and 5")
                .into_response();
        }
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Review>(
        r#"
        UPDATE reviews
        SET name = COALESCE($1, name),
            rating = COALESCE($2, rating),
            feedback = COALESCE($3, feedback)
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(payload.rating)
    .bind(&payload.feedback)
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(review)) => (StatusCode::OK, Json(review)).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "Review not found").into_response(),
        Err(e) => {
            tracing::error!("Database error updating review: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Update failed").into_response()
        }
    }
}

/// DELETE /api/reviews/{id}
pub async fn delete_review(Path(id): Path<Uuid>) -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            error(StatusCode::NOT_FOUND, "Review not found").into_response()
        }
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!("Database error deleting review: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Delete failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_valid_rating_bounds() {
        assert!(valid_rating(1));
        assert!(valid_rating(5));
        assert!(!valid_rating(0));
        assert!(!valid_rating(6));
        assert!(!valid_rating(-3));
    }

    #[tokio::test]
    async fn test_create_review_rejects_out_of_range_rating() {
        let app = Router::new().route("/api/reviews", post(create_review));
        let body = serde_json::to_vec(&CreateReviewRequest {
            name: None,
            rating: 9,
            feedback: Some("great".to_string()),
        })
        .unwrap();
        let req = Request::post("/api/reviews")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
