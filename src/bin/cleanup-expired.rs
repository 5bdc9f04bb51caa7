//! Expired-entitlement sweep. Operator-invoked: deletes entitlements whose
//! expiry has passed, drops their progress rows, and releases the seats
//! from each affected course's enrollment counter.
//!
//! Usage: cargo run --bin cleanup-expired

use sqlx::PgPool;
use uuid::Uuid;

use academy_backend::db;

struct SweepSummary {
    users_affected: i64,
    entitlements_removed: u64,
    progress_removed: u64,
    courses_updated: usize,
}

/// One transaction: either the whole sweep lands or none of it does.
async fn sweep(pool: &PgPool) -> Result<SweepSummary, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Seats to release, counted per course before the rows disappear.
    let seats: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT course_id, COUNT(*)
        FROM course_entitlements
        WHERE expires_at <= now()
        GROUP BY course_id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?;

    let users_affected: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT user_id) FROM course_entitlements WHERE expires_at <= now()",
    )
    .fetch_one(&mut *tx)
    .await?;

    let progress_removed = sqlx::query(
        r#"
        DELETE FROM course_progress p
        USING course_entitlements e
        WHERE e.user_id = p.user_id
          AND e.course_id = p.course_id
          AND e.expires_at <= now()
        "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let entitlements_removed =
        sqlx::query("DELETE FROM course_entitlements WHERE expires_at <= now()")
            .execute(&mut *tx)
            .await?
            .rows_affected();

    // One seat per expired entitlement, floored at zero.
    for (course_id, count) in &seats {
        sqlx::query(
            r#"
            UPDATE courses
            SET students_enrolled = GREATEST(students_enrolled - $1, 0), updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(*count as i32)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(SweepSummary {
        users_affected,
        entitlements_removed,
        progress_removed,
        courses_updated: seats.len(),
    })
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    println!("Starting cleanup of expired course access...");

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    match sweep(&pool).await {
        Ok(summary) => {
            println!("Cleanup completed successfully");
            println!("Summary:");
            println!("  - Users affected        : {}", summary.users_affected);
            println!("  - Entitlements removed  : {}", summary.entitlements_removed);
            println!("  - Progress rows removed : {}", summary.progress_removed);
            println!("  - Courses updated       : {}", summary.courses_updated);
        }
        Err(e) => {
            eprintln!("Error during cleanup: {}", e);
            std::process::exit(1);
        }
    }
}
