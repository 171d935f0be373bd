use crate::error::Result;
use crate::models::{Comic, ComicRow, UpsertOutcome};
use crate::traits::MetadataStore;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        // Extract directory path from database URL
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            let path = std::path::Path::new(path.trim_start_matches("//"));
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    debug!("Creating directory: {:?}", parent);
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        info!("Database connected successfully");
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<()> {
        info!("Initializing database schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comics (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                release TEXT NOT NULL,
                genres TEXT NOT NULL,
                synopsis TEXT NOT NULL,
                rating TEXT NOT NULL,
                cover_asset_ref TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_on DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comics_slug ON comics (slug)")
            .execute(&self.pool)
            .await?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    pub async fn get_comic_by_slug(&self, slug: &str) -> Result<Option<ComicRow>> {
        let comic = sqlx::query_as::<_, ComicRow>("SELECT * FROM comics WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comic)
    }
}

#[async_trait::async_trait]
impl MetadataStore for Database {
    async fn upsert_by_slug(&self, comic: &Comic) -> Result<UpsertOutcome> {
        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM comics WHERE slug = ?")
            .bind(&comic.slug)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing {
            Some((id,)) => {
                sqlx::query("UPDATE comics SET updated_on = ? WHERE id = ?")
                    .bind(now)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
                debug!("Touched comic {}", comic.slug);
                UpsertOutcome::Touched
            }
            None => {
                let genres = serde_json::to_string(&comic.genres)?;
                sqlx::query(
                    r#"
                    INSERT INTO comics (id, slug, title, author, kind, status, release, genres, synopsis, rating, cover_asset_ref, created_at, updated_on)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(&comic.slug)
                .bind(&comic.title)
                .bind(&comic.author)
                .bind(comic.kind)
                .bind(comic.status)
                .bind(&comic.release)
                .bind(genres)
                .bind(&comic.synopsis)
                .bind(&comic.rating)
                .bind(&comic.cover_asset_ref)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                debug!("Inserted comic {}", comic.slug);
                UpsertOutcome::Inserted
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}
