//! PostgreSQL resource database.

use async_trait::async_trait;
use chrono_tz::Tz;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::Database;
use crate::config::DatabaseConfig;
use crate::error::{ErrorCode, Result, SkyreelError};
use crate::resource::{CaptureFormat, CollectionSpan, Resource, ResourceId, ResourceKind};

/// Resource database backed by the `resources` table.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Create a new connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SkyreelError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn list_resources(&self) -> Result<Vec<Resource>> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT resource_number, name, active, resource_type, format, frequency_secs,
                   collection_span, start_hour, end_hour, latitude, longitude,
                   daylight_margin_minutes, time_zone, storage_folder,
                   update_hour, url, image_width, image_height
            FROM resources
            ORDER BY resource_number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut resources = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_resource() {
                Ok(resource) => resources.push(resource),
                Err(e) => e.log(),
            }
        }
        Ok(resources)
    }

    async fn update_resource_dimensions(&self, resource: &Resource) -> Result<Resource> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            UPDATE resources
            SET image_width = $2, image_height = $3, updated_at = NOW()
            WHERE resource_number = $1
            RETURNING resource_number, name, active, resource_type, format, frequency_secs,
                      collection_span, start_hour, end_hour, latitude, longitude,
                      daylight_margin_minutes, time_zone, storage_folder,
                      update_hour, url, image_width, image_height
            "#,
        )
        .bind(resource.id.0)
        .bind(resource.image_width as i32)
        .bind(resource.image_height as i32)
        .fetch_one(&self.pool)
        .await?;

        row.into_resource()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub struct ResourceRow {
    pub resource_number: i32,
    pub name: String,
    pub active: bool,
    pub resource_type: String,
    pub format: String,
    pub frequency_secs: i32,
    pub collection_span: String,
    pub start_hour: Option<i32>,
    pub end_hour: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub daylight_margin_minutes: i32,
    pub time_zone: String,
    pub storage_folder: String,
    pub update_hour: i32,
    pub url: String,
    pub image_width: i32,
    pub image_height: i32,
}

impl ResourceRow {
    fn into_resource(self) -> Result<Resource> {
        let time_zone: Tz = self.time_zone.parse().map_err(|_| {
            SkyreelError::with_internal(
                ErrorCode::DatabaseError,
                "Resource has an invalid time zone",
                format!(
                    "resource {} has unknown time zone {:?}",
                    self.resource_number, self.time_zone
                ),
            )
        })?;

        let collection_span = self.collection_span()?;

        Ok(Resource {
            id: ResourceId(self.resource_number),
            name: self.name,
            active: self.active,
            kind: ResourceKind::parse(&self.resource_type),
            format: CaptureFormat::parse(&self.format),
            frequency_secs: self.frequency_secs.max(0) as u32,
            collection_span,
            time_zone,
            storage_folder: self.storage_folder,
            update_hour: self.update_hour.clamp(0, 23) as u32,
            url: self.url,
            image_width: self.image_width.max(0) as u32,
            image_height: self.image_height.max(0) as u32,
        })
    }

    fn collection_span(&self) -> Result<CollectionSpan> {
        let bad_span = |detail: String| {
            SkyreelError::with_internal(
                ErrorCode::DatabaseError,
                "Resource has an invalid collection span",
                format!("resource {}: {}", self.resource_number, detail),
            )
        };

        match self.collection_span.as_str() {
            "full_time" => Ok(CollectionSpan::FullTime),
            "specified_times" => Ok(CollectionSpan::SpecifiedTimes {
                start_hour: self.start_hour.unwrap_or(0).clamp(0, 23) as u32,
                end_hour: self.end_hour.unwrap_or(0).clamp(0, 24) as u32,
            }),
            "daylight_hours" => {
                let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
                    return Err(bad_span("daylight hours without a location".to_string()));
                };
                if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                    return Err(bad_span(format!(
                        "location ({}, {}) is out of range",
                        latitude, longitude
                    )));
                }
                let max = CollectionSpan::MAX_DAYLIGHT_MARGIN_MINUTES as i32;
                Ok(CollectionSpan::DaylightHours {
                    latitude,
                    longitude,
                    margin_minutes: self.daylight_margin_minutes.clamp(0, max) as u32,
                })
            }
            other => Err(bad_span(format!("unknown collection span {:?}", other))),
        }
    }
}
