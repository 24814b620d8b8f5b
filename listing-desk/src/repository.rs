//! Property store backed by the shared database pool.
//!
//! Every operation is a single statement (plus a read for the ones that
//! need the current row); there are no transactions. Concurrent updates to
//! the same listing are last-write-wins per column.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::json;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::db::{DbPool, DbRow};
use crate::error::{Error, Result};
use crate::property::{
    ActiveFilter, CreatePropertyRequest, DeletedSummary, Property, PropertyStats, PropertyType,
    UpdatePropertyRequest, generate_id, normalize_images, validate_id,
};
use crate::sql;

/// Database-backed storage for property listings.
pub struct PropertyStore {
    pool: DbPool,
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode_list(values: &[String]) -> String {
    json!(values).to_string()
}

impl PropertyStore {
    /// Create a new PropertyStore using the given database pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// List listings, newest first.
    pub async fn list(&self, filter: ActiveFilter) -> Result<Vec<Property>> {
        let rows = match filter {
            ActiveFilter::All => {
                sqlx::query(&sql::select_all_properties())
                    .fetch_all(&self.pool)
                    .await?
            }
            ActiveFilter::Active | ActiveFilter::Inactive => {
                sqlx::query(&sql::select_properties_by_active())
                    .bind(filter == ActiveFilter::Active)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        // Unreadable rows are skipped here; `get` reports them as errors
        let properties = rows
            .into_iter()
            .filter_map(|row| match row_to_property(&row) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Skipping unreadable property row: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(?filter, count = properties.len(), "Listed properties");
        Ok(properties)
    }

    /// Fetch one listing by id.
    pub async fn get(&self, id: &str) -> Result<Property> {
        validate_id(id)?;

        let row = sqlx::query(&sql::select_property())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_property(&row),
            None => Err(Error::NotFound("Property")),
        }
    }

    /// Validate and insert a new listing. New listings are always active.
    pub async fn create(&self, request: CreatePropertyRequest) -> Result<Property> {
        let new = request.validate()?;
        let now = Utc::now().trunc_subsecs(3);
        let id = generate_id(now);
        let timestamp = format_timestamp(now);

        sqlx::query(sql::INSERT_PROPERTY)
            .bind(&id)
            .bind(&new.name)
            .bind(&new.surface)
            .bind(&new.description)
            .bind(new.rent_price)
            .bind(new.sale_price)
            .bind(encode_list(&new.amenities))
            .bind(&new.notes)
            .bind(&new.image)
            .bind(encode_list(&new.images))
            .bind(new.property_type.map(|t| t.as_str()))
            .bind(true)
            .bind(&timestamp)
            .bind(&timestamp)
            .execute(&self.pool)
            .await?;

        info!(id = %id, name = %new.name, "Created property");

        Ok(Property {
            id,
            name: new.name,
            surface: new.surface,
            description: new.description,
            rent_price: new.rent_price,
            sale_price: new.sale_price,
            amenities: new.amenities,
            notes: new.notes,
            image: new.image,
            images: new.images,
            property_type: new.property_type,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update and return the listing as stored afterwards.
    pub async fn update(&self, id: &str, request: UpdatePropertyRequest) -> Result<Property> {
        let existing = self.get(id).await?;
        let changes = request.validate(&existing)?;
        let now = Utc::now().trunc_subsecs(3);

        let (set_type, property_type) = match changes.property_type {
            Some(t) => (true, t.map(|t| t.as_str())),
            None => (false, None),
        };

        let result = sqlx::query(sql::UPDATE_PROPERTY)
            .bind(changes.name)
            .bind(changes.surface)
            .bind(changes.description)
            .bind(changes.rent_price)
            .bind(changes.sale_price)
            .bind(changes.amenities.as_deref().map(encode_list))
            .bind(changes.notes)
            .bind(changes.image)
            .bind(changes.images.as_deref().map(encode_list))
            .bind(set_type)
            .bind(property_type)
            .bind(changes.active)
            .bind(format_timestamp(now))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Property"));
        }

        info!(id = %id, "Updated property");
        self.get(id).await
    }

    /// Hard-delete a listing.
    ///
    /// Images stored under the listing's folder are left in place; see
    /// `ImageStore::delete_folder`.
    pub async fn delete(&self, id: &str) -> Result<DeletedSummary> {
        let existing = self.get(id).await?;

        let result = sqlx::query(sql::DELETE_PROPERTY)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Property"));
        }

        info!(id = %id, name = %existing.name, "Deleted property");

        Ok(DeletedSummary {
            id: existing.id,
            name: existing.name,
        })
    }

    /// Dashboard numbers over every listing, active or not.
    pub async fn stats(&self) -> Result<PropertyStats> {
        let properties = self.list(ActiveFilter::All).await?;
        Ok(PropertyStats::from_properties(&properties))
    }
}

/// Convert a database row into a [`Property`], normalizing the image pair.
fn row_to_property(row: &DbRow) -> Result<Property> {
    let id: String = row.try_get("id")?;
    let corrupt = |reason: String| Error::CorruptRecord {
        id: id.clone(),
        reason,
    };

    let amenities_json: String = row.try_get("amenities")?;
    let amenities: Vec<String> = serde_json::from_str(&amenities_json)
        .map_err(|e| corrupt(format!("amenities: {e}")))?;

    let images_json: Option<String> = row.try_get("images")?;
    let stored_images: Option<Vec<String>> = images_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| corrupt(format!("images: {e}")))?;

    let legacy_image: String = row.try_get("image")?;
    let (image, images) = normalize_images(&legacy_image, stored_images);

    let property_type = row
        .try_get::<Option<String>, _>("property_type")?
        .map(|t| t.parse::<PropertyType>())
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;

    let parse_ts = |column: &str| -> Result<DateTime<Utc>> {
        let raw: String = row.try_get(column)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("{column}: {e}")))
    };
    let created_at = parse_ts("created_at")?;
    let updated_at = parse_ts("updated_at")?;

    Ok(Property {
        id: id.clone(),
        name: row.try_get("name")?,
        surface: row.try_get("surface")?,
        description: row.try_get("description")?,
        rent_price: row.try_get("rent_price")?,
        sale_price: row.try_get("sale_price")?,
        amenities,
        notes: row.try_get("notes")?,
        image,
        images,
        property_type,
        active: row.try_get("active")?,
        created_at,
        updated_at,
    })
}
