//! SQL query constants with database-specific placeholders.
//!
//! This module provides SQL queries that work with the selected database backend.
//! SQLite uses `?` placeholders, PostgreSQL uses `$1, $2, ...` numbered placeholders.

const PROPERTY_COLUMNS: &str = "id, name, surface, description, rent_price, sale_price, amenities, \
     notes, image, images, property_type, active, created_at, updated_at";

#[cfg(feature = "sqlite")]
pub const INSERT_PROPERTY: &str = r#"
    INSERT INTO properties
        (id, name, surface, description, rent_price, sale_price, amenities,
         notes, image, images, property_type, active, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

#[cfg(feature = "postgres")]
pub const INSERT_PROPERTY: &str = r#"
    INSERT INTO properties
        (id, name, surface, description, rent_price, sale_price, amenities,
         notes, image, images, property_type, active, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
"#;

#[cfg(feature = "sqlite")]
pub fn select_property() -> String {
    format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = ?")
}

#[cfg(feature = "postgres")]
pub fn select_property() -> String {
    format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1")
}

pub fn select_all_properties() -> String {
    format!("SELECT {PROPERTY_COLUMNS} FROM properties ORDER BY created_at DESC")
}

#[cfg(feature = "sqlite")]
pub fn select_properties_by_active() -> String {
    format!(
        "SELECT {PROPERTY_COLUMNS} FROM properties WHERE active = ? ORDER BY created_at DESC"
    )
}

#[cfg(feature = "postgres")]
pub fn select_properties_by_active() -> String {
    format!(
        "SELECT {PROPERTY_COLUMNS} FROM properties WHERE active = $1 ORDER BY created_at DESC"
    )
}

/// Partial update: NULL parameters leave the column as it is.
///
/// `property_type` can be cleared, so it takes a flag parameter followed by
/// the new (possibly NULL) value.
#[cfg(feature = "sqlite")]
pub const UPDATE_PROPERTY: &str = r#"
    UPDATE properties SET
        name = COALESCE(?, name),
        surface = COALESCE(?, surface),
        description = COALESCE(?, description),
        rent_price = COALESCE(?, rent_price),
        sale_price = COALESCE(?, sale_price),
        amenities = COALESCE(?, amenities),
        notes = COALESCE(?, notes),
        image = COALESCE(?, image),
        images = COALESCE(?, images),
        property_type = CASE WHEN ? THEN ? ELSE property_type END,
        active = COALESCE(?, active),
        updated_at = ?
    WHERE id = ?
"#;

#[cfg(feature = "postgres")]
pub const UPDATE_PROPERTY: &str = r#"
    UPDATE properties SET
        name = COALESCE($1, name),
        surface = COALESCE($2, surface),
        description = COALESCE($3, description),
        rent_price = COALESCE($4, rent_price),
        sale_price = COALESCE($5, sale_price),
        amenities = COALESCE($6, amenities),
        notes = COALESCE($7, notes),
        image = COALESCE($8, image),
        images = COALESCE($9, images),
        property_type = CASE WHEN $10 THEN $11 ELSE property_type END,
        active = COALESCE($12, active),
        updated_at = $13
    WHERE id = $14
"#;

#[cfg(feature = "sqlite")]
pub const DELETE_PROPERTY: &str = "DELETE FROM properties WHERE id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_PROPERTY: &str = "DELETE FROM properties WHERE id = $1";
