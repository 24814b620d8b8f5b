//! Property listing model and request schemas.
//!
//! Request bodies are deserialized into typed structs and then checked by
//! `validate()` before anything touches the database. The image pair
//! (`image` + `images`) is kept consistent by [`normalize_images`].

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum number of images the admin UI lets a property carry.
///
/// Enforced client-side only; the API accepts longer arrays.
pub const MAX_IMAGES_PER_PROPERTY: usize = 5;

/// Listing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Renta,
    Venta,
    Ambos,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Renta => "Renta",
            PropertyType::Venta => "Venta",
            PropertyType::Ambos => "Ambos",
        }
    }
}

impl FromStr for PropertyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Renta" => Ok(PropertyType::Renta),
            "Venta" => Ok(PropertyType::Venta),
            "Ambos" => Ok(PropertyType::Ambos),
            other => Err(Error::Validation(format!(
                "type must be \"Renta\", \"Venta\" or \"Ambos\" (got \"{other}\")"
            ))),
        }
    }
}

/// A stored property listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub surface: String,
    pub description: String,
    pub rent_price: f64,
    pub sale_price: f64,
    pub amenities: Vec<String>,
    pub notes: String,
    pub image: String,
    pub images: Vec<String>,
    #[serde(rename = "type")]
    pub property_type: Option<PropertyType>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned after a delete so the UI can confirm what went away.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedSummary {
    pub id: String,
    pub name: String,
}

/// Which listings `list` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActiveFilter {
    /// Only active listings (the default when no filter is given).
    #[default]
    Active,
    /// Only inactive listings.
    Inactive,
    /// Everything.
    All,
}

impl ActiveFilter {
    /// Parse the `active` query parameter. `None` means the parameter was absent.
    pub fn from_query(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(ActiveFilter::Active),
            Some("true") => Ok(ActiveFilter::Active),
            Some("false") => Ok(ActiveFilter::Inactive),
            Some("all") => Ok(ActiveFilter::All),
            Some(other) => Err(Error::Validation(format!(
                "active must be \"true\", \"false\" or \"all\" (got \"{other}\")"
            ))),
        }
    }
}

/// Summary numbers for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub for_rent: usize,
    pub for_sale: usize,
    pub avg_rent_price: f64,
    pub avg_sale_price: f64,
    pub active_percentage: f64,
}

impl PropertyStats {
    /// Compute stats over a set of listings.
    pub fn from_properties(properties: &[Property]) -> Self {
        let total = properties.len();
        let active = properties.iter().filter(|p| p.active).count();

        let rents: Vec<f64> = properties
            .iter()
            .map(|p| p.rent_price)
            .filter(|&p| p > 0.0)
            .collect();
        let sales: Vec<f64> = properties
            .iter()
            .map(|p| p.sale_price)
            .filter(|&p| p > 0.0)
            .collect();

        Self {
            total,
            active,
            inactive: total - active,
            for_rent: rents.len(),
            for_sale: sales.len(),
            avg_rent_price: average(&rents),
            avg_sale_price: average(&sales),
            active_percentage: if total > 0 {
                active as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Generate a new property id: 4 bytes of creation seconds + 8 random bytes, hex encoded.
pub fn generate_id(now: DateTime<Utc>) -> String {
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&(now.timestamp() as u32).to_be_bytes());
    rand::rng().fill(&mut bytes[4..]);
    hex::encode(bytes)
}

/// Check that an id is exactly 24 hex digits.
pub fn validate_id(id: &str) -> Result<()> {
    if id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(Error::InvalidId(id.to_string()))
    }
}

/// Reconcile the legacy single-image field with the images array.
///
/// `stored_images` is `None` for legacy rows written before the array existed.
/// Returns `(image, images)` with `image == images[0]` whenever images is
/// non-empty, and both empty otherwise.
pub fn normalize_images(legacy_image: &str, stored_images: Option<Vec<String>>) -> (String, Vec<String>) {
    let images = match stored_images {
        Some(images) if !images.is_empty() => images,
        _ => {
            let legacy = legacy_image.trim();
            if legacy.is_empty() {
                Vec::new()
            } else {
                vec![legacy.to_string()]
            }
        }
    };
    let image = images.first().cloned().unwrap_or_default();
    (image, images)
}

/// Distinguish an explicit `null` from an absent field.
fn explicit<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn check_price(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Validation(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(())
}

fn check_prices_pair(rent_price: f64, sale_price: f64) -> Result<()> {
    if rent_price <= 0.0 && sale_price <= 0.0 {
        return Err(Error::Validation(
            "At least one price (rent or sale) must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Body of `POST /api/properties`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePropertyRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surface: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rent_price: Option<f64>,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub amenities: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default, rename = "type")]
    pub property_type: Option<PropertyType>,
}

/// A create request that passed validation, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProperty {
    pub name: String,
    pub surface: String,
    pub description: String,
    pub rent_price: f64,
    pub sale_price: f64,
    pub amenities: Vec<String>,
    pub notes: String,
    pub image: String,
    pub images: Vec<String>,
    pub property_type: Option<PropertyType>,
}

impl CreatePropertyRequest {
    /// Validate and normalize into a [`NewProperty`].
    pub fn validate(self) -> Result<NewProperty> {
        let name = self.name.trim().to_string();
        let surface = self.surface.trim().to_string();
        let description = self.description.trim().to_string();

        if name.is_empty() || surface.is_empty() || description.is_empty() {
            return Err(Error::Validation(
                "The fields name, surface and description are required".to_string(),
            ));
        }

        let rent_price = self.rent_price.unwrap_or(0.0);
        let sale_price = self.sale_price.unwrap_or(0.0);
        check_price("rentPrice", rent_price)?;
        check_price("salePrice", sale_price)?;
        check_prices_pair(rent_price, sale_price)?;

        let legacy = self.image.unwrap_or_default();
        let (image, images) = normalize_images(&legacy, self.images);

        Ok(NewProperty {
            name,
            surface,
            description,
            rent_price,
            sale_price,
            amenities: self.amenities.unwrap_or_default(),
            notes: self.notes.map(|n| n.trim().to_string()).unwrap_or_default(),
            image,
            images,
            property_type: self.property_type,
        })
    }
}

/// Body of `PATCH /api/properties/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePropertyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surface: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rent_price: Option<f64>,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub amenities: Option<Vec<String>>,
    #[serde(default, deserialize_with = "explicit")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default, rename = "type", deserialize_with = "explicit")]
    pub property_type: Option<Option<PropertyType>>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Column-level changes for an update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyChanges {
    pub name: Option<String>,
    pub surface: Option<String>,
    pub description: Option<String>,
    pub rent_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub amenities: Option<Vec<String>>,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub images: Option<Vec<String>>,
    pub property_type: Option<Option<PropertyType>>,
    pub active: Option<bool>,
}

fn required_text(field: &str, value: Option<String>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) => {
            let v = v.trim().to_string();
            if v.is_empty() {
                Err(Error::Validation(format!("{field} cannot be empty")))
            } else {
                Ok(Some(v))
            }
        }
    }
}

impl UpdatePropertyRequest {
    /// Validate against the current stored listing and produce column changes.
    ///
    /// Price checks use the merged pair: a supplied price combined with the
    /// existing value of the other one.
    pub fn validate(self, existing: &Property) -> Result<PropertyChanges> {
        if let Some(rent) = self.rent_price {
            check_price("rentPrice", rent)?;
        }
        if let Some(sale) = self.sale_price {
            check_price("salePrice", sale)?;
        }
        if self.rent_price.is_some() || self.sale_price.is_some() {
            check_prices_pair(
                self.rent_price.unwrap_or(existing.rent_price),
                self.sale_price.unwrap_or(existing.sale_price),
            )?;
        }

        let (image, images) = match (self.images, self.image) {
            (Some(images), _) => {
                let (image, images) = normalize_images("", Some(images));
                (Some(image), Some(images))
            }
            (None, Some(legacy)) => {
                let (image, images) = normalize_images(&legacy, None);
                (Some(image), Some(images))
            }
            (None, None) => (None, None),
        };

        Ok(PropertyChanges {
            name: required_text("name", self.name)?,
            surface: required_text("surface", self.surface)?,
            description: required_text("description", self.description)?,
            rent_price: self.rent_price,
            sale_price: self.sale_price,
            amenities: self.amenities,
            notes: self
                .notes
                .map(|n| n.map(|n| n.trim().to_string()).unwrap_or_default()),
            image,
            images,
            property_type: self.property_type,
            active: self.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn existing(rent: f64, sale: f64) -> Property {
        let now = Utc::now();
        Property {
            id: generate_id(now),
            name: "Casa A".into(),
            surface: "100m2".into(),
            description: "desc".into(),
            rent_price: rent,
            sale_price: sale,
            amenities: vec![],
            notes: String::new(),
            image: String::new(),
            images: vec![],
            property_type: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_generate_id_is_valid() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let id = generate_id(now);
        assert_eq!(id.len(), 24);
        assert!(validate_id(&id).is_ok());
        assert!(id.starts_with(&format!("{:08x}", now.timestamp())));
        assert_ne!(generate_id(now), id);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("64b7f0c2a1b2c3d4e5f60718").is_ok());
        assert!(validate_id("64B7F0C2A1B2C3D4E5F60718").is_ok());
        assert!(validate_id("not-an-id").is_err());
        assert!(validate_id("64b7f0c2a1b2c3d4e5f6071").is_err());
        assert!(validate_id("64b7f0c2a1b2c3d4e5f6071z").is_err());
        assert!(validate_id("").is_err());
    }

    #[test]
    fn test_active_filter() {
        assert_eq!(ActiveFilter::from_query(None).unwrap(), ActiveFilter::Active);
        assert_eq!(ActiveFilter::from_query(Some("true")).unwrap(), ActiveFilter::Active);
        assert_eq!(ActiveFilter::from_query(Some("false")).unwrap(), ActiveFilter::Inactive);
        assert_eq!(ActiveFilter::from_query(Some("all")).unwrap(), ActiveFilter::All);
        assert!(ActiveFilter::from_query(Some("yes")).is_err());
    }

    #[test]
    fn test_property_type_parse() {
        assert_eq!("Renta".parse::<PropertyType>().unwrap(), PropertyType::Renta);
        assert_eq!("Ambos".parse::<PropertyType>().unwrap(), PropertyType::Ambos);
        assert!("renta".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_normalize_images() {
        // Array wins, image mirrors its head
        let (image, images) = normalize_images("old.jpg", Some(vec!["a.jpg".into(), "b.jpg".into()]));
        assert_eq!(image, "a.jpg");
        assert_eq!(images, vec!["a.jpg", "b.jpg"]);

        // Legacy row: no array, single image
        let (image, images) = normalize_images("old.jpg", None);
        assert_eq!(image, "old.jpg");
        assert_eq!(images, vec!["old.jpg"]);

        // Nothing at all
        let (image, images) = normalize_images("", None);
        assert_eq!(image, "");
        assert!(images.is_empty());

        let (image, images) = normalize_images("  ", Some(vec![]));
        assert_eq!(image, "");
        assert!(images.is_empty());
    }

    #[test]
    fn test_create_minimal() {
        let req: CreatePropertyRequest = serde_json::from_str(
            r#"{"name":" Casa A ","surface":"100m2","description":"desc","rentPrice":5000}"#,
        )
        .unwrap();
        let new = req.validate().unwrap();
        assert_eq!(new.name, "Casa A");
        assert_eq!(new.rent_price, 5000.0);
        assert_eq!(new.sale_price, 0.0);
        assert!(new.images.is_empty());
        assert_eq!(new.image, "");
        assert!(new.amenities.is_empty());
        assert_eq!(new.property_type, None);
    }

    #[test]
    fn test_create_requires_text_fields() {
        let req: CreatePropertyRequest =
            serde_json::from_str(r#"{"name":"Casa","surface":"  ","description":"d","rentPrice":1}"#)
                .unwrap();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_create_requires_a_price() {
        let req: CreatePropertyRequest =
            serde_json::from_str(r#"{"name":"Casa","surface":"s","description":"d"}"#).unwrap();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let req: CreatePropertyRequest = serde_json::from_str(
            r#"{"name":"Casa","surface":"s","description":"d","rentPrice":0,"salePrice":0}"#,
        )
        .unwrap();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let req: CreatePropertyRequest = serde_json::from_str(
            r#"{"name":"Casa","surface":"s","description":"d","rentPrice":-5,"salePrice":100}"#,
        )
        .unwrap();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_create_rejects_bad_shapes() {
        assert!(
            serde_json::from_str::<CreatePropertyRequest>(
                r#"{"name":"Casa","surface":"s","description":"d","rentPrice":1,"amenities":"pool"}"#
            )
            .is_err()
        );
        assert!(
            serde_json::from_str::<CreatePropertyRequest>(
                r#"{"name":"Casa","surface":"s","description":"d","rentPrice":1,"images":"a.jpg"}"#
            )
            .is_err()
        );
        assert!(
            serde_json::from_str::<CreatePropertyRequest>(
                r#"{"name":"Casa","surface":"s","description":"d","rentPrice":1,"type":"Alquiler"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_create_image_from_array_or_legacy() {
        let req: CreatePropertyRequest = serde_json::from_str(
            r#"{"name":"C","surface":"s","description":"d","salePrice":1,
                "image":"legacy.jpg","images":["a.jpg","b.jpg"],"type":"Venta"}"#,
        )
        .unwrap();
        let new = req.validate().unwrap();
        assert_eq!(new.image, "a.jpg");
        assert_eq!(new.images.len(), 2);
        assert_eq!(new.property_type, Some(PropertyType::Venta));

        let req: CreatePropertyRequest = serde_json::from_str(
            r#"{"name":"C","surface":"s","description":"d","salePrice":1,"image":" legacy.jpg "}"#,
        )
        .unwrap();
        let new = req.validate().unwrap();
        assert_eq!(new.image, "legacy.jpg");
        assert_eq!(new.images, vec!["legacy.jpg"]);
    }

    #[test]
    fn test_update_merges_prices() {
        let current = existing(5000.0, 0.0);

        // Zeroing the sale price keeps rent > 0
        let req: UpdatePropertyRequest = serde_json::from_str(r#"{"salePrice":0}"#).unwrap();
        let changes = req.validate(&current).unwrap();
        assert_eq!(changes.sale_price, Some(0.0));

        // Zeroing rent on a rent-only listing leaves nothing positive
        let req: UpdatePropertyRequest = serde_json::from_str(r#"{"rentPrice":0}"#).unwrap();
        assert!(matches!(req.validate(&current), Err(Error::Validation(_))));

        let req: UpdatePropertyRequest =
            serde_json::from_str(r#"{"rentPrice":0,"salePrice":0}"#).unwrap();
        assert!(matches!(req.validate(&current), Err(Error::Validation(_))));

        // Prices untouched, no price check at all
        let req: UpdatePropertyRequest = serde_json::from_str(r#"{"name":"Casa B"}"#).unwrap();
        let changes = req.validate(&existing(0.0, 0.0)).unwrap();
        assert_eq!(changes.name.as_deref(), Some("Casa B"));
    }

    #[test]
    fn test_update_explicit_null_clears() {
        let current = existing(1.0, 0.0);
        let req: UpdatePropertyRequest =
            serde_json::from_str(r#"{"type":null,"notes":null}"#).unwrap();
        let changes = req.validate(&current).unwrap();
        assert_eq!(changes.property_type, Some(None));
        assert_eq!(changes.notes, Some(String::new()));

        let req: UpdatePropertyRequest = serde_json::from_str(r#"{}"#).unwrap();
        let changes = req.validate(&current).unwrap();
        assert_eq!(changes, PropertyChanges::default());
    }

    #[test]
    fn test_update_images() {
        let current = existing(1.0, 0.0);
        let req: UpdatePropertyRequest =
            serde_json::from_str(r#"{"images":["x.jpg","y.jpg"]}"#).unwrap();
        let changes = req.validate(&current).unwrap();
        assert_eq!(changes.image.as_deref(), Some("x.jpg"));

        let req: UpdatePropertyRequest = serde_json::from_str(r#"{"image":"solo.jpg"}"#).unwrap();
        let changes = req.validate(&current).unwrap();
        assert_eq!(changes.images, Some(vec!["solo.jpg".to_string()]));

        let req: UpdatePropertyRequest = serde_json::from_str(r#"{"images":[]}"#).unwrap();
        let changes = req.validate(&current).unwrap();
        assert_eq!(changes.image.as_deref(), Some(""));
        assert_eq!(changes.images, Some(vec![]));
    }

    #[test]
    fn test_update_rejects_empty_name() {
        let req: UpdatePropertyRequest = serde_json::from_str(r#"{"name":"   "}"#).unwrap();
        assert!(req.validate(&existing(1.0, 0.0)).is_err());
    }

    #[test]
    fn test_stats() {
        let mut a = existing(1000.0, 0.0);
        let mut b = existing(3000.0, 200000.0);
        let c = existing(0.0, 100000.0);
        b.active = false;
        a.active = true;

        let stats = PropertyStats::from_properties(&[a, b, c]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.for_rent, 2);
        assert_eq!(stats.for_sale, 2);
        assert_eq!(stats.avg_rent_price, 2000.0);
        assert_eq!(stats.avg_sale_price, 150000.0);

        let empty = PropertyStats::from_properties(&[]);
        assert_eq!(empty.active_percentage, 0.0);
        assert_eq!(empty.avg_rent_price, 0.0);
    }
}
