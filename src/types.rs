use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A published dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

/// A product together with all of its deliveries, as returned by the
/// product detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductWithDeliveries {
    pub id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deliveries: Vec<Delivery>,
}

impl ProductWithDeliveries {
    /// The delivery with the latest publication time.
    pub fn latest_delivery(&self) -> Option<&Delivery> {
        latest_delivery(&self.deliveries)
    }
}

impl From<ProductWithDeliveries> for Product {
    fn from(p: ProductWithDeliveries) -> Self {
        Product {
            id: p.id,
            name: p.name,
            description: p.description,
        }
    }
}

/// One periodic release of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(rename = "deliveryId")]
    pub id: i64,
    #[serde(rename = "deliveryName")]
    pub name: String,
    #[serde(rename = "deliveryPublicationDatetime")]
    pub published_at: DateTime<Utc>,
    #[serde(rename = "deliveryExpiryDatetime", default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<DeliveryFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFile {
    #[serde(rename = "fileId")]
    pub id: i64,
    #[serde(rename = "fileName")]
    pub name: String,
    /// Human readable size as formatted by the server (e.g. `"1.5 GB"`).
    #[serde(rename = "fileSize", default, deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(rename = "fileChecksum", default, deserialize_with = "null_as_default")]
    pub checksum: String,
    #[serde(rename = "filePublicationDatetime")]
    pub published_at: DateTime<Utc>,
}

/// Picks the delivery with the greatest publication time. On ties the first
/// one encountered wins.
pub(crate) fn latest_delivery(deliveries: &[Delivery]) -> Option<&Delivery> {
    let (first, rest) = deliveries.split_first()?;
    Some(rest.iter().fold(first, |latest, d| {
        if d.published_at > latest.published_at {
            d
        } else {
            latest
        }
    }))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
