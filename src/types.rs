// Data structures exchanged with the tour backend

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type PricesMap = HashMap<String, Price>;
pub type HotelsMap = HashMap<String, Hotel>;

// The backend is inconsistent about identifiers: some come back as JSON
// numbers, some as strings. Everything is normalised to String here.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

/// A single priced offer produced by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(rename = "hotelID", deserialize_with = "id_string")]
    pub hotel_id: String,
}

impl Price {
    // Checks the parts serde can't express: the amount must be a real
    // non-negative number and the currency a 3-letter code
    pub fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(format!(
                "price {} has invalid amount {}",
                self.id, self.amount
            ));
        }

        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!(
                "price {} has invalid currency {:?}",
                self.id, self.currency
            ));
        }

        Ok(())
    }
}

/// Full hotel record, as returned by the hotel list and hotel detail calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    pub img: String,
    #[serde(deserialize_with = "id_string")]
    pub city_id: String,
    pub city_name: String,
    #[serde(deserialize_with = "id_string")]
    pub country_id: String,
    pub country_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub services: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryLite {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub flag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityLite {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
}

// Lightweight hotel used by autocomplete, not the detail record above
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelLite {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub country_id: Option<String>,
}

/// Autocomplete suggestion, discriminated by the `type` field on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeoEntity {
    Country(CountryLite),
    City(CityLite),
    Hotel(HotelLite),
}

impl GeoEntity {
    pub fn id(&self) -> &str {
        match self {
            GeoEntity::Country(country) => &country.id,
            GeoEntity::City(city) => &city.id,
            GeoEntity::Hotel(hotel) => &hotel.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GeoEntity::Country(country) => &country.name,
            GeoEntity::City(city) => &city.name,
            GeoEntity::Hotel(hotel) => &hotel.name,
        }
    }
}

/// Handle for a server-side search job plus the earliest moment worth polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTicket {
    pub token: String,
    pub wait_until: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PricesResponse {
    pub prices: PricesMap,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
