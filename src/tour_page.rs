// Tour detail page: one price joined with its hotel, loaded in parallel

use futures::future::try_join;
use thiserror::Error;
use tracing::error;

use crate::{
    api::TourApi,
    format::{format_date, format_money},
    routes::Route,
    types::{Hotel, Price},
};

pub const NO_DESCRIPTION: &str = "No description for this hotel.";

// Services we know how to present; anything else the backend sends is skipped
const SERVICE_LABELS: &[(&str, &str)] = &[
    ("wifi", "Wi-Fi"),
    ("aquapark", "Pool"),
    ("tennis_court", "Tennis"),
    ("laundry", "Laundry"),
    ("parking", "Parking"),
    ("food", "Meals"),
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TourPageError {
    #[error("tour link is incomplete")]
    MissingIds,

    #[error("failed to load tour data")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBadge {
    pub key: String,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TourDetails {
    pub hotel_id: String,
    pub price_id: String,
    pub name: String,
    pub country_name: String,
    pub city_name: String,
    pub image: String,
    pub description: String,
    pub services: Vec<ServiceBadge>,
    pub start_date: String,
    pub end_date: String,
    pub price: String,
    pub back: Route,
}

impl TourDetails {
    pub fn new(hotel: Hotel, price: Price) -> Self {
        let services: Vec<ServiceBadge> = hotel
            .services
            .as_ref()
            .map(|services| {
                services
                    .iter()
                    .filter(|(_, value)| value.as_str() == "yes")
                    .filter_map(|(key, _)| {
                        SERVICE_LABELS
                            .iter()
                            .find(|(known, _)| known == key)
                            .map(|(_, label)| ServiceBadge {
                                key: key.clone(),
                                label: *label,
                            })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let description = hotel
            .description
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        Self {
            hotel_id: hotel.id,
            price_id: price.id,
            name: hotel.name,
            country_name: hotel.country_name,
            city_name: hotel.city_name,
            image: hotel.img,
            description,
            services,
            start_date: format_date(price.start_date),
            end_date: format_date(price.end_date),
            price: format_money(price.amount, Some(&price.currency)),
            back: Route::Search,
        }
    }
}

pub async fn load_tour<A: TourApi + ?Sized>(
    api: &A,
    hotel_id: &str,
    price_id: &str,
) -> Result<TourDetails, TourPageError> {
    if hotel_id.trim().is_empty() || price_id.trim().is_empty() {
        return Err(TourPageError::MissingIds);
    }

    let (price, hotel) = try_join(api.price(price_id), api.hotel(hotel_id))
        .await
        .map_err(|err| {
            error!(hotel_id, price_id, error = %err, "failed to load tour");
            TourPageError::Unavailable
        })?;

    Ok(TourDetails::new(hotel, price))
}

// Same as load_tour, starting from a parsed route
pub async fn load_route<A: TourApi + ?Sized>(
    api: &A,
    route: &Route,
) -> Result<TourDetails, TourPageError> {
    match route {
        Route::Tour { hotel_id, price_id } => load_tour(api, hotel_id, price_id).await,
        Route::Search => Err(TourPageError::MissingIds),
    }
}
