// Main library file for the tour search client core

// Transport and data model
pub mod api;
pub mod config;
pub mod mock_server;
pub mod types;

// Search core: price search state machine and per-country hotel cache
pub mod hotel_cache;
pub mod search_prices;

// Pages and view helpers
pub mod format;
pub mod routes;
pub mod search_form;
pub mod search_page;
pub mod tour_page;

// Re-export key types for convenience
pub use api::{ApiError, HttpTourApi, TourApi};
pub use config::{ClientConfig, ConfigError, RetryConfig};
pub use hotel_cache::{HotelCache, HotelsStatus, ResolveOutcome};
pub use routes::Route;
pub use search_page::{SearchPage, SearchView, TourCard};
pub use search_prices::{SearchError, SearchJob, SearchOrchestrator, SearchOutcome, SearchStatus};
pub use types::{GeoEntity, Hotel, Price};
