// In-memory tour backend for tests, benches and the --demo mode of the CLI

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    api::{ApiError, TourApi},
    types::{CountryLite, GeoEntity, Hotel, HotelsMap, Price, PricesMap, SearchTicket},
};

pub struct MockTourApi {
    countries: Mutex<BTreeMap<String, CountryLite>>,
    geo: Mutex<BTreeMap<String, GeoEntity>>,
    hotels: Mutex<HashMap<String, HotelsMap>>,
    prices: Mutex<HashMap<String, PricesMap>>,
    // token -> country the search was started for
    searches: Mutex<HashMap<String, String>>,
    poll_delays: Mutex<HashMap<String, Duration>>,
    // Applies to the next start call only
    next_start_delay: Mutex<Option<Duration>>,
    start_failure: Mutex<Option<ApiError>>,
    cancelled: Mutex<Vec<String>>,
    poll_log: Mutex<Vec<(String, Instant)>>,
    wait_ms: AtomicI64,
    hotel_delay_ms: AtomicI64,
    stop_delay_ms: AtomicI64,
    fail_next_polls: AtomicUsize,
    fail_next_hotel_requests: AtomicUsize,
    fail_stop: AtomicBool,
    next_token: AtomicUsize,
    start_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    hotel_calls: AtomicUsize,
}

impl Default for MockTourApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTourApi {
    pub fn new() -> Self {
        Self {
            countries: Mutex::new(BTreeMap::new()),
            geo: Mutex::new(BTreeMap::new()),
            hotels: Mutex::new(HashMap::new()),
            prices: Mutex::new(HashMap::new()),
            searches: Mutex::new(HashMap::new()),
            poll_delays: Mutex::new(HashMap::new()),
            next_start_delay: Mutex::new(None),
            start_failure: Mutex::new(None),
            cancelled: Mutex::new(Vec::new()),
            poll_log: Mutex::new(Vec::new()),
            wait_ms: AtomicI64::new(0),
            hotel_delay_ms: AtomicI64::new(0),
            stop_delay_ms: AtomicI64::new(0),
            fail_next_polls: AtomicUsize::new(0),
            fail_next_hotel_requests: AtomicUsize::new(0),
            fail_stop: AtomicBool::new(false),
            next_token: AtomicUsize::new(1),
            start_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            hotel_calls: AtomicUsize::new(0),
        }
    }

    // A small catalogue with two countries, used by the CLI demo
    pub async fn seeded() -> Self {
        let api = Self::new();
        api.set_wait(Duration::from_millis(1500));

        api.add_country(CountryLite {
            id: "43".to_string(),
            name: "Egypt".to_string(),
            flag: Some("https://flagcdn.com/40x30/eg.png".to_string()),
        })
        .await;
        api.add_country(CountryLite {
            id: "115".to_string(),
            name: "Turkey".to_string(),
            flag: Some("https://flagcdn.com/40x30/tr.png".to_string()),
        })
        .await;

        let mut marlin = sample_hotel("7953", "115", "Marlin Inn Azur Resort");
        marlin.description = Some("Beachfront resort with its own pier.".to_string());
        marlin.services = Some(BTreeMap::from([
            ("wifi".to_string(), "yes".to_string()),
            ("aquapark".to_string(), "yes".to_string()),
            ("parking".to_string(), "none".to_string()),
        ]));
        api.add_hotel(marlin).await;
        api.add_hotel(sample_hotel("7954", "115", "Delphin Palace")).await;
        api.add_hotel(sample_hotel("8120", "43", "Sunrise Garden Beach")).await;

        api.add_price("115", sample_price("p-115-1", "7953", 1834.0)).await;
        api.add_price("115", sample_price("p-115-2", "7954", 1299.5)).await;
        api.add_price("43", sample_price("p-43-1", "8120", 950.0)).await;
        api
    }

    // Offset between a search start and its waitUntil; may be negative
    pub fn set_wait_ms(&self, wait_ms: i64) {
        self.wait_ms.store(wait_ms, Ordering::SeqCst);
    }

    pub fn set_wait(&self, wait: Duration) {
        self.set_wait_ms(wait.as_millis() as i64);
    }

    pub fn set_hotel_delay(&self, delay: Duration) {
        self.hotel_delay_ms
            .store(delay.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        self.stop_delay_ms
            .store(delay.as_millis() as i64, Ordering::SeqCst);
    }

    // The token is handed out before the delay, so it keeps its place in the sequence
    pub async fn delay_next_start(&self, delay: Duration) {
        *self.next_start_delay.lock().await = Some(delay);
    }

    pub async fn set_poll_delay(&self, token: &str, delay: Duration) {
        self.poll_delays.lock().await.insert(token.to_string(), delay);
    }

    pub fn fail_next_polls(&self, count: usize) {
        self.fail_next_polls.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_hotel_requests(&self, count: usize) {
        self.fail_next_hotel_requests.store(count, Ordering::SeqCst);
    }

    pub async fn fail_start(&self, error: Option<ApiError>) {
        *self.start_failure.lock().await = error;
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub async fn add_country(&self, country: CountryLite) {
        self.geo
            .lock()
            .await
            .insert(format!("country-{}", country.id), GeoEntity::Country(country.clone()));
        self.countries.lock().await.insert(country.id.clone(), country);
    }

    pub async fn add_geo(&self, entity: GeoEntity) {
        self.geo.lock().await.insert(entity.id().to_string(), entity);
    }

    pub async fn add_hotel(&self, hotel: Hotel) {
        self.hotels
            .lock()
            .await
            .entry(hotel.country_id.clone())
            .or_default()
            .insert(hotel.id.clone(), hotel);
    }

    pub async fn add_price(&self, country_id: &str, price: Price) {
        self.prices
            .lock()
            .await
            .entry(country_id.to_string())
            .or_default()
            .insert(price.id.clone(), price);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn hotel_calls(&self) -> usize {
        self.hotel_calls.load(Ordering::SeqCst)
    }

    pub async fn cancelled_tokens(&self) -> Vec<String> {
        self.cancelled.lock().await.clone()
    }

    pub async fn poll_log(&self) -> Vec<(String, Instant)> {
        self.poll_log.lock().await.clone()
    }

    // Decrements a failure budget, reporting whether this call should fail
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub fn sample_hotel(id: &str, country_id: &str, name: &str) -> Hotel {
    Hotel {
        id: id.to_string(),
        name: name.to_string(),
        img: format!("https://img.example.com/hotels/{}.jpg", id),
        city_id: format!("{}-city", country_id),
        city_name: "Resort City".to_string(),
        country_id: country_id.to_string(),
        country_name: format!("Country {}", country_id),
        description: None,
        services: None,
    }
}

pub fn sample_price(id: &str, hotel_id: &str, amount: f64) -> Price {
    Price {
        id: id.to_string(),
        amount,
        currency: "usd".to_string(),
        start_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default(),
        end_date: NaiveDate::from_ymd_opt(2025, 6, 8).unwrap_or_default(),
        hotel_id: hotel_id.to_string(),
    }
}

#[async_trait]
impl TourApi for MockTourApi {
    async fn start_search(&self, country_id: &str) -> Result<SearchTicket, ApiError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.start_failure.lock().await.clone() {
            return Err(err);
        }

        let token = format!("t{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        self.searches
            .lock()
            .await
            .insert(token.clone(), country_id.to_string());

        let delay = self.next_start_delay.lock().await.take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let wait_ms = self.wait_ms.load(Ordering::SeqCst);
        Ok(SearchTicket {
            token,
            wait_until: Utc::now() + chrono::Duration::milliseconds(wait_ms),
        })
    }

    async fn search_results(&self, token: &str) -> Result<PricesMap, ApiError> {
        let poll_number = self.poll_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.poll_log
            .lock()
            .await
            .push((token.to_string(), Instant::now()));

        let delay = self.poll_delays.lock().await.get(token).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if Self::take_failure(&self.fail_next_polls) {
            return Err(ApiError::Rejected {
                status: 500,
                message: Some(format!("search results unavailable (poll {})", poll_number)),
            });
        }

        let country_id = self.searches.lock().await.get(token).cloned();
        let Some(country_id) = country_id else {
            return Err(ApiError::Rejected {
                status: 404,
                message: Some("unknown search token".to_string()),
            });
        };

        let prices = self
            .prices
            .lock()
            .await
            .get(&country_id)
            .cloned()
            .unwrap_or_default();
        Ok(prices)
    }

    async fn stop_search(&self, token: &str) -> Result<(), ApiError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.cancelled.lock().await.push(token.to_string());

        let delay = self.stop_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection reset by peer".to_string()));
        }
        Ok(())
    }

    async fn countries(&self) -> Result<BTreeMap<String, CountryLite>, ApiError> {
        Ok(self.countries.lock().await.clone())
    }

    async fn search_geo(&self, query: &str) -> Result<BTreeMap<String, GeoEntity>, ApiError> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .geo
            .lock()
            .await
            .iter()
            .filter(|(_, entity)| entity.name().to_lowercase().contains(&needle))
            .map(|(key, entity)| (key.clone(), entity.clone()))
            .collect())
    }

    async fn hotels(&self, country_id: &str) -> Result<HotelsMap, ApiError> {
        self.hotel_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.hotel_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        if Self::take_failure(&self.fail_next_hotel_requests) {
            return Err(ApiError::Rejected {
                status: 503,
                message: Some("hotel service unavailable".to_string()),
            });
        }

        let hotels = self
            .hotels
            .lock()
            .await
            .get(country_id)
            .cloned()
            .unwrap_or_default();
        Ok(hotels)
    }

    async fn price(&self, price_id: &str) -> Result<Price, ApiError> {
        self.prices
            .lock()
            .await
            .values()
            .find_map(|prices| prices.get(price_id).cloned())
            .ok_or_else(|| ApiError::Rejected {
                status: 404,
                message: Some(format!("price {} not found", price_id)),
            })
    }

    async fn hotel(&self, hotel_id: &str) -> Result<Hotel, ApiError> {
        self.hotels
            .lock()
            .await
            .values()
            .find_map(|hotels| hotels.get(hotel_id).cloned())
            .ok_or_else(|| ApiError::Rejected {
                status: 404,
                message: Some(format!("hotel {} not found", hotel_id)),
            })
    }
}
