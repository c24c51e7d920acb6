// Search page: runs a price search and a hotel lookup for the chosen country and
// joins the two into renderable tour cards

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    api::TourApi,
    config::RetryConfig,
    format::{format_date, format_money},
    hotel_cache::{HotelCache, HotelsStatus, ResolveOutcome},
    routes::Route,
    search_prices::{SearchOrchestrator, SearchOutcome},
    types::{HotelsMap, Price},
};

pub const GENERIC_ERROR: &str = "failed to fetch results";

#[derive(Debug, Clone, PartialEq)]
pub struct TourCard {
    pub price_id: String,
    pub hotel_id: String,
    pub hotel_name: String,
    pub image: String,
    pub location: String,
    pub start_date: String,
    pub price: String,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchView {
    // Nothing submitted yet
    Hidden,
    Loading,
    Failed(String),
    Empty,
    Results(Vec<TourCard>),
}

/// Pairs every price with its hotel. Prices whose hotel is unknown are dropped:
/// the two lists come from independent requests and may briefly disagree.
pub fn join_results(prices: &[Price], hotels: &HotelsMap) -> Vec<TourCard> {
    prices
        .iter()
        .filter_map(|price| {
            let hotel = hotels.get(&price.hotel_id)?;
            Some(TourCard {
                price_id: price.id.clone(),
                hotel_id: hotel.id.clone(),
                hotel_name: hotel.name.clone(),
                image: hotel.img.clone(),
                location: format!("{}, {}", hotel.country_name, hotel.city_name),
                start_date: format_date(price.start_date),
                price: format_money(price.amount, Some(&price.currency)),
                route: Route::tour(hotel.id.clone(), price.id.clone()),
            })
        })
        .collect()
}

pub struct SearchPage<A: TourApi> {
    search: Arc<SearchOrchestrator<A>>,
    hotels: Arc<HotelCache<A>>,
    country_id: RwLock<Option<String>>,
}

impl<A: TourApi> SearchPage<A> {
    pub fn new(api: Arc<A>, retry: RetryConfig) -> Self {
        Self::from_parts(
            Arc::new(SearchOrchestrator::new(api.clone(), retry)),
            Arc::new(HotelCache::new(api)),
        )
    }

    pub fn from_parts(search: Arc<SearchOrchestrator<A>>, hotels: Arc<HotelCache<A>>) -> Self {
        Self {
            search,
            hotels,
            country_id: RwLock::new(None),
        }
    }

    pub fn orchestrator(&self) -> &Arc<SearchOrchestrator<A>> {
        &self.search
    }

    pub fn hotel_cache(&self) -> &Arc<HotelCache<A>> {
        &self.hotels
    }

    pub fn country_id(&self) -> Option<String> {
        self.country_id.read().clone()
    }

    pub async fn submit(&self, country_id: &str) -> (ResolveOutcome, SearchOutcome) {
        *self.country_id.write() = Some(country_id.to_string());

        tokio::join!(
            self.hotels.resolve(Some(country_id)),
            self.search.start(country_id)
        )
    }

    // Page is going away; nothing in flight may touch its state any more
    pub fn close(&self) {
        self.search.detach();
        self.hotels.detach();
    }

    pub fn is_loading(&self) -> bool {
        self.search.is_loading() || self.hotels.status() == HotelsStatus::Loading
    }

    pub fn view(&self) -> SearchView {
        if self.country_id.read().is_none() {
            return SearchView::Hidden;
        }

        let job = self.search.snapshot();
        let hotels = self.hotels.snapshot();

        if job.status.is_loading() || hotels.status == HotelsStatus::Loading {
            return SearchView::Loading;
        }

        if let Some(message) = job.error.or(hotels.error) {
            let message = if message.trim().is_empty() {
                GENERIC_ERROR.to_string()
            } else {
                message
            };
            return SearchView::Failed(message);
        }

        let cards = join_results(&job.prices, &hotels.hotels);
        if cards.is_empty() {
            SearchView::Empty
        } else {
            SearchView::Results(cards)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::{sample_hotel, sample_price, MockTourApi};
    use std::time::Duration;

    async fn seeded_api() -> Arc<MockTourApi> {
        let api = Arc::new(MockTourApi::new());
        api.set_wait(Duration::from_millis(1500));
        api.add_hotel(sample_hotel("h1", "UA", "Kyiv Grand")).await;
        api.add_hotel(sample_hotel("h2", "UA", "Lviv Old Town")).await;
        api.add_price("UA", sample_price("p1", "h1", 500.0)).await;
        api.add_price("UA", sample_price("p2", "h2", 200.0)).await;
        api
    }

    #[test]
    fn test_join_drops_prices_without_hotel() {
        let hotels: HotelsMap = [("h1".to_string(), sample_hotel("h1", "UA", "Kyiv Grand"))]
            .into_iter()
            .collect();
        let prices = vec![
            sample_price("p1", "h1", 200.0),
            sample_price("p2", "ghost", 300.0),
            sample_price("p3", "h1", 400.0),
        ];

        let cards = join_results(&prices, &hotels);
        let ids: Vec<&str> = cards.iter().map(|c| c.price_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(cards[0].route, Route::tour("h1", "p1"));
        assert_eq!(cards[0].location, "Country UA, Resort City");
        assert_eq!(cards[0].price, "200 USD");
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_renders_joined_results() {
        let page = SearchPage::new(seeded_api().await, RetryConfig::default());
        assert_eq!(page.view(), SearchView::Hidden);

        page.submit("UA").await;

        let SearchView::Results(cards) = page.view() else {
            panic!("expected results, got {:?}", page.view());
        };
        let names: Vec<&str> = cards.iter().map(|c| c.hotel_name.as_str()).collect();
        assert_eq!(names, vec!["Lviv Old Town", "Kyiv Grand"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_is_loading_while_search_waits() {
        let page = Arc::new(SearchPage::new(seeded_api().await, RetryConfig::default()));

        let running = tokio::spawn({
            let page = page.clone();
            async move { page.submit("UA").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(page.is_loading());
        assert_eq!(page.view(), SearchView::Loading);

        running.await.unwrap();
        assert!(!page.is_loading());
        assert!(matches!(page.view(), SearchView::Results(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_error_wins_over_hotel_error() {
        let api = seeded_api().await;
        api.fail_next_polls(3);
        api.fail_next_hotel_requests(1);
        let page = SearchPage::new(api, RetryConfig::default());

        page.submit("UA").await;
        assert_eq!(
            page.view(),
            SearchView::Failed("search results unavailable (poll 3)".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hotel_error_shown_when_search_succeeds() {
        let api = seeded_api().await;
        api.fail_next_hotel_requests(1);
        let page = SearchPage::new(api, RetryConfig::default());

        page.submit("UA").await;
        assert_eq!(
            page.view(),
            SearchView::Failed("hotel service unavailable".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_country_without_offers_is_empty() {
        let page = SearchPage::new(seeded_api().await, RetryConfig::default());

        page.submit("PL").await;
        assert_eq!(page.view(), SearchView::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmitting_same_country_reuses_hotels() {
        let api = seeded_api().await;
        let page = SearchPage::new(api.clone(), RetryConfig::default());

        page.submit("UA").await;
        let (hotels, _) = page.submit("UA").await;

        assert!(matches!(hotels, ResolveOutcome::Cached(_)));
        assert_eq!(api.hotel_calls(), 1);
        assert_eq!(api.start_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_page_ignores_late_results() {
        let page = Arc::new(SearchPage::new(seeded_api().await, RetryConfig::default()));

        let running = tokio::spawn({
            let page = page.clone();
            async move { page.submit("UA").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        page.close();

        let (_, search) = running.await.unwrap();
        assert_eq!(search, SearchOutcome::Superseded);
        assert!(page.orchestrator().snapshot().prices.is_empty());
    }
}
