// Destination picker state: autocomplete options, the chosen entity, and which country a search runs for

use std::sync::Arc;

use thiserror::Error;

use crate::{
    api::{ApiError, TourApi},
    types::{GeoEntity, HotelLite},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    #[error("choose a destination first")]
    NothingSelected,

    #[error("choose a country or a place with a known country to start a search")]
    NoCountry,

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct SearchForm<A: TourApi> {
    api: Arc<A>,
    query: String,
    options: Vec<GeoEntity>,
    selected: Option<GeoEntity>,
}

impl<A: TourApi> SearchForm<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            query: String::new(),
            options: Vec::new(),
            selected: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn options(&self) -> &[GeoEntity] {
        &self.options
    }

    pub fn selected(&self) -> Option<&GeoEntity> {
        self.selected.as_ref()
    }

    pub async fn load_countries(&mut self) -> Result<(), FormError> {
        let countries = self.api.countries().await?;
        self.options = countries.into_values().map(GeoEntity::Country).collect();
        Ok(())
    }

    // Typing in the box: blank input shows countries, anything else asks the geo search
    pub async fn search(&mut self, query: &str) -> Result<(), FormError> {
        self.query = query.to_string();

        if query.trim().is_empty() {
            return self.load_countries().await;
        }

        let found = self.api.search_geo(query).await?;
        self.options = found.into_values().collect();
        Ok(())
    }

    // Re-opening the dropdown: countries unless a city or hotel is already picked
    pub async fn focus(&mut self) -> Result<(), FormError> {
        if matches!(self.selected, None | Some(GeoEntity::Country(_))) {
            return self.load_countries().await;
        }

        let found = self.api.search_geo(&self.query).await?;
        self.options = found.into_values().collect();
        Ok(())
    }

    pub fn select(&mut self, entity: GeoEntity) {
        self.query = entity.name().to_string();
        self.selected = Some(entity);
    }

    pub async fn clear(&mut self) -> Result<(), FormError> {
        self.query.clear();
        self.selected = None;
        self.load_countries().await
    }

    pub fn country_to_search(&self) -> Result<String, FormError> {
        match &self.selected {
            None => Err(FormError::NothingSelected),
            Some(GeoEntity::Country(country)) => Ok(country.id.clone()),
            Some(GeoEntity::Hotel(HotelLite {
                country_id: Some(country_id),
                ..
            })) => Ok(country_id.clone()),
            Some(_) => self
                .options
                .iter()
                .find_map(|option| match option {
                    GeoEntity::Country(country) => Some(country.id.clone()),
                    _ => None,
                })
                .ok_or(FormError::NoCountry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock_server::MockTourApi,
        types::{CityLite, CountryLite},
    };
    use tokio_test::{assert_err, assert_ok};

    fn country(id: &str, name: &str) -> CountryLite {
        CountryLite {
            id: id.to_string(),
            name: name.to_string(),
            flag: None,
        }
    }

    async fn seeded_api() -> Arc<MockTourApi> {
        let api = Arc::new(MockTourApi::new());
        api.add_country(country("115", "Turkey")).await;
        api.add_country(country("43", "Egypt")).await;
        api.add_geo(GeoEntity::City(CityLite {
            id: "712".to_string(),
            name: "Antalya".to_string(),
        }))
        .await;
        api.add_geo(GeoEntity::Hotel(HotelLite {
            id: "7953".to_string(),
            name: "Antalya Marlin Inn".to_string(),
            country_id: Some("115".to_string()),
        }))
        .await;
        api
    }

    #[tokio::test]
    async fn test_blank_query_lists_countries() {
        let mut form = SearchForm::new(seeded_api().await);

        assert_ok!(form.search("   ").await);
        assert_eq!(form.options().len(), 2);
        assert!(form
            .options()
            .iter()
            .all(|o| matches!(o, GeoEntity::Country(_))));
    }

    #[tokio::test]
    async fn test_query_uses_geo_search() {
        let mut form = SearchForm::new(seeded_api().await);

        assert_ok!(form.search("antal").await);
        let names: Vec<&str> = form.options().iter().map(|o| o.name()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Antalya"));
        assert!(names.contains(&"Antalya Marlin Inn"));
    }

    #[tokio::test]
    async fn test_country_selection_is_searched_directly() {
        let mut form = SearchForm::new(seeded_api().await);
        assert_eq!(form.country_to_search(), Err(FormError::NothingSelected));

        form.select(GeoEntity::Country(country("43", "Egypt")));
        assert_eq!(form.query(), "Egypt");
        assert_eq!(form.country_to_search(), Ok("43".to_string()));
    }

    #[tokio::test]
    async fn test_hotel_selection_uses_its_country() {
        let mut form = SearchForm::new(seeded_api().await);
        form.select(GeoEntity::Hotel(HotelLite {
            id: "7953".to_string(),
            name: "Antalya Marlin Inn".to_string(),
            country_id: Some("115".to_string()),
        }));

        assert_eq!(form.country_to_search(), Ok("115".to_string()));
    }

    #[tokio::test]
    async fn test_city_falls_back_to_first_country_option() {
        let mut form = SearchForm::new(seeded_api().await);

        assert_ok!(form.search("antal").await);
        form.select(GeoEntity::City(CityLite {
            id: "712".to_string(),
            name: "Antalya".to_string(),
        }));
        assert_err!(form.country_to_search());

        // re-focusing with a city picked keeps the geo results; clearing brings countries back
        assert_ok!(form.focus().await);
        assert_eq!(form.country_to_search(), Err(FormError::NoCountry));

        assert_ok!(form.clear().await);
        assert!(form.selected().is_none());
        form.select(GeoEntity::City(CityLite {
            id: "712".to_string(),
            name: "Antalya".to_string(),
        }));
        // options are countries now, BTreeMap order puts "115" before "43"
        assert_eq!(form.country_to_search(), Ok("115".to_string()));
    }
}
