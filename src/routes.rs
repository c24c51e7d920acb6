// Navigation targets; identifiers are passed through untouched

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Search,
    Tour { hotel_id: String, price_id: String },
}

impl Route {
    pub fn tour(hotel_id: impl Into<String>, price_id: impl Into<String>) -> Self {
        Route::Tour {
            hotel_id: hotel_id.into(),
            price_id: price_id.into(),
        }
    }

    pub fn parse(path: &str) -> Option<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Some(Route::Search);
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        match segments.as_slice() {
            ["tour", hotel_id, price_id] if !hotel_id.is_empty() && !price_id.is_empty() => {
                Some(Route::tour(*hotel_id, *price_id))
            }
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Search => "/".to_string(),
            Route::Tour { hotel_id, price_id } => format!("/tour/{}/{}", hotel_id, price_id),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
