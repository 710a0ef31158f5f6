//! Gateways to the external listing, market and street-view providers.

pub mod domain;
pub mod listings;
pub mod market;
pub mod rapidapi;
pub mod street_view;

pub use domain::{
    FlagFilter, ListingRecord, MapBounds, PropertyFlag, RangeFilter, SearchFilters,
    StructuredSearch,
};
pub use listings::{search_url, ListingSearch, ZillowListingSearch};
pub use market::{
    GoogleSearchKeys, MarketDataGateway, MarketLocation, MarketQuery, MarketSnapshot,
    MarketSources, RapidApiMarketSources,
};
pub use rapidapi::{GatewayError, RapidApiClient};
pub use street_view::{parse_location, HttpStreetView, StreetViewSource};
