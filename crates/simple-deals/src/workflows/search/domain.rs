use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Canonical search criteria derived from a user's question.
///
/// Serializes to the provider's `searchQueryState` shape. Only criteria the user asked for
/// are present; everything else is omitted rather than defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(
        rename = "usersSearchTerm",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub search_term: Option<String>,
    #[serde(
        rename = "mapBounds",
        default,
        deserialize_with = "deserialize_partial_bounds",
        skip_serializing_if = "Option::is_none"
    )]
    pub bounds: Option<MapBounds>,
    #[serde(
        rename = "filterState",
        default,
        deserialize_with = "deserialize_null_as_default",
        skip_serializing_if = "SearchFilters::is_empty"
    )]
    pub filters: SearchFilters,
}

impl StructuredSearch {
    /// Human-readable location, e.g. `Austin, TX`, `TX`, or the raw search term.
    pub fn location_label(&self) -> Option<String> {
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => Some(format!("{city}, {state}")),
            (None, Some(state)) => Some(state.clone()),
            (Some(city), None) => Some(city.clone()),
            (None, None) => self.search_term.clone(),
        }
    }

    pub fn flag(&self, flag: PropertyFlag) -> bool {
        self.filters
            .flag_filter(flag)
            .and_then(|filter| filter.value)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Bounds as the model writes them; any corner may be null.
#[derive(Debug, Default, Deserialize)]
struct PartialBounds {
    north: Option<f64>,
    south: Option<f64>,
    east: Option<f64>,
    west: Option<f64>,
}

/// Reads `mapBounds`, yielding `None` unless all four coordinates are numbers.
fn deserialize_partial_bounds<'de, D>(deserializer: D) -> Result<Option<MapBounds>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(partial) = value.and_then(|value| serde_json::from_value::<PartialBounds>(value).ok())
    else {
        return Ok(None);
    };
    Ok(match (partial.north, partial.south, partial.east, partial.west) {
        (Some(north), Some(south), Some(east), Some(west)) => Some(MapBounds {
            north,
            south,
            east,
            west,
        }),
        _ => None,
    })
}

fn deserialize_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MapBounds {
    pub fn is_plausible(&self) -> bool {
        let latitudes = (-90.0..=90.0).contains(&self.north) && (-90.0..=90.0).contains(&self.south);
        let longitudes =
            (-180.0..=180.0).contains(&self.east) && (-180.0..=180.0).contains(&self.west);
        latitudes && longitudes && self.south <= self.north
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<RangeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds: Option<RangeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baths: Option<RangeFilter>,
    #[serde(rename = "mf", default, skip_serializing_if = "Option::is_none")]
    pub multi_family: Option<FlagFilter>,
    #[serde(rename = "con", default, skip_serializing_if = "Option::is_none")]
    pub condo: Option<FlagFilter>,
    #[serde(rename = "apa", default, skip_serializing_if = "Option::is_none")]
    pub apartment: Option<FlagFilter>,
    #[serde(rename = "apco", default, skip_serializing_if = "Option::is_none")]
    pub coop: Option<FlagFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<FlagFilter>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.sort.is_none()
            && self.price.is_none()
            && self.beds.is_none()
            && self.baths.is_none()
            && PropertyFlag::ALL
                .iter()
                .all(|flag| self.flag_filter(*flag).is_none())
    }

    pub fn flag_filter(&self, flag: PropertyFlag) -> Option<&FlagFilter> {
        match flag {
            PropertyFlag::MultiFamily => self.multi_family.as_ref(),
            PropertyFlag::Condo => self.condo.as_ref(),
            PropertyFlag::Apartment => self.apartment.as_ref(),
            PropertyFlag::Coop => self.coop.as_ref(),
            PropertyFlag::Pool => self.pool.as_ref(),
        }
    }

    pub(crate) fn flag_filter_mut(&mut self, flag: PropertyFlag) -> &mut Option<FlagFilter> {
        match flag {
            PropertyFlag::MultiFamily => &mut self.multi_family,
            PropertyFlag::Condo => &mut self.condo,
            PropertyFlag::Apartment => &mut self.apartment,
            PropertyFlag::Coop => &mut self.coop,
            PropertyFlag::Pool => &mut self.pool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyFlag {
    MultiFamily,
    Condo,
    Apartment,
    Coop,
    Pool,
}

impl PropertyFlag {
    pub const ALL: [PropertyFlag; 5] = [
        PropertyFlag::MultiFamily,
        PropertyFlag::Condo,
        PropertyFlag::Apartment,
        PropertyFlag::Coop,
        PropertyFlag::Pool,
    ];

    pub fn wire_key(self) -> &'static str {
        match self {
            PropertyFlag::MultiFamily => "mf",
            PropertyFlag::Condo => "con",
            PropertyFlag::Apartment => "apa",
            PropertyFlag::Coop => "apco",
            PropertyFlag::Pool => "pool",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl RangeFilter {
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// One property returned by the listing provider.
///
/// The typed fields are the ones the summarizer and report rely on; everything else the
/// provider sent is kept in `extra` so callers receive the record unchanged.
///
/// Typed fields are read leniently: a value of an unexpected type becomes `None` instead of
/// rejecting the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    #[serde(
        default,
        deserialize_with = "deserialize_loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub street_address: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub city: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub zipcode: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub bedrooms: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub bathrooms: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub living_area: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_loose_year",
        skip_serializing_if = "Option::is_none"
    )]
    pub year_built: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ListingRecord {
    /// Street line, falling back to the provider's `address` field, which is either a plain
    /// string or an object carrying `streetAddress`.
    pub fn street(&self) -> Option<&str> {
        if let Some(street) = self.street_address.as_deref() {
            return Some(street);
        }
        let address = self.extra.get("address")?;
        let street = match address {
            Value::String(text) => text.as_str(),
            Value::Object(fields) => fields.get("streetAddress")?.as_str()?,
            _ => return None,
        };
        let street = street.trim();
        (!street.is_empty()).then_some(street)
    }
}

/// Accepts `"78701"`, `78701` or `null`.
fn deserialize_loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// Accepts `3`, `2.5`, `"649000"` or `"$649,000"`; anything else reads as `None`.
fn deserialize_loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse::<f64>()
            .ok(),
        _ => None,
    }
    .filter(|number| number.is_finite()))
}

fn deserialize_loose_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let year = deserialize_loose_number(deserializer)?;
    Ok(year
        .filter(|year| year.fract() == 0.0 && (0.0..=9999.0).contains(year))
        .map(|year| year as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_search_serializes_to_empty_object() {
        let search = StructuredSearch::default();
        assert_eq!(serde_json::to_value(&search).expect("serializes"), json!({}));
    }

    #[test]
    fn location_label_prefers_city_and_state() {
        let search = StructuredSearch {
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            search_term: Some("Austin, TX".to_string()),
            ..StructuredSearch::default()
        };
        assert_eq!(search.location_label().as_deref(), Some("Austin, TX"));

        let state_only = StructuredSearch {
            state: Some("AZ".to_string()),
            ..StructuredSearch::default()
        };
        assert_eq!(state_only.location_label().as_deref(), Some("AZ"));
    }

    #[test]
    fn absent_flags_read_as_false() {
        let search = StructuredSearch::default();
        assert!(!search.flag(PropertyFlag::Pool));
    }

    #[test]
    fn listing_record_keeps_unknown_fields_and_loose_zipcodes() {
        let record: ListingRecord = serde_json::from_value(json!({
            "zpid": 29_386_437,
            "address": "1201 Barton Springs Rd",
            "city": "Austin",
            "state": "TX",
            "zipcode": 78704,
            "price": 649_000,
            "bedrooms": 3,
            "bathrooms": 2.5,
            "livingArea": 1_840,
            "yearBuilt": 1998,
            "imgSrc": "https://photos.example/1.jpg"
        }))
        .expect("record parses");

        assert_eq!(record.street(), Some("1201 Barton Springs Rd"));
        assert_eq!(record.zipcode.as_deref(), Some("78704"));
        assert_eq!(record.bathrooms, Some(2.5));
        assert_eq!(record.extra.get("zpid"), Some(&json!(29_386_437)));

        let round_trip = serde_json::to_value(&record).expect("serializes");
        assert_eq!(round_trip["imgSrc"], "https://photos.example/1.jpg");
        assert_eq!(round_trip["address"], "1201 Barton Springs Rd");
    }

    #[test]
    fn listing_record_with_both_address_fields_parses() {
        let record: ListingRecord = serde_json::from_value(json!({
            "streetAddress": "12 Elm St",
            "address": "12 Elm St, Austin, TX 78704"
        }))
        .expect("record parses");
        assert_eq!(record.street(), Some("12 Elm St"));
        assert_eq!(record.extra["address"], "12 Elm St, Austin, TX 78704");
    }

    #[test]
    fn structured_address_object_supplies_the_street() {
        let record: ListingRecord = serde_json::from_value(json!({
            "address": { "streetAddress": "14 Elm St", "city": "Austin", "zipcode": "78704" }
        }))
        .expect("record parses");
        assert!(record.street_address.is_none());
        assert_eq!(record.street(), Some("14 Elm St"));
    }

    #[test]
    fn mistyped_fields_read_as_none_instead_of_failing() {
        let record: ListingRecord = serde_json::from_value(json!({
            "streetAddress": { "line1": "16 Elm St" },
            "price": "$505,000",
            "bedrooms": "three",
            "yearBuilt": "unknown",
            "livingArea": [1840]
        }))
        .expect("record parses");
        assert_eq!(record.street(), None);
        assert_eq!(record.price, Some(505_000.0));
        assert_eq!(record.bedrooms, None);
        assert_eq!(record.year_built, None);
        assert_eq!(record.living_area, None);
    }

    #[test]
    fn null_filter_state_and_partial_bounds_read_as_absent() {
        let search: StructuredSearch = serde_json::from_value(json!({
            "city": "Austin",
            "filterState": null,
            "mapBounds": { "north": null, "south": 30.1, "east": -97.5, "west": -97.9 }
        }))
        .expect("search parses");
        assert!(search.filters.is_empty());
        assert!(search.bounds.is_none());
    }

    #[test]
    fn implausible_bounds_are_detected() {
        let inverted = MapBounds {
            north: 30.1,
            south: 30.5,
            east: -97.5,
            west: -97.9,
        };
        assert!(!inverted.is_plausible());
    }
}
