// Grocery-store search over a places text-search API, limited to known chains

use crate::upstream::{endpoint, UpstreamClient};
use serde::{Deserialize, Serialize};
use serde_json::json;
use toolhost_core::schema::{
    json_schema_array, json_schema_nullable_number, json_schema_nullable_string,
    json_schema_object, json_schema_string, json_schema_text,
};
use toolhost_core::{
    RenderHint, ToolContext, ToolDefinition, ToolError, ToolFailure, ToolHandler, ToolReply,
    UpstreamError,
};
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

/// Retail chains kept in search results when no list is configured.
pub const DEFAULT_BRANDS: &[&str] = &[
    "Kroger",
    "Walmart",
    "Target",
    "Whole Foods",
    "Trader Joe's",
    "Safeway",
    "Costco",
    "Aldi",
    "Publix",
    "H-E-B",
    "Albertsons",
    "Wegmans",
    "Meijer",
    "Sprouts",
];

/// Case-insensitive allow-list of chain names.
#[derive(Debug, Clone)]
pub struct BrandFilter {
    brands: Vec<String>,
}

impl BrandFilter {
    pub fn new<I, S>(brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            brands: brands
                .into_iter()
                .map(|b| b.as_ref().trim().to_lowercase())
                .filter(|b| !b.is_empty())
                .collect(),
        }
    }

    /// True when `name` contains one of the chain names.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.brands.iter().any(|brand| name.contains(brand.as_str()))
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }
}

impl Default for BrandFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BRANDS)
    }
}

#[derive(Debug, Deserialize)]
pub struct FindStoresInput {
    pub location: String,
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceRecord>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceRecord {
    name: String,
    formatted_address: Option<String>,
    rating: Option<f64>,
    place_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryStore {
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub place_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroceryStores {
    pub stores: Vec<GroceryStore>,
}

/// Handler for `find-grocery-stores`.
pub struct FindStoresHandler {
    client: UpstreamClient,
    base_url: Url,
    api_key: String,
    brands: BrandFilter,
}

#[async_trait::async_trait]
impl ToolHandler for FindStoresHandler {
    type Input = FindStoresInput;
    type Output = GroceryStores;

    async fn call(&self, input: FindStoresInput, _ctx: &ToolContext) -> Result<ToolReply<GroceryStores>, ToolFailure> {
        let location = input.location.trim();
        let query = format!("grocery stores in {}", location);
        let url = endpoint(
            &self.base_url,
            "textsearch/json",
            &[("query", query.as_str()), ("key", self.api_key.as_str())],
        )?;

        let response: PlacesResponse = self.client.get_json(url).await?;
        match response.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            "REQUEST_DENIED" => {
                return Err(UpstreamError::Authentication(
                    response.error_message.unwrap_or_else(|| "places request denied".to_string()),
                )
                .into())
            }
            other => {
                return Err(UpstreamError::Api {
                    code: other.to_string(),
                    message: response.error_message.unwrap_or_default(),
                }
                .into())
            }
        }

        let total = response.results.len();
        let stores: Vec<GroceryStore> = response
            .results
            .into_iter()
            .filter(|place| self.brands.matches(&place.name))
            .map(|place| GroceryStore {
                name: place.name,
                address: place.formatted_address,
                rating: place.rating,
                place_id: place.place_id,
            })
            .collect();
        debug!(total, kept = stores.len(), "Filtered places by brand");

        if stores.is_empty() {
            return Err(ToolFailure::NoResult(format!(
                "Sorry, I couldn't find any major grocery stores near {}.",
                location
            )));
        }

        let text = format!("Found {} grocery store(s) near {}", stores.len(), location);
        let rows = stores
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "address": s.address.as_deref().unwrap_or(""),
                    "rating": s.rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "-".to_string()),
                })
            })
            .collect();
        let hint = RenderHint::table(
            &[("name", "Store"), ("address", "Address"), ("rating", "Rating")],
            rows,
        );

        Ok(ToolReply::new(text, GroceryStores { stores }).with_render(hint))
    }
}

pub fn find_stores_tool(
    client: UpstreamClient,
    base_url: Url,
    api_key: impl Into<String>,
    brands: BrandFilter,
) -> Result<ToolDefinition, ToolError> {
    let api_key = api_key.into();
    if api_key.trim().is_empty() {
        return Err(ToolError::Configuration(
            "find-grocery-stores requires a places API key".to_string(),
        ));
    }

    ToolDefinition::builder("find-grocery-stores")
        .name("Find Grocery Stores")
        .description("Finds major grocery chain stores near a location")
        .input_schema(json_schema_object(
            json!({ "location": json_schema_text("City, address or area, e.g. Columbus, OH") }),
            vec!["location"],
        ))
        .output_schema(json_schema_object(
            json!({
                "stores": json_schema_array(
                    json_schema_object(
                        json!({
                            "name": json_schema_string("Store name"),
                            "address": json_schema_nullable_string("Street address"),
                            "rating": json_schema_nullable_number("Average rating"),
                            "placeId": json_schema_string("Places id")
                        }),
                        vec!["name", "placeId"],
                    ),
                    "Stores from known chains"
                )
            }),
            vec!["stores"],
        ))
        .pricing(0.0, "USD")
        .failure_message("Sorry, I couldn't search for grocery stores right now. Please try again later.")
        .handler(FindStoresHandler {
            client,
            base_url,
            api_key,
            brands,
        })
        .build()
}
