// Kroger product search with client-credentials OAuth

use crate::upstream::{endpoint, UpstreamClient};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::json;
use toolhost_core::schema::{
    json_schema_array, json_schema_integer_range, json_schema_nullable_number,
    json_schema_nullable_string, json_schema_object, json_schema_string, json_schema_text,
};
use toolhost_core::{
    CachedCredential, CredentialStore, RenderHint, ToolContext, ToolDefinition, ToolError,
    ToolFailure, ToolHandler, ToolReply, UpstreamError,
};
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.kroger.com";

/// Credential store key for the Kroger access token.
pub const CREDENTIAL_KEY: &str = "kroger";

pub const PRODUCT_SCOPE: &str = "product.compact";
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 50;

/// OAuth client credentials issued by the Kroger developer portal.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    token_type: Option<String>,
}

/// Obtains and caches Kroger access tokens.
#[derive(Debug, Clone)]
pub struct KrogerAuth {
    client: UpstreamClient,
    base_url: Url,
    credentials: ClientCredentials,
}

impl KrogerAuth {
    pub fn new(client: UpstreamClient, base_url: Url, credentials: ClientCredentials) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    /// Return a cached token if still valid, otherwise request and store a new one.
    pub async fn access_token(&self, store: &dyn CredentialStore) -> Result<String, UpstreamError> {
        if let Some(cached) = store.valid(CREDENTIAL_KEY).await {
            debug!("Reusing cached Kroger token");
            return Ok(cached.access_token);
        }

        let credential = self.request_token().await?;
        let token = credential.access_token.clone();
        store.set(CREDENTIAL_KEY, credential).await;
        Ok(token)
    }

    async fn request_token(&self) -> Result<CachedCredential, UpstreamError> {
        let url = endpoint(&self.base_url, "v1/connect/oauth2/token", &[])?;
        let form = [("grant_type", "client_credentials"), ("scope", PRODUCT_SCOPE)];

        let response: TokenResponse = self
            .client
            .post_form_basic(
                url,
                &self.credentials.client_id,
                &self.credentials.client_secret,
                &form,
            )
            .await
            .map_err(|e| match e {
                UpstreamError::Status { status, body } if status == 400 || status == 401 => {
                    UpstreamError::Authentication(format!("token request rejected ({}): {}", status, body))
                }
                other => other,
            })?;

        if response.access_token.is_empty() {
            return Err(UpstreamError::Authentication(
                "token response has an empty access_token".to_string(),
            ));
        }

        info!(
            expires_in = ?response.expires_in,
            token_type = ?response.token_type,
            "Obtained Kroger access token"
        );
        Ok(CachedCredential::expiring_in(
            response.access_token,
            response.expires_in,
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearchInput {
    pub term: String,
    #[serde(default, deserialize_with = "whole_number")]
    pub limit: Option<u32>,
    pub location_id: Option<String>,
}

/// JSON Schema counts `5.0` as an integer, so accept whole-valued floats too.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(n) if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) => Ok(Some(n as u32)),
        Some(n) => Err(D::Error::custom(format!("expected a non-negative whole number, got {}", n))),
    }
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    #[serde(default)]
    data: Vec<ProductRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductRecord {
    product_id: String,
    description: Option<String>,
    brand: Option<String>,
    #[serde(default)]
    items: Vec<ItemRecord>,
}

#[derive(Debug, Deserialize)]
struct ItemRecord {
    size: Option<String>,
    price: Option<PriceRecord>,
}

#[derive(Debug, Deserialize)]
struct PriceRecord {
    regular: Option<f64>,
    promo: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: String,
    pub description: String,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub regular_price: Option<f64>,
    /// Kroger reports 0 when there is no promotion; that becomes `None`.
    pub promo_price: Option<f64>,
}

impl From<ProductRecord> for Product {
    fn from(record: ProductRecord) -> Self {
        let item = record.items.into_iter().next();
        let (size, price) = match item {
            Some(item) => (item.size, item.price),
            None => (None, None),
        };

        Self {
            description: record.description.unwrap_or_else(|| record.product_id.clone()),
            product_id: record.product_id,
            brand: record.brand,
            size,
            regular_price: price.as_ref().and_then(|p| p.regular),
            promo_price: price.and_then(|p| p.promo).filter(|p| *p > 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Products {
    pub products: Vec<Product>,
}

/// Handler for `search-grocery-products`.
pub struct ProductSearchHandler {
    client: UpstreamClient,
    base_url: Url,
    auth: KrogerAuth,
}

impl ProductSearchHandler {
    fn products_url(&self, input: &ProductSearchInput) -> Result<Url, UpstreamError> {
        let limit = input.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT).to_string();
        let mut query = vec![("filter.term", input.term.trim()), ("filter.limit", limit.as_str())];
        if let Some(location_id) = input.location_id.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            query.push(("filter.locationId", location_id));
        }
        endpoint(&self.base_url, "v1/products", &query)
    }
}

#[async_trait::async_trait]
impl ToolHandler for ProductSearchHandler {
    type Input = ProductSearchInput;
    type Output = Products;

    async fn call(&self, input: ProductSearchInput, ctx: &ToolContext) -> Result<ToolReply<Products>, ToolFailure> {
        let url = self.products_url(&input)?;
        let token = self.auth.access_token(ctx.credentials.as_ref()).await?;

        let response: ProductsResponse = match self.client.get_json_bearer(url, &token).await {
            Ok(response) => response,
            Err(UpstreamError::Status { status: 401, body }) => {
                ctx.credentials.clear(CREDENTIAL_KEY).await;
                return Err(UpstreamError::Authentication(format!(
                    "product search rejected the access token: {}",
                    body
                ))
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        let term = input.term.trim();
        let products: Vec<Product> = response.data.into_iter().map(Product::from).collect();
        if products.is_empty() {
            return Err(ToolFailure::NoResult(format!(
                "Sorry, I couldn't find any products matching \"{}\".",
                term
            )));
        }

        let text = format!("Found {} product(s) matching \"{}\"", products.len(), term);
        let rows = products
            .iter()
            .map(|p| {
                json!({
                    "description": p.description,
                    "brand": p.brand.as_deref().unwrap_or(""),
                    "size": p.size.as_deref().unwrap_or(""),
                    "price": format_price(p.regular_price, p.promo_price),
                })
            })
            .collect();
        let hint = RenderHint::table(
            &[
                ("description", "Product"),
                ("brand", "Brand"),
                ("size", "Size"),
                ("price", "Price"),
            ],
            rows,
        );

        Ok(ToolReply::new(text, Products { products }).with_render(hint))
    }
}

fn format_price(regular: Option<f64>, promo: Option<f64>) -> String {
    match (regular, promo) {
        (Some(regular), Some(promo)) if promo < regular => format!("${:.2} (sale ${:.2})", regular, promo),
        (Some(regular), _) => format!("${:.2}", regular),
        (None, Some(promo)) => format!("${:.2}", promo),
        (None, None) => "-".to_string(),
    }
}

pub fn product_search_tool(
    client: UpstreamClient,
    base_url: Url,
    credentials: ClientCredentials,
) -> Result<ToolDefinition, ToolError> {
    if credentials.client_id.trim().is_empty() || credentials.client_secret.trim().is_empty() {
        return Err(ToolError::Configuration(
            "search-grocery-products requires a Kroger client id and secret".to_string(),
        ));
    }

    let auth = KrogerAuth::new(client.clone(), base_url.clone(), credentials);

    ToolDefinition::builder("search-grocery-products")
        .name("Search Grocery Products")
        .description("Searches Kroger's product catalog, optionally at a specific store")
        .input_schema(json_schema_object(
            json!({
                "term": json_schema_text("Search term, e.g. milk"),
                "limit": json_schema_integer_range("Maximum number of products", 1, MAX_LIMIT as i64),
                "locationId": json_schema_string("Kroger store id for local pricing")
            }),
            vec!["term"],
        ))
        .output_schema(json_schema_object(
            json!({
                "products": json_schema_array(
                    json_schema_object(
                        json!({
                            "productId": json_schema_string("Kroger product id"),
                            "description": json_schema_string("Product description"),
                            "brand": json_schema_nullable_string("Brand"),
                            "size": json_schema_nullable_string("Package size"),
                            "regularPrice": json_schema_nullable_number("Regular price"),
                            "promoPrice": json_schema_nullable_number("Promotional price")
                        }),
                        vec!["productId", "description"],
                    ),
                    "Matching products"
                )
            }),
            vec!["products"],
        ))
        .pricing(0.0, "USD")
        .failure_message("Sorry, I couldn't search Kroger products right now. Please try again later.")
        .handler(ProductSearchHandler {
            client,
            base_url,
            auth,
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ctx, ctx_with, upstream};
    use std::sync::Arc;
    use toolhost_core::InMemoryCredentialStore;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> ClientCredentials {
        ClientCredentials::new("id", "secret")
    }

    fn products_body() -> serde_json::Value {
        json!({
            "data": [
                {
                    "productId": "0001111041700",
                    "description": "Kroger 2% Reduced Fat Milk",
                    "brand": "Kroger",
                    "items": [{ "size": "1 gal", "price": { "regular": 3.49, "promo": 2.99 } }]
                },
                {
                    "productId": "0002340006000",
                    "description": "Horizon Organic Whole Milk",
                    "brand": "Horizon Organic",
                    "items": [{ "size": "half gal", "price": { "regular": 5.29, "promo": 0 } }]
                }
            ],
            "meta": { "pagination": { "start": 0, "limit": 10, "total": 2 } }
        })
    }

    async fn mount_token(server: &MockServer, token: &str, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/connect/oauth2/token"))
            .and(header("Authorization", "Basic aWQ6c2VjcmV0"))
            .and(body_string("grant_type=client_credentials&scope=product.compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "expires_in": 1800,
                "token_type": "bearer"
            })))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[test]
    fn test_product_mapping() {
        let record: ProductRecord = serde_json::from_value(json!({
            "productId": "1",
            "brand": "Kroger",
            "items": [{ "size": "12 ct", "price": { "regular": 4.0, "promo": 0.0 } }]
        }))
        .unwrap();

        let product = Product::from(record);
        assert_eq!(product.description, "1");
        assert_eq!(product.size.as_deref(), Some("12 ct"));
        assert_eq!(product.regular_price, Some(4.0));
        assert_eq!(product.promo_price, None);
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(Some(3.49), Some(2.99)), "$3.49 (sale $2.99)");
        assert_eq!(format_price(Some(3.49), None), "$3.49");
        assert_eq!(format_price(None, None), "-");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let shown = format!("{:?}", credentials());
        assert!(shown.contains("id"));
        assert!(!shown.contains("\"secret\""));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_requires_credentials() {
        let client = UpstreamClient::new(Default::default()).unwrap();
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();

        let err = product_search_tool(client, base, ClientCredentials::new("id", "")).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_search_acquires_token_then_searches() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-1", 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .and(query_param("filter.term", "milk"))
            .and(query_param("filter.limit", "5"))
            .and(query_param("filter.locationId", "01400943"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(products_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();

        let result = tool
            .invoke(json!({"term": "milk", "limit": 5, "locationId": "01400943"}), &ctx())
            .await
            .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["products"][0]["productId"], "0001111041700");
        assert_eq!(data["products"][0]["promoPrice"], 2.99);
        assert!(data["products"][1]["promoPrice"].is_null());
        assert_eq!(result.text, "Found 2 product(s) matching \"milk\"");
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-1", 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(products_body()))
            .expect(2)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();
        let store = Arc::new(InMemoryCredentialStore::new());

        for _ in 0..2 {
            let result = tool
                .invoke(json!({"term": "eggs"}), &ctx_with(store.clone()))
                .await
                .unwrap();
            assert!(!result.is_failure());
        }

        assert_eq!(store.get(CREDENTIAL_KEY).await.unwrap().access_token, "tok-1");
    }

    #[tokio::test]
    async fn test_expired_token_is_replaced() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-new", 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .and(header("Authorization", "Bearer tok-new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(products_body()))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .set(CREDENTIAL_KEY, CachedCredential::expiring_in("tok-old", Some(10)))
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();

        let result = tool
            .invoke(json!({"term": "bread"}), &ctx_with(store.clone()))
            .await
            .unwrap();
        assert!(!result.is_failure());
        assert_eq!(store.get(CREDENTIAL_KEY).await.unwrap().access_token, "tok-new");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_cached_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_token"))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .set(CREDENTIAL_KEY, CachedCredential::expiring_in("revoked", Some(1800)))
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();

        let result = tool
            .invoke(json!({"term": "milk"}), &ctx_with(store.clone()))
            .await
            .unwrap();

        assert!(result.is_failure());
        assert!(store.get(CREDENTIAL_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_client_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/connect/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let auth = KrogerAuth::new(client.clone(), base.clone(), credentials());
        let store = InMemoryCredentialStore::new();
        let err = auth.access_token(&store).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Authentication(_)));

        let tool = product_search_tool(client, base, credentials()).unwrap();
        let result = tool.invoke(json!({"term": "milk"}), &ctx()).await.unwrap();
        assert!(result.is_failure());
        assert!(result.text.starts_with("Sorry, I couldn't search Kroger products"));
    }

    #[tokio::test]
    async fn test_limit_out_of_range_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();

        let err = tool
            .invoke(json!({"term": "milk", "limit": 500}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InputValidation { .. }));
    }

    #[tokio::test]
    async fn test_whole_float_limit_accepted() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-1", 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .and(query_param("filter.term", "milk"))
            .and(query_param("filter.limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(products_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();

        let result = tool
            .invoke(json!({"term": "milk", "limit": 5.0}), &ctx())
            .await
            .unwrap();
        assert!(!result.is_failure());
    }

    #[tokio::test]
    async fn test_fractional_limit_reports_field() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();

        let err = tool
            .invoke(json!({"term": "milk", "limit": 5.5}), &ctx())
            .await
            .unwrap_err();
        match err {
            ToolError::InputValidation { violations, .. } => {
                assert!(!violations.is_empty());
                assert!(violations.iter().all(|v| v.path == "/limit"));
            }
            other => panic!("Expected InputValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_limit_deserializes_whole_numbers() {
        let input: ProductSearchInput = serde_json::from_value(json!({"term": "milk", "limit": 7.0})).unwrap();
        assert_eq!(input.limit, Some(7));

        let input: ProductSearchInput = serde_json::from_value(json!({"term": "milk", "limit": 7})).unwrap();
        assert_eq!(input.limit, Some(7));

        let input: ProductSearchInput = serde_json::from_value(json!({"term": "milk"})).unwrap();
        assert_eq!(input.limit, None);

        assert!(serde_json::from_value::<ProductSearchInput>(json!({"term": "milk", "limit": 7.5})).is_err());
        assert!(serde_json::from_value::<ProductSearchInput>(json!({"term": "milk", "limit": -1})).is_err());
    }

    #[tokio::test]
    async fn test_blank_term_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = product_search_tool(client, base, credentials()).unwrap();

        let err = tool.invoke(json!({"term": "   "}), &ctx()).await.unwrap_err();
        match err {
            ToolError::InputValidation { violations, .. } => assert_eq!(violations[0].path, "/term"),
            other => panic!("Expected InputValidation, got {:?}", other),
        }
    }
}
