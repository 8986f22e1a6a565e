use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolhost_core::{ServiceMetadata, ToolRegistry, ToolService};
use toolhost_tools::{
    grocery, kroger, recipes, weather, BrandFilter, ClientCredentials, RetryConfig,
    UpstreamClient, UpstreamConfig,
};
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub upstream: UpstreamSection,

    #[serde(default)]
    pub tools: ToolsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_author")]
    pub author: String,

    #[serde(default = "default_tags")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub logo: Option<String>,

    /// Environment variable holding the key callers must present on invoke.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_title() -> String {
    "Toolhost".to_string()
}

fn default_description() -> String {
    "Weather, recipe and grocery tools for agents".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_author() -> String {
    "Toolhost Contributors".to_string()
}

fn default_tags() -> Vec<String> {
    vec!["weather".to_string(), "recipes".to_string(), "grocery".to_string()]
}

fn default_api_key_env() -> String {
    "TOOLHOST_API_KEY".to_string()
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: default_description(),
            version: default_version(),
            author: default_author(),
            tags: default_tags(),
            logo: None,
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub max_retries: u32,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

impl UpstreamSection {
    pub fn client_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            retry_config: RetryConfig::with_retries(self.max_retries),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsSection {
    #[serde(default)]
    pub weather: WeatherTools,

    #[serde(default)]
    pub recipes: RecipeTools,

    #[serde(default)]
    pub grocery_stores: GroceryStoreTools,

    #[serde(default)]
    pub grocery_products: GroceryProductTools,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherTools {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_weather_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeTools {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_recipes_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroceryStoreTools {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_places_url")]
    pub base_url: String,

    #[serde(default = "default_places_key_env")]
    pub api_key_env: String,

    /// Chain names kept in results; the built-in list is used when empty.
    #[serde(default)]
    pub brands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroceryProductTools {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_kroger_url")]
    pub base_url: String,

    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,
}

fn default_true() -> bool {
    true
}

fn default_weather_url() -> String {
    weather::DEFAULT_BASE_URL.to_string()
}

fn default_recipes_url() -> String {
    recipes::DEFAULT_BASE_URL.to_string()
}

fn default_places_url() -> String {
    grocery::DEFAULT_BASE_URL.to_string()
}

fn default_places_key_env() -> String {
    "PLACES_API_KEY".to_string()
}

fn default_kroger_url() -> String {
    kroger::DEFAULT_BASE_URL.to_string()
}

fn default_client_id_env() -> String {
    "KROGER_CLIENT_ID".to_string()
}

fn default_client_secret_env() -> String {
    "KROGER_CLIENT_SECRET".to_string()
}

impl Default for WeatherTools {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_weather_url(),
        }
    }
}

impl Default for RecipeTools {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_recipes_url(),
        }
    }
}

impl Default for GroceryStoreTools {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_places_url(),
            api_key_env: default_places_key_env(),
            brands: Vec::new(),
        }
    }
}

impl Default for GroceryProductTools {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_kroger_url(),
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")
        } else {
            tracing::info!(
                path = %config_path.display(),
                "Configuration file not found, using defaults"
            );
            Ok(Self::default())
        }
    }

    pub fn metadata(&self) -> ServiceMetadata {
        ServiceMetadata {
            title: self.service.title.clone(),
            description: self.service.description.clone(),
            version: self.service.version.clone(),
            author: self.service.author.clone(),
            tags: self.service.tags.clone(),
            logo: self.service.logo.clone(),
        }
    }

    /// Build the service, reading secrets through `env`.
    pub fn build_service<F>(&self, env: F) -> Result<ToolService>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client = UpstreamClient::new(self.upstream.client_config())?;
        let mut registry = ToolRegistry::new();

        if self.tools.weather.enabled {
            let base = parse_base_url("tools.weather", &self.tools.weather.base_url)?;
            registry.register_all(weather::tools(&client, &base)?)?;
        }

        if self.tools.recipes.enabled {
            let base = parse_base_url("tools.recipes", &self.tools.recipes.base_url)?;
            registry.register_all(recipes::tools(&client, &base)?)?;
        }

        let stores = &self.tools.grocery_stores;
        if stores.enabled {
            let base = parse_base_url("tools.grocery_stores", &stores.base_url)?;
            let api_key = require_env(&env, &stores.api_key_env)?;
            let brands = if stores.brands.is_empty() {
                BrandFilter::default()
            } else {
                BrandFilter::new(&stores.brands)
            };
            registry.register(grocery::find_stores_tool(client.clone(), base, api_key, brands)?)?;
        }

        let products = &self.tools.grocery_products;
        if products.enabled {
            let base = parse_base_url("tools.grocery_products", &products.base_url)?;
            let credentials = ClientCredentials::new(
                require_env(&env, &products.client_id_env)?,
                require_env(&env, &products.client_secret_env)?,
            );
            registry.register(kroger::product_search_tool(client.clone(), base, credentials)?)?;
        }

        tracing::info!(tools = ?registry.ids(), "Registered tools");

        let mut service = ToolService::new(self.metadata(), registry);
        match env(&self.service.api_key_env).filter(|key| !key.is_empty()) {
            Some(key) => service = service.with_api_key(key),
            None => tracing::warn!(
                env = %self.service.api_key_env,
                "No API key configured, tool invocation is unauthenticated"
            ),
        }

        Ok(service)
    }
}

fn parse_base_url(section: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("Invalid base_url in [{}]: {}", section, raw))
}

fn require_env<F>(env: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(name)
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("Environment variable {} is required but not set", name))
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ToolService>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let service = config.build_service(|name| std::env::var(name).ok())?;
        Ok(Self::from_service(service))
    }

    pub fn from_service(service: ToolService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
