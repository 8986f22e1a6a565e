// Recipe tools backed by TheMealDB

use crate::upstream::{endpoint, UpstreamClient};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use toolhost_core::extract::{first_or, indexed_pairs, non_empty_lines};
use toolhost_core::schema::{
    json_schema_array, json_schema_nullable_string, json_schema_object, json_schema_string,
    json_schema_text,
};
use toolhost_core::{
    RenderHint, ToolContext, ToolDefinition, ToolError, ToolFailure, ToolHandler, ToolReply,
};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.themealdb.com/api/json/v1/1";

/// TheMealDB numbers ingredient/measure fields 1 through 20.
pub const INGREDIENT_SLOTS: usize = 20;

/// Filtered listings shown as image cards; `data` keeps every match.
const MAX_LISTING_CARDS: usize = 10;

/// `{"meals": [...] | null}`, the envelope of every TheMealDB endpoint.
#[derive(Debug, Deserialize)]
struct MealsResponse<T> {
    meals: Option<Vec<T>>,
}

/// A full meal record. Numbered ingredient fields stay in `fields`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MealRecord {
    id_meal: String,
    str_meal: String,
    str_category: Option<String>,
    str_area: Option<String>,
    str_instructions: Option<String>,
    str_meal_thumb: Option<String>,
    str_youtube: Option<String>,
    str_tags: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl MealRecord {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    fn into_recipe(self) -> Recipe {
        let ingredients = indexed_pairs(INGREDIENT_SLOTS, "strIngredient", "strMeasure", |name| {
            self.field(name)
        });
        let instructions = self
            .str_instructions
            .as_deref()
            .map(non_empty_lines)
            .unwrap_or_default();
        let tags = self
            .str_tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Recipe {
            id: self.id_meal,
            name: self.str_meal,
            category: non_blank(self.str_category),
            area: non_blank(self.str_area),
            instructions,
            ingredients,
            thumbnail: non_blank(self.str_meal_thumb),
            youtube: non_blank(self.str_youtube),
            tags,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub area: Option<String>,
    pub instructions: Vec<String>,
    pub ingredients: Vec<String>,
    pub thumbnail: Option<String>,
    pub youtube: Option<String>,
    pub tags: Vec<String>,
}

impl Recipe {
    fn summary(&self) -> String {
        let origin = match (&self.area, &self.category) {
            (Some(area), Some(category)) => format!(" ({} {})", area, category),
            (Some(only), None) | (None, Some(only)) => format!(" ({})", only),
            (None, None) => String::new(),
        };
        format!(
            "{}{}: {} ingredients, {} steps",
            self.name,
            origin,
            self.ingredients.len(),
            self.instructions.len()
        )
    }

    fn render(&self) -> RenderHint {
        let description = [self.area.as_deref(), self.category.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" · ");

        RenderHint::image_card(&self.name, self.thumbnail.as_deref(), description)
            .with_child(RenderHint::card("Ingredients", self.ingredients.join("\n")))
            .with_child(RenderHint::card("Instructions", self.instructions.join("\n")))
    }
}

fn recipe_schema() -> Value {
    json_schema_object(
        serde_json::json!({
            "id": json_schema_string("TheMealDB meal id"),
            "name": json_schema_string("Meal name"),
            "category": json_schema_nullable_string("Meal category"),
            "area": json_schema_nullable_string("Cuisine / area of origin"),
            "instructions": json_schema_array(json_schema_string("Step"), "Preparation steps"),
            "ingredients": json_schema_array(json_schema_string("Ingredient - measure"), "Ingredients with measures"),
            "thumbnail": json_schema_nullable_string("Image URL"),
            "youtube": json_schema_nullable_string("Video URL"),
            "tags": json_schema_array(json_schema_string("Tag"), "Tags")
        }),
        vec!["id", "name", "category", "area", "instructions", "ingredients", "thumbnail", "youtube", "tags"],
    )
}

fn reply_with_recipe(recipe: Recipe) -> ToolReply<Recipe> {
    let text = recipe.summary();
    let hint = recipe.render();
    ToolReply::new(text, recipe).with_render(hint)
}

// Search by name

#[derive(Debug, Deserialize)]
pub struct SearchRecipeInput {
    pub name: String,
}

/// Handler for `search-recipe`.
pub struct SearchRecipeHandler {
    client: UpstreamClient,
    base_url: Url,
}

#[async_trait::async_trait]
impl ToolHandler for SearchRecipeHandler {
    type Input = SearchRecipeInput;
    type Output = Recipe;

    async fn call(&self, input: SearchRecipeInput, _ctx: &ToolContext) -> Result<ToolReply<Recipe>, ToolFailure> {
        let name = input.name.trim();
        let url = endpoint(&self.base_url, "search.php", &[("s", name)])?;
        let response: MealsResponse<MealRecord> = self.client.get_json(url).await?;

        let meal = first_or(response.meals, "meals").map_err(|_| {
            ToolFailure::NoResult(format!("Sorry, I couldn't find a recipe called \"{}\".", name))
        })?;

        Ok(reply_with_recipe(meal.into_recipe()))
    }
}

pub fn search_recipe_tool(client: UpstreamClient, base_url: Url) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::builder("search-recipe")
        .name("Search Recipe")
        .description("Finds a recipe by meal name and returns its ingredients and instructions")
        .input_schema(json_schema_object(
            serde_json::json!({ "name": json_schema_text("Meal name to search for, e.g. Arrabiata") }),
            vec!["name"],
        ))
        .output_schema(recipe_schema())
        .pricing(0.0, "USD")
        .failure_message("Sorry, I couldn't reach the recipe database right now. Please try again later.")
        .handler(SearchRecipeHandler { client, base_url })
        .build()
}

// Random recipe

#[derive(Debug, Default, Deserialize)]
pub struct RandomRecipeInput {}

/// Handler for `random-recipe`.
pub struct RandomRecipeHandler {
    client: UpstreamClient,
    base_url: Url,
}

#[async_trait::async_trait]
impl ToolHandler for RandomRecipeHandler {
    type Input = RandomRecipeInput;
    type Output = Recipe;

    async fn call(&self, _input: RandomRecipeInput, _ctx: &ToolContext) -> Result<ToolReply<Recipe>, ToolFailure> {
        let url = endpoint(&self.base_url, "random.php", &[])?;
        let response: MealsResponse<MealRecord> = self.client.get_json(url).await?;

        let meal = first_or(response.meals, "random meal")?;
        Ok(reply_with_recipe(meal.into_recipe()))
    }
}

pub fn random_recipe_tool(client: UpstreamClient, base_url: Url) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::builder("random-recipe")
        .name("Random Recipe")
        .description("Suggests a random recipe")
        .input_schema(json_schema_object(serde_json::json!({}), vec![]))
        .output_schema(recipe_schema())
        .pricing(0.0, "USD")
        .failure_message("Sorry, I couldn't fetch a random recipe right now. Please try again later.")
        .handler(RandomRecipeHandler { client, base_url })
        .build()
}

// Filter by ingredient, category or area

/// What a filter value refers to; each maps to its own query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Ingredient,
    Category,
    Area,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::Ingredient, FilterKind::Category, FilterKind::Area];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Ingredient => "ingredient",
            FilterKind::Category => "category",
            FilterKind::Area => "area",
        }
    }

    pub fn query_param(&self) -> &'static str {
        match self {
            FilterKind::Ingredient => "i",
            FilterKind::Category => "c",
            FilterKind::Area => "a",
        }
    }
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Unknown filter type \"{}\". Use one of: ingredient, category, area.",
                    s
                )
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRecipesInput {
    pub filter_type: String,
    pub filter_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MealSummaryRecord {
    id_meal: String,
    str_meal: String,
    str_meal_thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealSummary {
    pub id: String,
    pub name: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredMeals {
    pub meals: Vec<MealSummary>,
}

/// Handler for `filter-recipes`.
pub struct FilterRecipesHandler {
    client: UpstreamClient,
    base_url: Url,
}

#[async_trait::async_trait]
impl ToolHandler for FilterRecipesHandler {
    type Input = FilterRecipesInput;
    type Output = FilteredMeals;

    async fn call(
        &self,
        input: FilterRecipesInput,
        _ctx: &ToolContext,
    ) -> Result<ToolReply<FilteredMeals>, ToolFailure> {
        let kind: FilterKind = input.filter_type.parse().map_err(ToolFailure::Rejected)?;
        let value = input.filter_value.trim();

        let url = endpoint(&self.base_url, "filter.php", &[(kind.query_param(), value)])?;
        let response: MealsResponse<MealSummaryRecord> = self.client.get_json(url).await?;

        let meals: Vec<MealSummary> = response
            .meals
            .unwrap_or_default()
            .into_iter()
            .map(|m| MealSummary {
                id: m.id_meal,
                name: m.str_meal,
                thumbnail: non_blank(m.str_meal_thumb),
            })
            .collect();

        if meals.is_empty() {
            return Err(ToolFailure::NoResult(format!(
                "Sorry, I couldn't find any recipes with {} \"{}\".",
                kind.as_str(),
                value
            )));
        }

        let text = format!(
            "Found {} recipe(s) with {} \"{}\"",
            meals.len(),
            kind.as_str(),
            value
        );
        let cards = meals.iter().take(MAX_LISTING_CARDS).map(|m| {
            RenderHint::image_card(&m.name, m.thumbnail.as_deref(), format!("Meal #{}", m.id))
        });
        let hint = RenderHint::card("Recipes", text.clone()).with_children(cards);

        Ok(ToolReply::new(text, FilteredMeals { meals }).with_render(hint))
    }
}

pub fn filter_recipes_tool(client: UpstreamClient, base_url: Url) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::builder("filter-recipes")
        .name("Filter Recipes")
        .description("Lists recipes by main ingredient, category or area")
        .input_schema(json_schema_object(
            serde_json::json!({
                "filterType": json_schema_string("What to filter by: ingredient, category or area"),
                "filterValue": json_schema_text("Value to filter by, e.g. chicken_breast, Seafood, Italian")
            }),
            vec!["filterType", "filterValue"],
        ))
        .output_schema(json_schema_object(
            serde_json::json!({
                "meals": json_schema_array(
                    json_schema_object(
                        serde_json::json!({
                            "id": json_schema_string("TheMealDB meal id"),
                            "name": json_schema_string("Meal name"),
                            "thumbnail": json_schema_nullable_string("Image URL")
                        }),
                        vec!["id", "name", "thumbnail"],
                    ),
                    "Matching meals"
                )
            }),
            vec!["meals"],
        ))
        .pricing(0.0, "USD")
        .failure_message("Sorry, I couldn't reach the recipe database right now. Please try again later.")
        .handler(FilterRecipesHandler { client, base_url })
        .build()
}

/// All recipe tools against one TheMealDB base URL.
pub fn tools(client: &UpstreamClient, base_url: &Url) -> Result<Vec<ToolDefinition>, ToolError> {
    Ok(vec![
        search_recipe_tool(client.clone(), base_url.clone())?,
        random_recipe_tool(client.clone(), base_url.clone())?,
        filter_recipes_tool(client.clone(), base_url.clone())?,
    ])
}
