//! Request and response bodies of the three assistant routes, and the
//! handlers that run them through the gate.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::assistant::AssistantModel;
use crate::error::AssistantError;
use crate::gate::RequestGate;
use crate::output::{MealPlan, ShoppingList};

fn default_target_calories() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealPlanRequest {
    #[serde(default)]
    pub forbidden_products: Vec<String>,
    #[serde(default)]
    pub available_products: Vec<String>,
    #[serde(default = "default_target_calories")]
    pub target_calories: String,
}

impl Default for MealPlanRequest {
    fn default() -> Self {
        Self {
            forbidden_products: Vec::new(),
            available_products: Vec::new(),
            target_calories: default_target_calories(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRequest {
    pub product: String,
    #[serde(default)]
    pub forbidden_products: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingListRequest {
    #[serde(default)]
    pub dishes: Vec<String>,
    #[serde(default)]
    pub forbidden_products: Vec<String>,
}

pub type MealPlanResponse = MealPlan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub recipe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingListResponse {
    pub shopping_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    MealPlan,
    Recipe,
    ShoppingList,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::MealPlan => "/generate_meal_plan",
            Route::Recipe => "/generate_recipe",
            Route::ShoppingList => "/generate_shopping_list",
        }
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim_start_matches('/') {
            "meal-plan" | "generate_meal_plan" => Ok(Route::MealPlan),
            "recipe" | "generate_recipe" => Ok(Route::Recipe),
            "shopping-list" | "generate_shopping_list" => Ok(Route::ShoppingList),
            other => Err(format!("unknown route '{other}'")),
        }
    }
}

pub fn meal_plan(
    gate: &RequestGate<AssistantModel>,
    request: &MealPlanRequest,
) -> Result<MealPlanResponse, AssistantError> {
    gate.run(|model| {
        model.gen_meal_plan(
            &request.forbidden_products,
            &request.available_products,
            &request.target_calories,
        )
    })
}

/// Generate a recipe; with `save` the text is also stored for retrieval
pub fn recipe(
    gate: &RequestGate<AssistantModel>,
    request: &RecipeRequest,
    save: bool,
) -> Result<RecipeResponse, AssistantError> {
    if request.product.trim().is_empty() {
        return Err(AssistantError::InvalidRequest(
            "product must not be empty".to_string(),
        ));
    }

    gate.run(|model| {
        let recipe = model.gen_recipe(&request.product, &request.forbidden_products)?;
        if save {
            model.save(&recipe, &request.product)?;
        }

        Ok(RecipeResponse { recipe })
    })
}

/// One generation per dish, each taking the gate on its own, merged into a
/// single deduplicated list
pub fn shopping_list(
    gate: &RequestGate<AssistantModel>,
    request: &ShoppingListRequest,
) -> Result<ShoppingListResponse, AssistantError> {
    let mut merged = ShoppingList::default();

    for dish in &request.dishes {
        let items = gate.run(|model| model.gen_shopping_list(dish, &request.forbidden_products))?;
        log::debug!("shopping list for '{dish}': {} item(s)", items.len());
        merged.merge(items);
    }

    Ok(ShoppingListResponse {
        shopping_list: merged.into_vec(),
    })
}

/// Dispatch a JSON request body to its route and return the JSON response
pub fn handle(
    gate: &RequestGate<AssistantModel>,
    route: Route,
    body: &str,
    save: bool,
) -> Result<serde_json::Value, AssistantError> {
    log::debug!("{} <- {} byte body", route.path(), body.len());

    let response = match route {
        Route::MealPlan => to_value(&meal_plan(gate, &parse_body(body)?)?),
        Route::Recipe => to_value(&recipe(gate, &parse_body(body)?, save)?),
        Route::ShoppingList => to_value(&shopping_list(gate, &parse_body(body)?)?),
    }?;

    Ok(response)
}

/// An empty body is treated as `{}` so every defaulted field applies
fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, AssistantError> {
    let body = if body.trim().is_empty() { "{}" } else { body };

    serde_json::from_str(body)
        .map_err(|error| AssistantError::InvalidRequest(format!("invalid request body: {error}")))
}

fn to_value<T: Serialize>(response: &T) -> Result<serde_json::Value, AssistantError> {
    serde_json::to_value(response).map_err(|error| {
        AssistantError::InvalidRequest(format!("failed to serialize response: {error}"))
    })
}
