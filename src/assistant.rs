//! The orchestration core: three generation pipelines bound to one backend.
//!
//! Each call moves through rendering, generating and (for structured
//! pipelines) parsing. Nothing here locks; callers serialize access through
//! [`crate::gate::RequestGate`].

use std::sync::Arc;

use crate::error::AssistantError;
use crate::llm::GenerationBackend;
use crate::output::{clean_json, strip_echo, MealPlan, ShoppingList};
use crate::prompts::{Fields, PromptCatalog, PromptTemplate};
use crate::store::{Document, RetrievalStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Generate once more when structured output cannot be parsed
    pub regenerate_on_malformed: bool,
}

pub struct AssistantModel {
    backend: Arc<dyn GenerationBackend>,
    catalog: PromptCatalog,
    store: Option<RetrievalStore>,
    config: AssistantConfig,
}

impl AssistantModel {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: AssistantConfig) -> Self {
        Self {
            backend,
            catalog: PromptCatalog::default(),
            store: None,
            config,
        }
    }

    pub fn with_store(mut self, store: RetrievalStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Option<&RetrievalStore> {
        self.store.as_ref()
    }

    /// Plan breakfast, lunch and dinner for one day
    pub fn gen_meal_plan(
        &self,
        forbidden_products: &[String],
        available_products: &[String],
        target_calories: &str,
    ) -> Result<MealPlan, AssistantError> {
        let fields = Fields::new()
            .text("target_calories", target_calories)
            .list("available_products", available_products)
            .list("forbidden_products", forbidden_products);

        self.generate_parsed(&self.catalog.meal_plan, &fields, MealPlan::from_str)
    }

    /// Products needed to cook a single meal
    pub fn gen_shopping_list(
        &self,
        meal: &str,
        forbidden_products: &[String],
    ) -> Result<ShoppingList, AssistantError> {
        let fields = Fields::new()
            .text("meals", meal)
            .list("forbidden_products", forbidden_products);

        self.generate_parsed(&self.catalog.shopping_list, &fields, ShoppingList::from_str)
    }

    /// Free-text cooking instructions, returned as generated
    pub fn gen_recipe(
        &self,
        meal: &str,
        forbidden_products: &[String],
    ) -> Result<String, AssistantError> {
        let fields = Fields::new()
            .text("meal", meal)
            .list("forbidden_products", forbidden_products);

        self.generate(&self.catalog.recipe, &fields)
    }

    /// Persist a generated recipe into the store
    pub fn save(&mut self, recipe: &str, meal: &str) -> Result<(), AssistantError> {
        let store = self.store.as_mut().ok_or(AssistantError::IndexUnavailable)?;
        store.add_document(Document::new(meal, recipe))?;

        log::info!("saved recipe for '{}'", meal);
        Ok(())
    }

    /// Answer a question from previously saved recipes
    pub fn ask(&self, question: &str) -> Result<String, AssistantError> {
        self.store
            .as_ref()
            .ok_or(AssistantError::IndexUnavailable)?
            .query(question)
    }

    fn generate(
        &self,
        template: &PromptTemplate,
        fields: &Fields,
    ) -> Result<String, AssistantError> {
        log::debug!("{}: rendering", template.name());
        let prompt = template.render(fields)?;

        log::debug!("{}: generating ({} byte prompt)", template.name(), prompt.len());
        let response = self.backend.generate(&prompt)?;

        if self.backend.echoes_prompt() {
            Ok(strip_echo(&response, &prompt, template.echo_line_count()).to_string())
        } else {
            Ok(response)
        }
    }

    fn generate_parsed<T>(
        &self,
        template: &PromptTemplate,
        fields: &Fields,
        parse: impl Fn(&str) -> Result<T, AssistantError>,
    ) -> Result<T, AssistantError> {
        let attempts = if self.config.regenerate_on_malformed { 2 } else { 1 };
        let mut attempt = 1;

        loop {
            let response = self.generate(template, fields)?;

            log::debug!("{}: parsing", template.name());
            let cleaned = clean_json(&response);

            match parse(&cleaned) {
                Ok(value) => {
                    log::debug!("{}: done", template.name());
                    return Ok(value);
                }
                Err(error) => {
                    log::warn!(
                        "{}: attempt {attempt}/{attempts} failed: {error}; raw output: {}",
                        template.name(),
                        response.trim()
                    );

                    if attempt >= attempts {
                        return Err(error);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
