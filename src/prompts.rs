//! Prompt templates for the three generation pipelines and the retrieval chain.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` render as literal
//! braces. Every placeholder is a required field, listed in order in the
//! template's `required` slice.

use std::collections::BTreeMap;

use crate::error::AssistantError;

const MEAL_PLAN_TEXT: &str = "\
User wants to eat {target_calories} calorie food.
Here are the products they would like to include in their meals: {available_products}. Here are the products you MUST NOT include even if the user asks for them: {forbidden_products}.
Create a detailed meal plan for one day, including breakfast, lunch, and dinner. Present the output strictly in the following valid JSON format, using lists for each meal type:

{{
  \"breakfast\": [\"<meal_1>\", \"<meal_2>\", ...],
  \"lunch\": [\"<meal_3>\"],
  \"dinner\": [\"<meal_4>\"]
}}

Ensure that each list contains one or more meal items, describing typical dishes or ingredients for the meal. Each meal item must be a string. Do not include any explanations outside the JSON structure.
";

const RECIPE_TEXT: &str = "\
Write a recipe for {meal}.
Do NOT include the following products: {forbidden_products}.
";

const SHOPPING_LIST_TEXT: &str = "\
Here are the meals the user wants to cook: {meals}.
Create a shopping list for the user.
Do NOT include the following products in the list: {forbidden_products}.
Respond only with a JSON list of items to buy: [\"<item_1>\", \"<item_2>\", ...]
";

const RETRIEVAL_QA_TEXT: &str = "\
Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}

Question: {question}
Helpful Answer:";

/// A single field value: plain text or a list rendered as readable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Lists are trimmed, empty items dropped, and joined with `", "`;
    /// an empty list renders as `none`.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => {
                let joined = items
                    .iter()
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");

                if joined.is_empty() {
                    "none".to_string()
                } else {
                    joined
                }
            }
        }
    }
}

/// Named field values supplied to a template
#[derive(Debug, Clone, Default)]
pub struct Fields {
    values: BTreeMap<String, FieldValue>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(name.to_string(), FieldValue::Text(value.into()));
        self
    }

    pub fn list<I, S>(mut self, name: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.values.insert(name.to_string(), FieldValue::List(items));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }
}

/// An immutable prompt template with a fixed, ordered set of required fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    name: &'static str,
    text: &'static str,
    required: &'static [&'static str],
}

impl PromptTemplate {
    pub const fn new(
        name: &'static str,
        text: &'static str,
        required: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            text,
            required,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        self.required
    }

    /// Lines a backend echo of this prompt occupies before the answer starts
    pub fn echo_line_count(&self) -> usize {
        self.text.matches('\n').count()
    }

    /// Render the template; unknown fields are ignored
    pub fn render(&self, fields: &Fields) -> Result<String, AssistantError> {
        if let Some(field) = self
            .required_fields()
            .iter()
            .copied()
            .find(|field| fields.get(field).is_none())
        {
            return Err(AssistantError::MissingField {
                template: self.name,
                field,
            });
        }

        let mut rendered = String::with_capacity(self.text.len());
        let mut rest = self.text;

        while let Some(index) = rest.find(['{', '}']) {
            rendered.push_str(&rest[..index]);
            let tail = &rest[index..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                rendered.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }

            if tail.starts_with('}') {
                rendered.push('}');
                rest = &tail[1..];
                continue;
            }

            match tail.find('}') {
                Some(end) => {
                    let field: &'static str = &tail[1..end];
                    let value = fields.get(field).ok_or(AssistantError::MissingField {
                        template: self.name,
                        field,
                    })?;
                    rendered.push_str(&value.render());
                    rest = &tail[end + 1..];
                }
                None => {
                    rendered.push_str(tail);
                    rest = "";
                }
            }
        }

        rendered.push_str(rest);
        Ok(rendered)
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut rest = self.text;

        while let Some(index) = rest.find(['{', '}']) {
            let tail = &rest[index..];
            if tail.starts_with("{{") || tail.starts_with("}}") {
                rest = &tail[2..];
            } else if let (true, Some(end)) = (tail.starts_with('{'), tail.find('}')) {
                let name = &tail[1..end];
                if !names.contains(&name) {
                    names.push(name);
                }
                rest = &tail[end + 1..];
            } else {
                rest = &tail[1..];
            }
        }

        names
    }
}

pub const MEAL_PLAN: PromptTemplate = PromptTemplate::new(
    "meal_plan",
    MEAL_PLAN_TEXT,
    &["target_calories", "available_products", "forbidden_products"],
);

pub const RECIPE: PromptTemplate =
    PromptTemplate::new("recipe", RECIPE_TEXT, &["meal", "forbidden_products"]);

pub const SHOPPING_LIST: PromptTemplate = PromptTemplate::new(
    "shopping_list",
    SHOPPING_LIST_TEXT,
    &["meals", "forbidden_products"],
);

pub const RETRIEVAL_QA: PromptTemplate =
    PromptTemplate::new("retrieval_qa", RETRIEVAL_QA_TEXT, &["context", "question"]);

/// The fixed set of templates the assistant binds to its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptCatalog {
    pub meal_plan: PromptTemplate,
    pub recipe: PromptTemplate,
    pub shopping_list: PromptTemplate,
    pub retrieval_qa: PromptTemplate,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self {
            meal_plan: MEAL_PLAN,
            recipe: RECIPE,
            shopping_list: SHOPPING_LIST,
            retrieval_qa: RETRIEVAL_QA,
        }
    }
}

impl PromptCatalog {
    pub fn all(&self) -> [&PromptTemplate; 4] {
        [
            &self.meal_plan,
            &self.recipe,
            &self.shopping_list,
            &self.retrieval_qa,
        ]
    }
}
