//! Turning raw model text into structured results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::AssistantError;

/// One day of meals; every list holds at least one meal name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MealPlan {
    pub breakfast: Vec<String>,
    pub lunch: Vec<String>,
    pub dinner: Vec<String>,
}

impl MealPlan {
    pub fn from_str(value: &str) -> Result<Self, AssistantError> {
        let plan: MealPlan = serde_json::from_str(value.trim())
            .map_err(|error| AssistantError::malformed("meal plan", error.to_string()))?;

        for (meal, items) in [
            ("breakfast", &plan.breakfast),
            ("lunch", &plan.lunch),
            ("dinner", &plan.dinner),
        ] {
            if items.is_empty() {
                return Err(AssistantError::malformed(
                    "meal plan",
                    format!("'{meal}' has no meals"),
                ));
            }
        }

        Ok(plan)
    }
}

/// Products to buy; order irrelevant, duplicates removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShoppingList {
    items: BTreeSet<String>,
}

impl ShoppingList {
    pub fn from_str(value: &str) -> Result<Self, AssistantError> {
        let items: Vec<String> = serde_json::from_str(value.trim())
            .map_err(|error| AssistantError::malformed("shopping list", error.to_string()))?;

        Ok(items.into_iter().collect())
    }

    pub fn insert(&mut self, item: impl AsRef<str>) -> bool {
        let item = item.as_ref().trim();
        if item.is_empty() {
            return false;
        }
        self.items.insert(item.to_string())
    }

    /// Add every product of `other`, keeping one copy of each
    pub fn merge(&mut self, other: ShoppingList) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items.into_iter().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ShoppingList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = ShoppingList::default();
        for item in iter {
            list.insert(item);
        }
        list
    }
}

/// Remove trailing commas before `}` or `]`, along with the whitespace between.
///
/// Text inside JSON string literals is left untouched, so valid JSON never
/// changes and applying the repair twice equals applying it once.
pub fn clean_json(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            cleaned.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                cleaned.push(ch);
            }
            '}' | ']' => {
                loop {
                    let trimmed = cleaned.trim_end_matches([' ', '\t', '\r', '\n']);
                    if !trimmed.ends_with(',') {
                        break;
                    }
                    let comma = trimmed.len() - 1;
                    cleaned.truncate(comma);
                }
                cleaned.push(ch);
            }
            _ => cleaned.push(ch),
        }
    }

    cleaned
}

/// Drop a backend's echo of the prompt from the front of its response.
///
/// An exact prompt prefix is removed when present; otherwise `skip_lines`
/// leading lines are skipped (fewer lines than that leaves nothing).
pub fn strip_echo<'a>(response: &'a str, prompt: &str, skip_lines: usize) -> &'a str {
    if let Some(rest) = response.strip_prefix(prompt) {
        return rest;
    }

    let mut rest = response;
    for _ in 0..skip_lines {
        match rest.find('\n') {
            Some(index) => rest = &rest[index + 1..],
            None => return "",
        }
    }
    rest
}
