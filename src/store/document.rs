use serde::{Deserialize, Serialize};

/// A saved recipe. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub meal: String,
    pub recipe: String,
    pub created_at: String,
}

impl Document {
    pub fn new(meal: impl Into<String>, recipe: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            meal: meal.into(),
            recipe: recipe.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// The text that gets chunked and embedded
    pub fn text(&self) -> String {
        format!("Meal: {}\nRecipe:\n{}", self.meal.trim(), self.recipe.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_contains_meal_and_recipe() {
        let document = Document::new("tomato soup", "  Simmer tomatoes.\n");
        assert_eq!(document.text(), "Meal: tomato soup\nRecipe:\nSimmer tomatoes.");
    }

    #[test]
    fn ids_are_unique() {
        let a = Document::new("a", "x");
        let b = Document::new("a", "x");
        assert_ne!(a.id, b.id);
    }
}
