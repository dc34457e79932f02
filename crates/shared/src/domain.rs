use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(RecipeId);
id_newtype!(PantryItemId);
id_newtype!(TaskId);

/// Temporary identifier for an entity that only exists on the client so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn next() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

/// Something a recipe line can point at: a pantry item, or another recipe
/// used as a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ingredient {
    PantryItem { id: PantryItemId, name: String },
    Recipe { id: RecipeId, name: String },
}

impl Ingredient {
    pub fn name(&self) -> &str {
        match self {
            Ingredient::PantryItem { name, .. } | Ingredient::Recipe { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amount.fract() == 0.0 && self.amount.abs() < 1e15 {
            write!(f, "{}", self.amount as i64)?;
        } else {
            write!(f, "{}", self.amount)?;
        }
        if let Some(units) = &self.units {
            write!(f, " {units}")?;
        }
        Ok(())
    }
}

/// A single quantified unit of a recipe or a shopping list, like
/// "3 oz parmesan, shredded".
pub trait Item {
    /// The text as originally entered.
    fn raw(&self) -> &str;

    fn quantity(&self) -> Option<&Quantity>;

    /// Whatever else a cook needs to know ("shredded", "thawed").
    fn preparation(&self) -> Option<&str>;

    fn ingredient(&self) -> Option<&Ingredient>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientRef {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient: Option<Ingredient>,
}

impl IngredientRef {
    pub fn raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::default()
        }
    }

    pub fn blank() -> Self {
        Self::default()
    }

    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

impl Item for IngredientRef {
    fn raw(&self) -> &str {
        &self.raw
    }

    fn quantity(&self) -> Option<&Quantity> {
        self.quantity.as_ref()
    }

    fn preparation(&self) -> Option<&str> {
        self.preparation.as_deref()
    }

    fn ingredient(&self) -> Option<&Ingredient> {
        self.ingredient.as_ref()
    }
}

/// The editable body of a recipe, without identity or ownership.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directions: Option<String>,
    #[serde(default, rename = "yield", skip_serializing_if = "Option::is_none")]
    pub yield_: Option<u32>,
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<IngredientRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub owner_id: UserId,
    #[serde(flatten)]
    pub fields: RecipeFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Recipe {
    pub fn name(&self) -> &str {
        &self.fields.name
    }

    /// Non-blank raw ingredient lines, trimmed, in recipe order.
    pub fn raw_ingredient_lines(&self) -> impl Iterator<Item = &str> {
        self.fields
            .ingredients
            .iter()
            .map(|ing| ing.raw.trim())
            .filter(|raw| !raw.is_empty())
    }
}
