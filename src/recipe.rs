//! Ingredient identifiers and the fixed beverage recipe catalog.
//!
//! Both catalogs are closed sets. Parsing is case-insensitive because the
//! dispenser upper-cases every incoming line before it is interpreted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CellError;

/// A consumable stocked by the dispenser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ingredient {
    /// `MILK`
    Milk,
    /// `OAT_MILK`
    OatMilk,
    /// `MATCHA_SAUCE`
    MatchaSauce,
    /// `CHOCOLATE_SAUCE`
    ChocolateSauce,
    /// `CARAMEL_SYRUP`
    CaramelSyrup,
}

impl Ingredient {
    /// Every ingredient, in the order the dispenser reports them.
    pub const ALL: [Ingredient; 5] = [
        Ingredient::Milk,
        Ingredient::OatMilk,
        Ingredient::MatchaSauce,
        Ingredient::ChocolateSauce,
        Ingredient::CaramelSyrup,
    ];

    /// Wire name, e.g. `OAT_MILK`.
    pub fn as_str(self) -> &'static str {
        match self {
            Ingredient::Milk => "MILK",
            Ingredient::OatMilk => "OAT_MILK",
            Ingredient::MatchaSauce => "MATCHA_SAUCE",
            Ingredient::ChocolateSauce => "CHOCOLATE_SAUCE",
            Ingredient::CaramelSyrup => "CARAMEL_SYRUP",
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ingredient {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Ingredient::ALL
            .into_iter()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| CellError::UnknownIngredient(s.trim().to_string()))
    }
}

/// One of the ten beverages the cell can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Beverage {
    /// `LATTE`
    #[serde(rename = "LATTE")]
    Latte,
    /// `FLAT WHITE`
    #[serde(rename = "FLAT WHITE")]
    FlatWhite,
    /// `CAPPUCCINO`
    #[serde(rename = "CAPPUCCINO")]
    Cappuccino,
    /// `MACCHIATO`
    #[serde(rename = "MACCHIATO")]
    Macchiato,
    /// `OAT LATTE`
    #[serde(rename = "OAT LATTE")]
    OatLatte,
    /// `MOCHA`
    #[serde(rename = "MOCHA")]
    Mocha,
    /// `MATCHA LATTE`
    #[serde(rename = "MATCHA LATTE")]
    MatchaLatte,
    /// `ESPRESSO`
    #[serde(rename = "ESPRESSO")]
    Espresso,
    /// `AMERICANO`
    #[serde(rename = "AMERICANO")]
    Americano,
    /// `LONG BLACK`
    #[serde(rename = "LONG BLACK")]
    LongBlack,
}

impl Beverage {
    /// The full menu.
    pub const ALL: [Beverage; 10] = [
        Beverage::Latte,
        Beverage::FlatWhite,
        Beverage::Cappuccino,
        Beverage::Macchiato,
        Beverage::OatLatte,
        Beverage::Mocha,
        Beverage::MatchaLatte,
        Beverage::Espresso,
        Beverage::Americano,
        Beverage::LongBlack,
    ];

    /// Wire name. Multi-word names keep their space (`FLAT WHITE`).
    pub fn as_str(self) -> &'static str {
        match self {
            Beverage::Latte => "LATTE",
            Beverage::FlatWhite => "FLAT WHITE",
            Beverage::Cappuccino => "CAPPUCCINO",
            Beverage::Macchiato => "MACCHIATO",
            Beverage::OatLatte => "OAT LATTE",
            Beverage::Mocha => "MOCHA",
            Beverage::MatchaLatte => "MATCHA LATTE",
            Beverage::Espresso => "ESPRESSO",
            Beverage::Americano => "AMERICANO",
            Beverage::LongBlack => "LONG BLACK",
        }
    }

    /// Ingredient requirements. Black coffees need nothing from the dispenser
    /// stock and return an empty slice.
    pub fn recipe(self) -> &'static [(Ingredient, u32)] {
        use Ingredient::*;
        match self {
            Beverage::Latte | Beverage::FlatWhite | Beverage::Cappuccino => &[(Milk, 3)],
            Beverage::Macchiato => &[(Milk, 2), (CaramelSyrup, 1)],
            Beverage::OatLatte => &[(OatMilk, 3)],
            Beverage::Mocha => &[(Milk, 2), (ChocolateSauce, 1)],
            Beverage::MatchaLatte => &[(Milk, 2), (MatchaSauce, 1)],
            Beverage::Espresso | Beverage::Americano | Beverage::LongBlack => &[],
        }
    }
}

impl fmt::Display for Beverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Beverage {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Beverage::ALL
            .into_iter()
            .find(|b| b.as_str() == wanted)
            .ok_or_else(|| CellError::UnknownBeverage(s.trim().to_string()))
    }
}

/// Ingredients from `recipe` whose requirement exceeds `available(ingredient)`.
///
/// Every short ingredient is returned, in recipe order, not just the first.
pub fn shortages<F>(recipe: &[(Ingredient, u32)], mut available: F) -> Vec<Ingredient>
where
    F: FnMut(Ingredient) -> u32,
{
    recipe
        .iter()
        .filter(|(ingredient, required)| available(*ingredient) < *required)
        .map(|(ingredient, _)| *ingredient)
        .collect()
}
