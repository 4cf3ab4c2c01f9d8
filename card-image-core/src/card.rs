use serde::{Deserialize, Serialize};

/// The card fields the image cache needs from the game client's card view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CardView {
    pub name: String,
    /// Name of the other face for flip and transform cards
    pub alternate_name: Option<String>,
    pub expansion_set_code: String,
    pub card_type: i32,
    /// Collector number; empty or "0" for tokens and emblems
    pub card_number: String,
    pub token_set_code: Option<String>,
    pub token_descriptor: Option<String>,
    pub uses_various_art: bool,
}

impl CardView {
    pub fn new(name: &str, expansion_set_code: &str, card_number: &str) -> CardView {
        CardView {
            name: name.to_string(),
            expansion_set_code: expansion_set_code.to_string(),
            card_number: card_number.to_string(),
            ..Default::default()
        }
    }

    pub fn token(name: &str, token_set_code: &str) -> CardView {
        CardView {
            name: name.to_string(),
            expansion_set_code: token_set_code.to_string(),
            card_number: "0".to_string(),
            token_set_code: Some(token_set_code.to_string()),
            ..Default::default()
        }
    }

    pub fn with_alternate_name(mut self, alternate_name: &str) -> CardView {
        self.alternate_name = Some(alternate_name.to_string());
        self
    }

    pub fn with_token_descriptor(mut self, descriptor: &str) -> CardView {
        self.token_descriptor = Some(descriptor.to_string());
        self
    }

    pub fn with_various_art(mut self) -> CardView {
        self.uses_various_art = true;
        self
    }

    pub fn is_token(&self) -> bool {
        self.card_number.is_empty() || self.card_number == "0"
    }
}
