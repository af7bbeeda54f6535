use serde::{Deserialize, Serialize};

use crate::{BookId, Money};

/// A stocked book as seen by the order core.
///
/// Only the fields checkout needs are modelled; catalog details live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    /// Current unit price. Orders snapshot it at checkout time.
    pub price: Money,
    /// Units available for reservation. Never negative.
    pub stock: u32,
}

impl Book {
    /// Creates a book with a fresh id.
    pub fn new(title: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: BookId::new(),
            title: title.into(),
            price,
            stock,
        }
    }
}
