use serde::Serialize;

use crate::domain::attribute::SourceAttributes;

/// A retail product as parsed from its page: display name, price text and
/// the full specification list in page order.
#[derive(Debug, Clone, Serialize)]
pub struct RetailProduct {
    pub name: String,
    pub price: String,
    pub attributes: SourceAttributes,
}
