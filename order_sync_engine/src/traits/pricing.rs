use ose_common::MinorUnits;
use thiserror::Error;

/// The catalog/pricing collaborator.
///
/// The engine does not own pricing rules; it only recomputes a total from this single price source to validate the
/// client-declared total. Prices are tax-inclusive minor-unit amounts for one unit of the item with the given
/// modifications applied.
#[allow(async_fn_in_trait)]
pub trait PriceResolver {
    async fn get_price(&self, catalog_item_id: &str, modifications: &[String]) -> Result<MinorUnits, PriceResolverError>;
}

#[derive(Debug, Clone, Error)]
pub enum PriceResolverError {
    #[error("Unknown catalog item: {0}")]
    UnknownItem(String),
    #[error("Price lookup unavailable: {0}")]
    Unavailable(String),
}
