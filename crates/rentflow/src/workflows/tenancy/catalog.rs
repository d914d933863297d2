use super::domain::{ActorId, LifecycleError, PropertyId};

/// Boundary to the property listing service: existence and ownership only.
pub trait PropertyCatalog: Send + Sync {
    fn owner_of(&self, property_id: &PropertyId) -> Result<Option<ActorId>, CatalogError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("property catalog unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the owning landlord, rejecting unknown properties as invalid input.
pub(crate) fn property_owner<E>(
    catalog: &dyn PropertyCatalog,
    property_id: &PropertyId,
) -> Result<ActorId, E>
where
    E: From<CatalogError> + From<LifecycleError>,
{
    catalog.owner_of(property_id)?.ok_or_else(|| {
        LifecycleError::validation("property_id", format!("unknown property {property_id}"))
            .into()
    })
}
