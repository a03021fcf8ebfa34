//! The single tenant capability check.
//!
//! Every layer that enforces tenant isolation calls this one pure function rather than re-implementing the
//! comparison. The API layer maps a denial on reads and updates to `NotFound`, so a cross-tenant probe cannot
//! distinguish "exists in another tenant" from "does not exist".

use thiserror::Error;

use crate::db_types::{AccessClaims, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Caller is not authorized for the requested tenant scope")]
pub struct AccessDenied;

/// Returns `Ok(())` iff the caller's tenant claim matches the tenant that owns the resource.
pub fn ensure_tenant_access(claims: &AccessClaims, tenant_id: &TenantId) -> Result<(), AccessDenied> {
    if &claims.tenant_id == tenant_id {
        Ok(())
    } else {
        Err(AccessDenied)
    }
}
