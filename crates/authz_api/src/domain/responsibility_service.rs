use common::auth::{AuthorizationProvider, Permission, PermissionRequirement, RequestContext};
use common::domain::{
    DomainError, DomainResult, GetResponsibilityRepoInput, Responsibility, ResponsibilityKind,
    ResponsibilityRepository, ResponsibilityTransfer, TransferResponsibilityRepoInputWithId,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Request to hand a responsibility from its holder to another user
#[derive(Debug, Clone, Validate)]
pub struct TransferResponsibilityRequest {
    #[garde(length(min = 1))]
    pub resource_id: String,
    #[garde(skip)]
    pub kind: ResponsibilityKind,
    #[garde(length(min = 1))]
    pub from_user_id: String,
    #[garde(length(min = 1))]
    pub to_user_id: String,
    #[garde(length(max = 1000))]
    pub notes: Option<String>,
}

/// Request to look up who holds a responsibility
#[derive(Debug, Clone, Validate)]
pub struct GetResponsibilityRequest {
    #[garde(length(min = 1))]
    pub resource_id: String,
    #[garde(skip)]
    pub kind: ResponsibilityKind,
}

/// Domain service for coordinator and supervisor responsibilities
pub struct ResponsibilityService {
    responsibility_repository: Arc<dyn ResponsibilityRepository>,
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl ResponsibilityService {
    pub fn new(
        responsibility_repository: Arc<dyn ResponsibilityRepository>,
        authorization_provider: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            responsibility_repository,
            authorization_provider,
        }
    }

    #[instrument(
        skip(self, ctx, request),
        fields(
            resource_id = %request.resource_id,
            kind = %request.kind
        )
    )]
    pub async fn get_responsibility(
        &self,
        ctx: &RequestContext,
        request: GetResponsibilityRequest,
    ) -> DomainResult<Responsibility> {
        common::garde::validate_struct(&request)?;

        self.authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::global(Permission::CoordinatorView),
                None,
            )
            .await?;

        self.responsibility_repository
            .get_responsibility(GetResponsibilityRepoInput {
                resource_id: request.resource_id.clone(),
                kind: request.kind,
            })
            .await?
            .ok_or_else(|| {
                DomainError::ResponsibilityNotFound(format!(
                    "{} {}",
                    request.kind, request.resource_id
                ))
            })
    }

    /// Move a responsibility to a new holder under their capacity limit
    ///
    /// The holder change and its audit record are written atomically.
    #[instrument(
        skip(self, ctx, request),
        fields(
            resource_id = %request.resource_id,
            kind = %request.kind,
            from_user_id = %request.from_user_id,
            to_user_id = %request.to_user_id
        )
    )]
    pub async fn transfer_responsibility(
        &self,
        ctx: &RequestContext,
        request: TransferResponsibilityRequest,
    ) -> DomainResult<ResponsibilityTransfer> {
        common::garde::validate_struct(&request)?;

        debug!(resource_id = %request.resource_id, "transferring responsibility");

        self.authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::global(Permission::CoordinatorTransfer),
                None,
            )
            .await?;

        if request.from_user_id == request.to_user_id {
            return Err(DomainError::ValidationError(
                "cannot transfer a responsibility to its current holder".to_string(),
            ));
        }

        let transfer = self
            .responsibility_repository
            .transfer_responsibility(TransferResponsibilityRepoInputWithId {
                transfer_id: xid::new().to_string(),
                resource_id: request.resource_id,
                kind: request.kind,
                from_user_id: request.from_user_id,
                to_user_id: request.to_user_id,
                notes: request.notes,
            })
            .await?;

        debug!(transfer_id = %transfer.id, "responsibility transferred");
        Ok(transfer)
    }
}
