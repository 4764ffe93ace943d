use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Capacity used when no capacity row exists for a user
pub const DEFAULT_RESPONSIBILITY_CAPACITY: i64 = 5;

/// Kind of resource a principal can be responsible for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponsibilityKind {
    ProgramCoordination,
    ClassSupervision,
}

impl ResponsibilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponsibilityKind::ProgramCoordination => "program_coordination",
            ResponsibilityKind::ClassSupervision => "class_supervision",
        }
    }
}

impl fmt::Display for ResponsibilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponsibilityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "program_coordination" => Ok(ResponsibilityKind::ProgramCoordination),
            "class_supervision" => Ok(ResponsibilityKind::ClassSupervision),
            other => Err(format!("unknown responsibility kind: {}", other)),
        }
    }
}

/// Resource held by exactly one principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responsibility {
    pub resource_id: String,
    pub kind: ResponsibilityKind,
    pub holder_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Audit record of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsibilityTransfer {
    pub id: String,
    pub resource_id: String,
    pub kind: ResponsibilityKind,
    pub from_user_id: String,
    pub to_user_id: String,
    pub notes: Option<String>,
    pub transferred_at: DateTime<Utc>,
}

/// Input for getting a responsibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponsibilityRepoInput {
    pub resource_id: String,
    pub kind: ResponsibilityKind,
}

/// Input for transferring a responsibility with a generated audit ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponsibilityRepoInputWithId {
    pub transfer_id: String,
    pub resource_id: String,
    pub kind: ResponsibilityKind,
    pub from_user_id: String,
    pub to_user_id: String,
    pub notes: Option<String>,
}

/// Repository trait for responsibilities and their transfers
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ResponsibilityRepository: Send + Sync {
    /// Get a responsibility by resource and kind
    async fn get_responsibility(
        &self,
        input: GetResponsibilityRepoInput,
    ) -> DomainResult<Option<Responsibility>>;

    /// Move a responsibility to a new holder and record the transfer
    ///
    /// Holder check, capacity check, update and audit insert happen in one
    /// transaction.
    async fn transfer_responsibility(
        &self,
        input: TransferResponsibilityRepoInputWithId,
    ) -> DomainResult<ResponsibilityTransfer>;
}
