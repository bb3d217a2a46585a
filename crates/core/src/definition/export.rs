//! Export definitions

use serde::{Deserialize, Serialize};

use super::member::MemberLocator;
use super::metadata::{Metadata, MetadataValue};
use crate::contract::{ContractIdentity, TypeShape};

/// A declaration that a part provides a value satisfying a contract
///
/// Belongs to exactly one [`PartDefinition`](super::PartDefinition).
/// An export located at [`MemberLocator::Type`] exports the part itself;
/// any other locator exports the value of that member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportDefinition {
    contract: ContractIdentity,
    member: MemberLocator,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    metadata: Metadata,
}

impl ExportDefinition {
    /// Export of the whole part under `contract`
    pub fn part(contract: impl Into<ContractIdentity>) -> Self {
        Self::of_member(MemberLocator::Type, contract)
    }

    /// Export of a member under `contract`
    pub fn of_member(member: MemberLocator, contract: impl Into<ContractIdentity>) -> Self {
        ExportDefinition {
            contract: contract.into(),
            member,
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Exported contract
    #[inline]
    pub fn contract(&self) -> &ContractIdentity {
        &self.contract
    }

    /// Exporting member
    #[inline]
    pub fn member(&self) -> &MemberLocator {
        &self.member
    }

    /// Export metadata
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether the whole part is exported
    #[inline]
    pub fn is_part_export(&self) -> bool {
        self.member.is_type()
    }

    pub(crate) fn substitute(&self, args: &[TypeShape]) -> ExportDefinition {
        ExportDefinition {
            contract: self.contract.substitute(args),
            member: self.member.clone(),
            metadata: self.metadata.clone(),
        }
    }
}
