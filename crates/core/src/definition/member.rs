//! Member locators
//!
//! Where on a part an export or import lives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of an export or import on its declaring part
///
/// `Type` means the part itself: an export located at `Type` exports the
/// whole part instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberLocator {
    /// The part itself
    Type,
    /// Constructor parameter, by position
    Constructor(usize),
    /// Property, by name
    Property(String),
    /// Field, by name
    Field(String),
    /// Method, by name
    Method(String),
}

impl MemberLocator {
    /// Property locator
    pub fn property(name: impl Into<String>) -> Self {
        MemberLocator::Property(name.into())
    }

    /// Field locator
    pub fn field(name: impl Into<String>) -> Self {
        MemberLocator::Field(name.into())
    }

    /// Method locator
    pub fn method(name: impl Into<String>) -> Self {
        MemberLocator::Method(name.into())
    }

    /// Kind of member
    pub const fn kind(&self) -> MemberKind {
        match self {
            MemberLocator::Type => MemberKind::Type,
            MemberLocator::Constructor(_) => MemberKind::Constructor,
            MemberLocator::Property(_) => MemberKind::Property,
            MemberLocator::Field(_) => MemberKind::Field,
            MemberLocator::Method(_) => MemberKind::Method,
        }
    }

    /// Member name, for named members
    pub fn name(&self) -> Option<&str> {
        match self {
            MemberLocator::Property(n) | MemberLocator::Field(n) | MemberLocator::Method(n) => {
                Some(n)
            }
            MemberLocator::Type | MemberLocator::Constructor(_) => None,
        }
    }

    /// Whether this locator designates the whole part
    #[inline]
    pub const fn is_type(&self) -> bool {
        matches!(self, MemberLocator::Type)
    }
}

impl fmt::Display for MemberLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberLocator::Type => write!(f, "<type>"),
            MemberLocator::Constructor(i) => write!(f, "ctor parameter #{}", i),
            MemberLocator::Property(n) => write!(f, "property {}", n),
            MemberLocator::Field(n) => write!(f, "field {}", n),
            MemberLocator::Method(n) => write!(f, "method {}", n),
        }
    }
}

/// Member kind, the discriminant of [`MemberLocator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    /// The part itself
    Type,
    /// Constructor parameter
    Constructor,
    /// Property
    Property,
    /// Field
    Field,
    /// Method
    Method,
}

impl MemberKind {
    /// All member kinds (for iteration)
    pub const ALL: [MemberKind; 5] = [
        MemberKind::Type,
        MemberKind::Constructor,
        MemberKind::Property,
        MemberKind::Field,
        MemberKind::Method,
    ];

    /// Lowercase identifier, as used in configuration files
    pub const fn id(&self) -> &'static str {
        match self {
            MemberKind::Type => "type",
            MemberKind::Constructor => "constructor",
            MemberKind::Property => "property",
            MemberKind::Field => "field",
            MemberKind::Method => "method",
        }
    }

    /// Whether an export may be declared on this kind of member at all
    pub const fn can_export(&self) -> bool {
        !matches!(self, MemberKind::Constructor)
    }

    /// Whether an import may be declared on this kind of member at all
    pub const fn can_import(&self) -> bool {
        !matches!(self, MemberKind::Type)
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
