use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// The kind of a version-control object.
///
/// Discriminants match the object type codes used by the native repository
/// format and on the wire.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
}

impl ObjectType {
    pub const ALL: [ObjectType; 4] = [Self::Commit, Self::Tree, Self::Blob, Self::Tag];

    /// Canonical name, as written in loose object headers.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Result<Self, TypeError> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            other => Err(TypeError::UnknownObjectType(other.to_string())),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| TypeError::UnknownObjectType(s.to_string()))
    }
}

/// Type constraint applied to a lookup or iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TypeFilter {
    /// Match every object type.
    #[default]
    Any,
    /// Match only the given type.
    Exact(ObjectType),
}

impl TypeFilter {
    /// Wire code for [`TypeFilter::Any`].
    pub const ANY_CODE: i32 = 8;

    pub fn matches(&self, object_type: ObjectType) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(t) => *t == object_type,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Any => Self::ANY_CODE,
            Self::Exact(t) => t.code(),
        }
    }
}

impl From<ObjectType> for TypeFilter {
    fn from(t: ObjectType) -> Self {
        Self::Exact(t)
    }
}

/// Where a backend found an object.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Whence {
    /// Held in process memory.
    #[default]
    Cached = 0,
    /// A loose object file.
    Loose = 1,
    /// Inside a pack file.
    Packed = 2,
    /// An external database.
    DbCached = 3,
}

impl Whence {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Unknown codes yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Cached),
            1 => Some(Self::Loose),
            2 => Some(Self::Packed),
            3 => Some(Self::DbCached),
            _ => None,
        }
    }
}
