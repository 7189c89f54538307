//! Stable member identifiers.
//!
//! Every type and member of a loaded assembly is addressed by a [`MemberId`] of the form
//!
//! ```text
//! <mvid>:<token>:<kind>
//! 6f1c2b8e0d3a4c5b9e7f112233445566:06000012:M
//! ```
//!
//! where `<mvid>` is the module version id as 32 lowercase hex digits (the GUID bytes in their
//! on-disk order), `<token>` the metadata token as 8 lowercase hex digits and `<kind>` one of
//! `T`, `M`, `P`, `F` and `E`. An identifier is stable for one build of a module: rebuilding the
//! assembly changes its MVID and with it every identifier.
//!
//! Namespaces have no token and use the synthetic form `N:<namespace>`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer};
use strum::{EnumIter, IntoEnumIterator};

use crate::{
    metadata::{tables::TableId, token::Token},
    Error::InvalidArgument,
    Result,
};

/// Prefix of namespace identifiers
pub const NAMESPACE_PREFIX: &str = "N:";

/// The kind of entity an identifier addresses
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MemberKind {
    /// Type definition
    Type,
    /// Method or constructor
    Method,
    /// Property
    Property,
    /// Field
    Field,
    /// Event
    Event,
}

impl MemberKind {
    /// Single letter code used in identifiers
    #[must_use]
    pub fn code(self) -> char {
        match self {
            MemberKind::Type => 'T',
            MemberKind::Method => 'M',
            MemberKind::Property => 'P',
            MemberKind::Field => 'F',
            MemberKind::Event => 'E',
        }
    }

    /// Parses a kind code
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        MemberKind::iter().find(|kind| kind.code() == code)
    }

    /// The kind a definition token of this table carries
    #[must_use]
    pub fn of_token(token: Token) -> Option<Self> {
        match token.table() {
            t if t == TableId::TypeDef as u8 => Some(MemberKind::Type),
            t if t == TableId::MethodDef as u8 => Some(MemberKind::Method),
            t if t == TableId::Property as u8 => Some(MemberKind::Property),
            t if t == TableId::Field as u8 => Some(MemberKind::Field),
            t if t == TableId::Event as u8 => Some(MemberKind::Event),
            _ => None,
        }
    }

    /// All member kinds, i.e. every kind except [`MemberKind::Type`]
    #[must_use]
    pub fn members() -> [MemberKind; 4] {
        [
            MemberKind::Method,
            MemberKind::Property,
            MemberKind::Field,
            MemberKind::Event,
        ]
    }
}

/// Identifier of one type or member of one module build.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId {
    /// Module version id
    pub mvid: uguid::Guid,
    /// Metadata token
    pub token: Token,
    /// Kind
    pub kind: MemberKind,
}

/// Renders a module version id as 32 lowercase hex digits in on-disk byte order
#[must_use]
pub fn mvid_hex(mvid: &uguid::Guid) -> String {
    mvid.to_bytes().iter().map(|byte| format!("{byte:02x}")).collect()
}

fn parse_mvid(text: &str) -> Result<uguid::Guid> {
    if text.len() != 32 {
        return Err(InvalidArgument(format!(
            "module version must be 32 hex digits, got {}",
            text.len()
        )));
    }
    if !text.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(InvalidArgument(format!("module version '{text}' is not hex")));
    }

    let mut bytes = [0u8; 16];
    for (index, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[index * 2..index * 2 + 2], 16)
            .map_err(|_| InvalidArgument(format!("module version '{text}' is not hex")))?;
    }

    Ok(uguid::Guid::from_bytes(bytes))
}

impl MemberId {
    /// Creates an identifier
    #[must_use]
    pub fn new(mvid: uguid::Guid, token: Token, kind: MemberKind) -> Self {
        MemberId { mvid, token, kind }
    }

    /// Identifier of a definition token, deriving the kind from its table
    #[must_use]
    pub fn of_token(mvid: uguid::Guid, token: Token) -> Option<Self> {
        MemberKind::of_token(token).map(|kind| MemberId::new(mvid, token, kind))
    }

    /// Parses an identifier.
    ///
    /// Hex digits are accepted in either case. The token is not checked against the kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for a wrong segment count, a module version that
    /// is not 32 hex digits, a token that is not 1 to 8 hex digits, or an unknown kind code.
    pub fn parse(input: &str) -> Result<Self> {
        let segments: Vec<&str> = input.split(':').collect();
        let [mvid, token, kind] = segments.as_slice() else {
            return Err(InvalidArgument(format!(
                "identifier '{input}' must have 3 segments, has {}",
                segments.len()
            )));
        };

        let mvid = parse_mvid(mvid)?;

        if token.is_empty() || token.len() > 8 || !token.bytes().all(|byte| byte.is_ascii_hexdigit())
        {
            return Err(InvalidArgument(format!("token '{token}' is not 8 hex digits")));
        }
        let token = u32::from_str_radix(token, 16)
            .map_err(|_| InvalidArgument(format!("token '{token}' is not hex")))?;

        let mut chars = kind.chars();
        let kind = match (chars.next(), chars.next()) {
            (Some(code), None) => MemberKind::from_code(code),
            _ => None,
        }
        .ok_or_else(|| InvalidArgument(format!("unknown kind code '{kind}'")))?;

        Ok(MemberId::new(mvid, Token::new(token), kind))
    }

    /// Whether `input` is a canonical member identifier. Namespace identifiers and the other
    /// inputs the resolver accepts are not.
    #[must_use]
    pub fn is_canonical(input: &str) -> bool {
        MemberId::parse(input).is_ok()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:08x}:{}",
            mvid_hex(&self.mvid),
            self.token.value(),
            self.kind.code()
        )
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({self})")
    }
}

impl FromStr for MemberId {
    type Err = crate::Error;

    fn from_str(input: &str) -> Result<Self> {
        MemberId::parse(input)
    }
}

impl Serialize for MemberId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identifier of a namespace
#[must_use]
pub fn namespace_id(namespace: &str) -> String {
    format!("{NAMESPACE_PREFIX}{namespace}")
}

/// The namespace named by a namespace identifier
#[must_use]
pub fn namespace_of(input: &str) -> Option<&str> {
    input.strip_prefix(NAMESPACE_PREFIX)
}
