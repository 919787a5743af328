use crate::error::ProjectionError;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// A 128-bit interface identifier.
///
/// The canonical textual form everywhere in this crate is lowercase
/// hyphenated hex; parsing accepts any case and optional braces so that
/// identifiers copied straight out of metadata round-trip.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(Uuid);

/// Namespace identifier reserved for parameterized-interface IID derivation.
///
/// Every WinRT implementation hashes instantiation signatures under this
/// exact namespace; changing it would break cross-binary interface identity.
pub const PINTERFACE_NAMESPACE: Guid = Guid(uuid::uuid!("11f47ad5-7b73-42c0-abae-878b1e16adee"));

impl Guid {
    pub fn parse(text: &str) -> Result<Self, ProjectionError> {
        Uuid::parse_str(text.trim_start_matches('{').trim_end_matches('}'))
            .map(Guid)
            .map_err(|_| ProjectionError::MalformedGuid(text.to_string()))
    }

    pub const fn from_u128(value: u128) -> Self {
        Guid(Uuid::from_u128(value))
    }

    /// The form used inside signature strings: lowercase, hyphenated, bare.
    pub fn to_signature_string(&self) -> String {
        self.0.hyphenated().to_string()
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.0.hyphenated())
    }
}

impl FromStr for Guid {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Guid::parse(s)
    }
}

/// Derives the IID for a canonical signature string.
///
/// RFC 4122 version-5 UUID over [`PINTERFACE_NAMESPACE`] with the signature
/// as the name input. Pure: two independently compiled consumers of the same
/// instantiation compute the same identity without communicating.
pub fn derive_iid(signature: &str) -> Guid {
    Guid(Uuid::new_v5(&PINTERFACE_NAMESPACE.0, signature.as_bytes()))
}

/// Windows ABI layout of a GUID, for crossing FFI boundaries.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbiGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl From<Guid> for AbiGuid {
    fn from(guid: Guid) -> Self {
        let (data1, data2, data3, data4) = guid.0.as_fields();
        AbiGuid {
            data1,
            data2,
            data3,
            data4: *data4,
        }
    }
}

impl From<AbiGuid> for Guid {
    fn from(abi: AbiGuid) -> Self {
        Guid(Uuid::from_fields(abi.data1, abi.data2, abi.data3, &abi.data4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_and_brace_insensitive() {
        let lower = Guid::parse("9de1c534-6ae1-11e0-84e1-18a905bcc53f").unwrap();
        let upper = Guid::parse("9DE1C534-6AE1-11E0-84E1-18A905BCC53F").unwrap();
        let braced = Guid::parse("{9de1c534-6ae1-11e0-84e1-18a905bcc53f}").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, braced);
        assert_eq!(lower.to_string(), "9de1c534-6ae1-11e0-84e1-18a905bcc53f");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Guid::parse("not-a-guid"),
            Err(ProjectionError::MalformedGuid(_))
        ));
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive_iid("i4"), derive_iid("i4"));
        assert_ne!(derive_iid("i4"), derive_iid("i8"));
    }

    #[test]
    fn rederiving_an_emitted_signature_reproduces_the_identifier() {
        let first = derive_iid("pinterface(9de1c534-6ae1-11e0-84e1-18a905bcc53f;i4)");
        let round_tripped = Guid::parse(&first.to_signature_string()).unwrap();
        assert_eq!(first, round_tripped);
    }

    #[test]
    fn abi_layout_round_trips() {
        let guid = Guid::parse("11f47ad5-7b73-42c0-abae-878b1e16adee").unwrap();
        let abi = AbiGuid::from(guid);
        assert_eq!(abi.data1, 0x11f47ad5);
        assert_eq!(abi.data2, 0x7b73);
        assert_eq!(Guid::from(abi), guid);
    }
}
