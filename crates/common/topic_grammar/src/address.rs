//! Cross-broker addressing: `brokerId:localIdentifier`, see `spec.md` §4.7.

/// The result of parsing a target address (a `toDevice` or `toGroup` value).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RemoteAddress<'a> {
    /// No colon: the identifier names a local device or group.
    Local(&'a str),
    /// `brokerId:localIdentifier`, both non-empty.
    Remote { broker_id: &'a str, local_id: &'a str },
    /// A colon was present but one side was empty (`:x`, `x:`, `:`).
    Invalid,
}

/// Split on the first colon. Absence of a colon means local; an empty half on
/// either side of a colon is invalid.
pub fn parse_remote_address(raw: &str) -> RemoteAddress<'_> {
    match raw.split_once(':') {
        None => RemoteAddress::Local(raw),
        Some((broker_id, local_id)) if !broker_id.is_empty() && !local_id.is_empty() => {
            RemoteAddress::Remote {
                broker_id,
                local_id,
            }
        }
        Some(_) => RemoteAddress::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_address_has_no_colon() {
        assert_eq!(parse_remote_address("cid"), RemoteAddress::Local("cid"));
    }

    #[test]
    fn remote_address_splits_on_first_colon() {
        assert_eq!(
            parse_remote_address("b1:cid:extra"),
            RemoteAddress::Remote {
                broker_id: "b1",
                local_id: "cid:extra"
            }
        );
    }

    #[test]
    fn empty_halves_are_invalid() {
        assert_eq!(parse_remote_address(":cid"), RemoteAddress::Invalid);
        assert_eq!(parse_remote_address("b1:"), RemoteAddress::Invalid);
        assert_eq!(parse_remote_address(":"), RemoteAddress::Invalid);
    }
}
