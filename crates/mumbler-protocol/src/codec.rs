//! The packet codec: [`Packet`] ⇄ bytes.
//!
//! Every encoded packet starts with the same 5-byte header:
//!
//! ```text
//! ┌────┬────┬───────┬───────┬──────┬─────────────────────────┐
//! │ 'C'│ 'M'│ major │ minor │ type │ payload (per-type)      │
//! └────┴────┴───────┴───────┴──────┴─────────────────────────┘
//!   0    1     2       3       4      5..
//! ```
//!
//! Decoding validates that header front to back and stops at the first
//! mismatch, so the error returned always names the *first* structural
//! problem: identifier, then version, then type tag, then payload.
//!
//! The session layer talks to the codec through the [`PacketCodec`] trait
//! so tests (or a future protocol revision) can swap the implementation.

use crate::types::{
    ClientId, GroupDescriptor, GroupId, Packet, PacketType, Permission,
    UserDescriptor,
};
use crate::wire::{PacketReader, PacketWriter};
use crate::ProtocolError;

/// The two bytes every packet starts with.
pub const APP_IDENTIFIER: [u8; 2] = *b"CM";

/// Major protocol version. Must match exactly on decode.
pub const VERSION_MAJOR: u8 = 1;

/// Minor protocol version. Must match exactly on decode.
pub const VERSION_MINOR: u8 = 0;

/// Identifier (2) + major (1) + minor (1) + type tag (1).
pub const HEADER_LEN: usize = 5;

/// Converts packets to bytes and back.
///
/// `Send + Sync + 'static` because the session engine shares one codec
/// between the transport's event task and any thread issuing commands.
pub trait PacketCodec: Send + Sync + 'static {
    /// Serializes a packet, header included.
    ///
    /// # Errors
    /// [`ProtocolError::UnsupportedPacketType`] if this codec has no
    /// serializer for the packet's kind, or
    /// [`ProtocolError::PayloadTooLarge`] if a field can't be represented.
    /// Either way no bytes are produced.
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one complete packet.
    ///
    /// # Errors
    /// The first of [`ProtocolError::BadIdentifier`],
    /// [`ProtocolError::UnsupportedVersion`],
    /// [`ProtocolError::UnknownPacketType`] or
    /// [`ProtocolError::MalformedPayload`] that applies.
    fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError>;
}

// ---------------------------------------------------------------------------
// BinaryCodec
// ---------------------------------------------------------------------------

/// The Mumbler binary wire format, version 1.0.
///
/// Stateless: encoding the same packet twice produces identical bytes.
///
/// ```rust
/// use mumbler_protocol::{BinaryCodec, ClientId, Packet, PacketCodec};
///
/// let codec = BinaryCodec;
/// let packet = Packet::Connected { client_id: ClientId(7) };
///
/// let bytes = codec.encode(&packet).unwrap();
/// assert_eq!(&bytes[..5], &[b'C', b'M', 1, 0, 1]);
/// assert_eq!(codec.decode(&bytes).unwrap(), packet);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl PacketCodec for BinaryCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
        let mut w = PacketWriter::with_capacity(HEADER_LEN + 16);
        w.write_bytes(&APP_IDENTIFIER);
        w.write_u8(VERSION_MAJOR);
        w.write_u8(VERSION_MINOR);
        w.write_u8(packet.packet_type().to_byte());
        write_payload(&mut w, packet)?;
        Ok(w.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError> {
        let packet_type = read_header(data)?;
        let mut r = PacketReader::new(&data[HEADER_LEN..]);
        let packet = read_payload(&mut r, packet_type)?;
        r.finish()?;
        Ok(packet)
    }
}

const VERSION: [u8; 2] = [VERSION_MAJOR, VERSION_MINOR];

/// Smallest encoded `GroupDescriptor`: ids, empty name, permission,
/// threshold and an empty member count.
const MIN_GROUP_LEN: usize = 2 + 2 + 1 + 1 + 4 + 2;
/// Smallest encoded `UserDescriptor`: id and an empty name.
const MIN_USER_LEN: usize = 2 + 1;

fn truncated_header() -> ProtocolError {
    ProtocolError::MalformedPayload("truncated header".into())
}

/// Validates the header and returns the packet type.
///
/// Each field is checked before the next one is even looked at, byte by
/// byte as far as the buffer goes. A buffer that ends mid-header fails
/// with `MalformedPayload` only if every byte it *does* contain matches.
fn read_header(data: &[u8]) -> Result<PacketType, ProtocolError> {
    let identifier = &data[..data.len().min(2)];
    if !APP_IDENTIFIER.starts_with(identifier) {
        let mut seen = [0; 2];
        seen[..identifier.len()].copy_from_slice(identifier);
        return Err(ProtocolError::BadIdentifier(seen));
    }

    let version = data.get(2..data.len().min(4)).unwrap_or_default();
    if !VERSION.starts_with(version) {
        return Err(ProtocolError::UnsupportedVersion {
            major: version[0],
            minor: version.get(1).copied().unwrap_or_default(),
        });
    }

    let tag = *data.get(4).ok_or_else(truncated_header)?;
    PacketType::from_byte(tag).ok_or(ProtocolError::UnknownPacketType(tag))
}

// ---------------------------------------------------------------------------
// Serializers
// ---------------------------------------------------------------------------

fn write_payload(
    w: &mut PacketWriter,
    packet: &Packet,
) -> Result<(), ProtocolError> {
    match packet {
        Packet::Connection { username } => {
            w.write_str("username", username)?;
        }
        Packet::Connected { client_id }
        | Packet::Disconnection { client_id } => {
            w.write_u16(client_id.0);
        }
        Packet::CreateGroup {
            owner_id,
            name,
            permission,
            password,
            threshold,
        } => {
            w.write_u16(owner_id.0);
            w.write_str("name", name)?;
            w.write_u8(permission.to_byte());
            w.write_str("password", password)?;
            w.write_u32(*threshold);
        }
        Packet::DeleteGroup {
            client_id,
            group_id,
        }
        | Packet::JoinedGroup {
            client_id,
            group_id,
        }
        | Packet::LeaveGroup {
            client_id,
            group_id,
        }
        | Packet::LeftGroup {
            client_id,
            group_id,
        }
        | Packet::Kick {
            client_id,
            group_id,
        }
        | Packet::SendKeystroke {
            client_id,
            group_id,
        } => {
            w.write_u16(client_id.0);
            w.write_u16(group_id.0);
        }
        Packet::ChangeGroupOwner {
            group_id,
            new_owner_id,
        } => {
            w.write_u16(group_id.0);
            w.write_u16(new_owner_id.0);
        }
        Packet::JoinGroup {
            client_id,
            group_id,
            password,
        } => {
            w.write_u16(client_id.0);
            w.write_u16(group_id.0);
            w.write_str("password", password)?;
        }
        Packet::SendGroups { groups } => {
            w.write_count("groups", groups.len())?;
            for group in groups {
                write_group(w, group)?;
            }
        }
        Packet::SendUsers { users } => {
            w.write_count("users", users.len())?;
            for user in users {
                w.write_u16(user.id.0);
                w.write_str("user name", &user.name)?;
            }
        }
        Packet::RequestGroups | Packet::RequestUsers => {}
        Packet::GroupMessage {
            sender_id,
            group_id,
            sender_name,
            text,
        } => {
            w.write_u16(sender_id.0);
            w.write_u16(group_id.0);
            w.write_str("sender_name", sender_name)?;
            w.write_str("text", text)?;
        }
        Packet::PrivateMessage {
            sender_id,
            recipient_id,
            sender_name,
            text,
        } => {
            w.write_u16(sender_id.0);
            w.write_u16(recipient_id.0);
            w.write_str("sender_name", sender_name)?;
            w.write_str("text", text)?;
        }
    }
    Ok(())
}

fn write_group(
    w: &mut PacketWriter,
    group: &GroupDescriptor,
) -> Result<(), ProtocolError> {
    w.write_u16(group.id.0);
    w.write_u16(group.owner_id.0);
    w.write_str("group name", &group.name)?;
    w.write_u8(group.permission.to_byte());
    w.write_u32(group.threshold);
    w.write_count("members", group.members.len())?;
    for member in &group.members {
        w.write_u16(member.0);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Deserializers
// ---------------------------------------------------------------------------

fn read_client(
    r: &mut PacketReader<'_>,
    field: &str,
) -> Result<ClientId, ProtocolError> {
    r.read_u16(field).map(ClientId)
}

fn read_group_id(r: &mut PacketReader<'_>) -> Result<GroupId, ProtocolError> {
    r.read_u16("group_id").map(GroupId)
}

fn read_permission(
    r: &mut PacketReader<'_>,
) -> Result<Permission, ProtocolError> {
    let byte = r.read_u8("permission")?;
    Permission::from_byte(byte).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "unknown permission type {byte}"
        ))
    })
}

fn read_payload(
    r: &mut PacketReader<'_>,
    packet_type: PacketType,
) -> Result<Packet, ProtocolError> {
    let packet = match packet_type {
        PacketType::Connection => Packet::Connection {
            username: r.read_string("username")?,
        },
        PacketType::Connected => Packet::Connected {
            client_id: read_client(r, "client_id")?,
        },
        PacketType::Disconnection => Packet::Disconnection {
            client_id: read_client(r, "client_id")?,
        },
        PacketType::CreateGroup => Packet::CreateGroup {
            owner_id: read_client(r, "owner_id")?,
            name: r.read_string("name")?,
            permission: read_permission(r)?,
            password: r.read_string("password")?,
            threshold: r.read_u32("threshold")?,
        },
        PacketType::DeleteGroup => Packet::DeleteGroup {
            client_id: read_client(r, "client_id")?,
            group_id: read_group_id(r)?,
        },
        PacketType::ChangeGroupOwner => Packet::ChangeGroupOwner {
            group_id: read_group_id(r)?,
            new_owner_id: read_client(r, "new_owner_id")?,
        },
        PacketType::JoinGroup => Packet::JoinGroup {
            client_id: read_client(r, "client_id")?,
            group_id: read_group_id(r)?,
            password: r.read_string("password")?,
        },
        PacketType::JoinedGroup => Packet::JoinedGroup {
            client_id: read_client(r, "client_id")?,
            group_id: read_group_id(r)?,
        },
        PacketType::LeaveGroup => Packet::LeaveGroup {
            client_id: read_client(r, "client_id")?,
            group_id: read_group_id(r)?,
        },
        PacketType::LeftGroup => Packet::LeftGroup {
            client_id: read_client(r, "client_id")?,
            group_id: read_group_id(r)?,
        },
        PacketType::Kick => Packet::Kick {
            client_id: read_client(r, "client_id")?,
            group_id: read_group_id(r)?,
        },
        PacketType::SendGroups => {
            let count = r.read_count("groups")?;
            let mut groups =
                Vec::with_capacity(r.bounded_capacity(count, MIN_GROUP_LEN));
            for _ in 0..count {
                groups.push(read_group(r)?);
            }
            Packet::SendGroups { groups }
        }
        PacketType::SendUsers => {
            let count = r.read_count("users")?;
            let mut users =
                Vec::with_capacity(r.bounded_capacity(count, MIN_USER_LEN));
            for _ in 0..count {
                users.push(UserDescriptor {
                    id: read_client(r, "user id")?,
                    name: r.read_string("user name")?,
                });
            }
            Packet::SendUsers { users }
        }
        PacketType::GroupMessage => Packet::GroupMessage {
            sender_id: read_client(r, "sender_id")?,
            group_id: read_group_id(r)?,
            sender_name: r.read_string("sender_name")?,
            text: r.read_string("text")?,
        },
        PacketType::PrivateMessage => Packet::PrivateMessage {
            sender_id: read_client(r, "sender_id")?,
            recipient_id: read_client(r, "recipient_id")?,
            sender_name: r.read_string("sender_name")?,
            text: r.read_string("text")?,
        },
        PacketType::SendKeystroke => Packet::SendKeystroke {
            client_id: read_client(r, "client_id")?,
            group_id: read_group_id(r)?,
        },
        PacketType::RequestGroups => Packet::RequestGroups,
        PacketType::RequestUsers => Packet::RequestUsers,
    };
    Ok(packet)
}

fn read_group(
    r: &mut PacketReader<'_>,
) -> Result<GroupDescriptor, ProtocolError> {
    let id = read_group_id(r)?;
    let owner_id = read_client(r, "owner_id")?;
    let name = r.read_string("group name")?;
    let permission = read_permission(r)?;
    let threshold = r.read_u32("threshold")?;
    let count = r.read_count("members")?;
    let mut members = Vec::with_capacity(r.bounded_capacity(count, 2));
    for _ in 0..count {
        members.push(read_client(r, "member id")?);
    }
    Ok(GroupDescriptor {
        id,
        owner_id,
        name,
        permission,
        threshold,
        members,
    })
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Header-level tests. Per-kind round trips live in
    //! `tests/codec_round_trip.rs`.

    use super::*;

    /// The packet the header tests corrupt: PrivateMessage 3 → 6 "hello".
    fn hello() -> Vec<u8> {
        BinaryCodec
            .encode(&Packet::PrivateMessage {
                sender_id: ClientId(3),
                recipient_id: ClientId(6),
                sender_name: String::new(),
                text: "hello".into(),
            })
            .unwrap()
    }

    // =====================================================================
    // encode()
    // =====================================================================

    #[test]
    fn test_encode_writes_header_first() {
        let bytes = hello();
        assert_eq!(&bytes[0..2], b"CM");
        assert_eq!(bytes[2], VERSION_MAJOR);
        assert_eq!(bytes[3], VERSION_MINOR);
        assert_eq!(bytes[4], PacketType::PrivateMessage.to_byte());
    }

    #[test]
    fn test_encode_private_message_exact_bytes() {
        let expected = [
            b'C', b'M', 1, 0, 14, // header
            3, 0, // sender_id
            6, 0, // recipient_id
            0, // sender_name: ""
            5, b'h', b'e', b'l', b'l', b'o', // text
        ];
        assert_eq!(hello(), expected);
    }

    #[test]
    fn test_encode_is_deterministic() {
        assert_eq!(hello(), hello());
    }

    #[test]
    fn test_encode_request_packets_are_header_only() {
        let bytes = BinaryCodec.encode(&Packet::RequestGroups).unwrap();
        assert_eq!(bytes, vec![b'C', b'M', 1, 0, 16]);
    }

    #[test]
    fn test_encode_too_many_members_fails_without_output() {
        let packet = Packet::SendGroups {
            groups: vec![GroupDescriptor {
                id: GroupId(1),
                owner_id: ClientId(1),
                name: "big".into(),
                permission: Permission::Free,
                threshold: 0,
                members: vec![ClientId(1); usize::from(u16::MAX) + 1],
            }],
        };
        let err = BinaryCodec.encode(&packet).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::PayloadTooLarge { field: "members", .. }
        ));
    }

    // =====================================================================
    // decode(): header validation order
    // =====================================================================

    #[test]
    fn test_decode_wrong_identifier_returns_bad_identifier() {
        let mut bytes = hello();
        bytes[0] = b'B';
        assert_eq!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::BadIdentifier([b'B', b'M']))
        );
    }

    #[test]
    fn test_decode_identifier_checked_before_version_and_type() {
        // Everything in the header is wrong; the identifier wins.
        let mut bytes = hello();
        bytes[0] = 0;
        bytes[2] = 9;
        bytes[3] = 9;
        bytes[4] = 200;
        assert!(matches!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::BadIdentifier(_))
        ));
    }

    #[test]
    fn test_decode_wrong_minor_version_returns_unsupported_version() {
        let mut bytes = hello();
        bytes[3] = 5;
        assert_eq!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::UnsupportedVersion { major: 1, minor: 5 })
        );
    }

    #[test]
    fn test_decode_version_checked_before_type() {
        let mut bytes = hello();
        bytes[2] = 2;
        bytes[4] = 200;
        assert!(matches!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::UnsupportedVersion { major: 2, minor: 0 })
        ));
    }

    #[test]
    fn test_decode_unassigned_type_returns_unknown_packet_type() {
        let mut bytes = hello();
        bytes[4] = 104;
        assert_eq!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::UnknownPacketType(104))
        );
    }

    #[test]
    fn test_decode_type_checked_before_payload() {
        // Header says "unknown type" and the payload is garbage too.
        let bytes = [b'C', b'M', 1, 0, 99, 0xff, 0xff];
        assert_eq!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::UnknownPacketType(99))
        );
    }

    #[test]
    fn test_decode_truncated_payload_returns_malformed() {
        let bytes = hello();
        let result = BinaryCodec.decode(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_trailing_bytes_returns_malformed() {
        let mut bytes = hello();
        bytes.push(0);
        assert!(matches!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_empty_buffer_returns_malformed() {
        assert!(matches!(
            BinaryCodec.decode(&[]),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_short_header_reports_first_bad_field() {
        // Identifier is present and wrong: that beats "truncated".
        assert!(matches!(
            BinaryCodec.decode(b"XY"),
            Err(ProtocolError::BadIdentifier(_))
        ));
        // Identifier and version are fine, type tag missing.
        assert!(matches!(
            BinaryCodec.decode(&[b'C', b'M', 1, 0]),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_partial_header_checks_bytes_present() {
        assert_eq!(
            BinaryCodec.decode(b"X"),
            Err(ProtocolError::BadIdentifier([b'X', 0]))
        );
        assert_eq!(
            BinaryCodec.decode(&[b'C', b'M', 9]),
            Err(ProtocolError::UnsupportedVersion { major: 9, minor: 0 })
        );
        assert_eq!(
            BinaryCodec.decode(&[b'C', b'M', 1, 3]),
            Err(ProtocolError::UnsupportedVersion { major: 1, minor: 3 })
        );
        // Every byte present is correct, so only truncation is left.
        assert!(matches!(
            BinaryCodec.decode(b"C"),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(matches!(
            BinaryCodec.decode(&[b'C', b'M', 1]),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_huge_list_count_with_no_elements_returns_malformed() {
        // SendGroups claiming 65535 entries with an empty body.
        let bytes = [b'C', b'M', 1, 0, 11, 0xff, 0xff];
        assert!(matches!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_unknown_permission_returns_malformed() {
        let mut bytes = BinaryCodec
            .encode(&Packet::CreateGroup {
                owner_id: ClientId(1),
                name: "g".into(),
                permission: Permission::Free,
                password: String::new(),
                threshold: 60,
            })
            .unwrap();
        // header(5) + owner(2) + name(1 + 1) → permission byte at 9
        bytes[9] = 7;
        assert!(matches!(
            BinaryCodec.decode(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }
}
