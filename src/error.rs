use std::fmt;
use std::string::FromUtf8Error;

use nix::errno::Errno;
use thiserror::Error;

use crate::ProtocolFamily;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("The buffer is too small to hold a valid message")]
    BufTooSmall,

    #[error("The message is too small")]
    NlMsgTooSmall,

    #[error("The message holds unexpected data")]
    InvalidDataSize,

    #[error("Invalid subsystem {0}, expected NFTABLES")]
    InvalidSubsystem(u8),

    #[error("Invalid version {0}, expected NFNETLINK_V0")]
    InvalidVersion(u8),

    #[error("Invalid port ID {0}")]
    InvalidPortId(u32),

    #[error("Invalid sequence number {0}")]
    InvalidSeq(u32),

    #[error("The generation number was bumped in the kernel while the operation was running, interrupting it")]
    ConcurrentGenerationUpdate,

    #[error("Unsupported message type {0}")]
    UnsupportedType(u16),

    #[error("Invalid type for a chain")]
    UnknownChainType,

    #[error("Invalid policy {0} for a chain")]
    UnknownChainPolicy(i32),

    #[error("Invalid hook {0} for a chain")]
    UnknownHookClass(u32),

    #[error("Invalid value {0} for a register")]
    UnknownRegister(u32),

    #[error("Invalid type {0} for a verdict expression")]
    UnknownVerdictType(i32),

    #[error("Invalid base {0} for a payload expression")]
    UnknownPayloadBase(u32),

    #[error("Invalid operator {0} for a compare expression")]
    UnknownCmpOp(u32),

    #[error("The object does not contain a name for the expression being parsed")]
    MissingExpressionName,

    #[error("Unsupported attribute type {0}")]
    UnsupportedAttributeType(u16),

    #[error("Unexpected message type {0}")]
    UnexpectedType(u16),

    #[error("The decoded String is not UTF8 compliant")]
    StringDecodeFailure(#[from] FromUtf8Error),

    #[error("Invalid value {0} for a protocol family")]
    UnknownProtocolFamily(i32),
}

#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    #[error("The table does not have a name")]
    MissingTableName,

    #[error("Missing information in the chain to create a rule")]
    MissingChainInformationError,
}

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("Unable to open netlink socket to netfilter: {0}")]
    NetlinkOpenError(#[source] nix::Error),

    #[error("Unable to bind the netlink socket: {0}")]
    NetlinkBindError(#[source] nix::Error),

    #[error("Unable to send netlink command to netfilter: {0}")]
    NetlinkSendError(#[source] nix::Error),

    #[error("Error while reading from netlink socket: {0}")]
    NetlinkRecvError(#[source] nix::Error),

    #[error("Error while processing an incoming netlink message: {0}")]
    ProcessNetlinkError(#[from] DecodeError),

    #[error("Error while building netlink objects in Rust: {0}")]
    BuilderError(#[from] BuilderError),

    #[error("Error received from the kernel: {0}")]
    NetlinkError(Errno),

    #[error("The object does not exist")]
    NotFound,

    #[error("The protocol family {0} is not supported")]
    UnsupportedFamily(ProtocolFamily),

    #[error("This socket is not a netlink socket")]
    NotNetlinkSocket,

    #[error("Couldn't retrieve information on a socket: {0}")]
    RetrievingSocketInfoFailed(#[source] nix::Error),

    #[error("Only a part of the message was sent")]
    TruncatedSend,

    #[error("Couldn't close the socket: {0}")]
    CloseFailed(#[source] Errno),
}

/// Coarse classification of a [`QueryError`], stable enough for callers to act upon.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The netlink socket could not be opened, bound, written to, read from or closed.
    Transport,
    /// The kernel rejected a request, or answered with something that could not be decoded.
    Protocol,
    /// The kernel reported that the object does not exist (`ENOENT`).
    NotFound,
    /// The requested protocol family has no mapping to kernel constants.
    UnsupportedFamily,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::Transport => "transport error",
            ErrorClass::Protocol => "protocol error",
            ErrorClass::NotFound => "not found",
            ErrorClass::UnsupportedFamily => "unsupported family",
        })
    }
}

impl QueryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            QueryError::NetlinkOpenError(_)
            | QueryError::NetlinkBindError(_)
            | QueryError::NetlinkSendError(_)
            | QueryError::NetlinkRecvError(_)
            | QueryError::NotNetlinkSocket
            | QueryError::RetrievingSocketInfoFailed(_)
            | QueryError::TruncatedSend
            | QueryError::CloseFailed(_) => ErrorClass::Transport,
            QueryError::ProcessNetlinkError(_)
            | QueryError::BuilderError(_)
            | QueryError::NetlinkError(_) => ErrorClass::Protocol,
            QueryError::NotFound => ErrorClass::NotFound,
            QueryError::UnsupportedFamily(_) => ErrorClass::UnsupportedFamily,
        }
    }

    /// Maps the (positive) errno reported by the kernel in a `NLMSG_ERROR` message.
    pub(crate) fn from_kernel_errno(errno: i32) -> Self {
        match Errno::from_i32(errno) {
            Errno::ENOENT => QueryError::NotFound,
            e => QueryError::NetlinkError(e),
        }
    }
}
