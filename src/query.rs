//! Transport: a netlink socket to the netfilter subsystem, and the request/acknowledgment loop
//! built on top of it.

use std::os::unix::prelude::RawFd;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::socket::{self, AddressFamily, MsgFlags, SockAddr, SockFlag, SockProtocol, SockType};

use crate::error::{DecodeError, QueryError};
use crate::nlmsg::{
    pad_netlink_object_with_variable_size, NfNetlinkObject, NfNetlinkWriter, NlmFlags,
};
use crate::parser::{nft_nlmsg_maxsize, parse_nlmsg, NlMsg};
use crate::rule::Rule;
use crate::sys::{nlmsghdr, NFT_MSG_GETRULE};
use crate::ProtocolFamily;

/// A datagram channel to the kernel netfilter configuration subsystem.
///
/// [`NetlinkSocket`] is the real implementation. Other implementations let the protocol logic
/// run against an in-memory peer.
pub trait NetlinkChannel {
    /// Sends one datagram, returning the number of bytes written.
    fn send(&mut self, buf: &[u8]) -> Result<usize, QueryError>;

    /// Receives one datagram into `buf`, returning its size. A size of 0 means that the peer has
    /// nothing more to say.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, QueryError>;

    /// The port id the kernel assigned to this end of the channel.
    fn port_id(&self) -> u32;
}

/// A `NETLINK_NETFILTER` socket, closed when dropped.
#[derive(Debug)]
pub struct NetlinkSocket {
    fd: Option<RawFd>,
    port_id: u32,
}

impl NetlinkSocket {
    /// Opens a socket and binds it to a port id chosen by the kernel.
    pub fn open() -> Result<NetlinkSocket, QueryError> {
        let fd = socket::socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::NetlinkNetFilter,
        )
        .map_err(QueryError::NetlinkOpenError)?;

        // from here on, dropping `sock` closes the file descriptor
        let mut sock = NetlinkSocket {
            fd: Some(fd),
            port_id: 0,
        };

        socket::bind(fd, &SockAddr::new_netlink(0, 0)).map_err(QueryError::NetlinkBindError)?;

        sock.port_id = match socket::getsockname(fd)
            .map_err(QueryError::RetrievingSocketInfoFailed)?
        {
            SockAddr::Netlink(addr) => addr.pid(),
            _ => return Err(QueryError::NotNetlinkSocket),
        };
        debug!("Opened netlink socket with port id {}", sock.port_id);

        Ok(sock)
    }

    /// Closes the socket, reporting a failure of `close(2)`.
    pub fn close(mut self) -> Result<(), QueryError> {
        match self.fd.take() {
            // we don't need to shutdown the socket (in fact, Linux doesn't support that
            // operation, and returns EOPNOTSUPP if we try)
            Some(fd) => nix::unistd::close(fd).map_err(QueryError::CloseFailed),
            None => Ok(()),
        }
    }

    fn raw_fd(&self) -> Result<RawFd, QueryError> {
        self.fd.ok_or(QueryError::NotNetlinkSocket)
    }
}

impl Drop for NetlinkSocket {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            if let Err(e) = nix::unistd::close(fd) {
                warn!("Couldn't close the netlink socket: {}", e);
            }
        }
    }
}

impl NetlinkChannel for NetlinkSocket {
    fn send(&mut self, buf: &[u8]) -> Result<usize, QueryError> {
        socket::send(self.raw_fd()?, buf, MsgFlags::empty()).map_err(QueryError::NetlinkSendError)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, QueryError> {
        socket::recv(self.raw_fd()?, buf, MsgFlags::empty()).map_err(QueryError::NetlinkRecvError)
    }

    fn port_id(&self) -> u32 {
        self.port_id
    }
}

/// A channel plus the sequence counter of the requests sent through it.
///
/// Every message written to the channel consumes a new sequence number, so that replies can be
/// correlated with the request they answer.
#[derive(Debug)]
pub struct Session<C = NetlinkSocket> {
    channel: C,
    seq: u32,
}

impl Session<NetlinkSocket> {
    /// Opens a netlink socket, with a sequence counter seeded from the current time.
    pub fn open() -> Result<Self, QueryError> {
        let seq = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        Ok(Session::new(NetlinkSocket::open()?, seq))
    }

    /// Closes the underlying socket.
    pub fn close(self) -> Result<(), QueryError> {
        self.channel.close()
    }
}

impl<C: NetlinkChannel> Session<C> {
    pub fn new(channel: C, seq: u32) -> Self {
        Session { channel, seq }
    }

    /// Returns the next sequence number to use.
    pub fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Sends a buffer of one or more netlink messages, as a single datagram.
    pub fn send(&mut self, buf: &[u8]) -> Result<(), QueryError> {
        let nb_sent = self.channel.send(buf)?;
        if nb_sent != buf.len() {
            return Err(QueryError::TruncatedSend);
        }
        Ok(())
    }

    /// Reads the replies to the request `seq` until the kernel acknowledges it, terminates a dump
    /// with `NLMSG_DONE` or stops answering.
    ///
    /// Every data message is handed to `cb`, along with the bytes of the whole message (header
    /// included). An error reported by the kernel aborts the loop; `ENOENT` is returned as
    /// [`QueryError::NotFound`].
    pub fn recv_until_done<F>(&mut self, seq: u32, mut cb: F) -> Result<(), QueryError>
    where
        F: FnMut(&nlmsghdr, &[u8]) -> Result<(), QueryError>,
    {
        let mut msg_buffer = vec![0; nft_nlmsg_maxsize() as usize];
        let port_id = self.channel.port_id();

        loop {
            let nb_recv = self.channel.recv(&mut msg_buffer)?;
            if nb_recv == 0 {
                return Ok(());
            }
            let mut buf = &msg_buffer[..nb_recv];
            while !buf.is_empty() {
                let (hdr, msg) = parse_nlmsg(buf)?;
                trace!(
                    "Received message of type {} with seq {}",
                    hdr.nlmsg_type,
                    hdr.nlmsg_seq
                );

                if hdr.nlmsg_pid != 0 && hdr.nlmsg_pid != port_id {
                    return Err(DecodeError::InvalidPortId(hdr.nlmsg_pid).into());
                }

                match msg {
                    // errors are reported even when they relate to another frame of the batch
                    NlMsg::Error(e) if e.error != 0 => {
                        return Err(QueryError::from_kernel_errno(e.error));
                    }
                    _ if hdr.nlmsg_seq != seq => {
                        return Err(DecodeError::InvalidSeq(hdr.nlmsg_seq).into());
                    }
                    NlMsg::Done => return Ok(()),
                    // acknowledgment
                    NlMsg::Error(_) => return Ok(()),
                    NlMsg::Noop => {}
                    NlMsg::NfGenMsg(_, _) => cb(&hdr, &buf[..hdr.nlmsg_len as usize])?,
                }

                // netlink messages are 4 bytes aligned
                let aligned_length = pad_netlink_object_with_variable_size(hdr.nlmsg_len as usize);
                buf = buf.get(aligned_length..).unwrap_or(&[]);
            }
        }
    }
}

/// Returns a buffer containing a netlink message which requests a list of all the netfilter
/// matching objects (e.g. tables, chains, rules, ...).
///
/// Supply the type of objects to retrieve (e.g. [`NFT_MSG_GETRULE`]), and optionally an object
/// whose attributes narrow the request (a rule holding a table and chain name, for example).
pub fn get_list_of_objects<T: NfNetlinkObject>(
    msg_type: u16,
    family: ProtocolFamily,
    seq: u32,
    filter: Option<&T>,
) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut writer = NfNetlinkWriter::new(&mut buffer);
    writer.write_header(msg_type, family, NlmFlags::DUMP, seq, None);
    if let Some(filter) = filter {
        let buf = writer.add_data_zeroed(filter.get_size());
        filter.write_payload(buf);
    }
    writer.finalize_writing_object();
    buffer
}

/// Lists objects of a certain type (e.g. [`NFT_MSG_GETRULE`]), calling `cb` with each decoded
/// object in the order the kernel dumps them. Objects that fail to decode are skipped.
pub fn list_objects_with_data<C, T, F>(
    session: &mut Session<C>,
    msg_type: u16,
    family: ProtocolFamily,
    filter: Option<&T>,
    mut cb: F,
) -> Result<(), QueryError>
where
    C: NetlinkChannel,
    T: NfNetlinkObject,
    F: FnMut(T) -> Result<(), QueryError>,
{
    debug!("Listing objects of kind {} in family {}", msg_type, family);
    let seq = session.next_seq();
    let request = get_list_of_objects(msg_type, family, seq, filter);
    session.send(&request)?;

    session.recv_until_done(seq, |hdr, msg| {
        // objects of other users may use attributes we can't represent
        let (obj, remaining) = match T::deserialize(msg) {
            Ok(res) => res,
            Err(e) => {
                warn!(
                    "Skipping an object that couldn't be decoded (seq {}): {}",
                    hdr.nlmsg_seq, e
                );
                return Ok(());
            }
        };
        if !remaining.is_empty() {
            return Err(DecodeError::InvalidDataSize.into());
        }
        cb(obj)
    })
}

/// Dumps the rules of the table and chain named in `filter`, calling `cb` with each of them.
pub fn dump_rules<C, F>(session: &mut Session<C>, filter: &Rule, cb: F) -> Result<(), QueryError>
where
    C: NetlinkChannel,
    F: FnMut(Rule) -> Result<(), QueryError>,
{
    list_objects_with_data(
        session,
        NFT_MSG_GETRULE,
        filter.get_family(),
        Some(filter),
        cb,
    )
}
