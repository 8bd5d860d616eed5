use crate::error::{DecodeError, QueryError};
use crate::nlmsg::{NfNetlinkObject, NfNetlinkWriter, NlmFlags};
use crate::query::{NetlinkChannel, Session};
use crate::sys::{NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END, NFNL_SUBSYS_NFTABLES};
use crate::{MsgType, ProtocolFamily};

/// A batch of netfilter messages to be performed in one atomic operation.
///
/// The kernel only applies the messages it finds between a batch begin and a batch end marker.
pub struct Batch {
    buf: Vec<u8>,
}

impl Batch {
    /// Starts a batch, whose begin marker uses the sequence number `seq`.
    pub fn new(seq: u32) -> Self {
        let mut buf = Vec::new();
        NfNetlinkWriter::new(&mut buf).write_header(
            NFNL_MSG_BATCH_BEGIN,
            ProtocolFamily::Unspec,
            NlmFlags::empty(),
            seq,
            Some(NFNL_SUBSYS_NFTABLES),
        );
        Batch { buf }
    }

    /// Adds the given message to this batch.
    pub fn add<T: NfNetlinkObject>(&mut self, msg: &T, msg_type: MsgType, seq: u32) {
        trace!("Writing NlMsg with seq {} to batch", seq);
        msg.add_or_remove(&mut NfNetlinkWriter::new(&mut self.buf), msg_type, seq);
    }

    /// Adds the end marker, using the sequence number `seq`, and returns the bytes to send to
    /// netfilter.
    pub fn finalize(mut self, seq: u32) -> Vec<u8> {
        let mut writer = NfNetlinkWriter::new(&mut self.buf);
        writer.write_header(
            NFNL_MSG_BATCH_END,
            ProtocolFamily::Unspec,
            NlmFlags::empty(),
            seq,
            Some(NFNL_SUBSYS_NFTABLES),
        );
        writer.finalize_writing_object();
        self.buf
    }
}

/// Adds or removes `obj` in its own transaction, and waits for the kernel to acknowledge it.
///
/// The begin marker, the message and the end marker each consume a sequence number of the
/// session, and are sent together in a single datagram. Any failure is returned as is.
pub fn execute<C, T>(session: &mut Session<C>, obj: &T, msg_type: MsgType) -> Result<(), QueryError>
where
    C: NetlinkChannel,
    T: NfNetlinkObject,
{
    let mut batch = Batch::new(session.next_seq());
    let seq = session.next_seq();
    batch.add(obj, msg_type, seq);
    let buf = batch.finalize(session.next_seq());

    debug!(
        "Sending {:?} of a {} object in family {} with seq {}",
        msg_type,
        std::any::type_name::<T>(),
        obj.get_family(),
        seq
    );
    session.send(&buf)?;

    // a transaction is only ever answered by an acknowledgment
    session.recv_until_done(seq, |hdr, _| {
        Err(DecodeError::UnexpectedType(hdr.nlmsg_type).into())
    })
}
