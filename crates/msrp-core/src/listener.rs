use bytes::Bytes;

/// Callbacks of an MSRP session towards its owner
///
/// Invoked from the connection's receive thread or from the thread running
/// [`MsrpSession::send_chunks`](crate::MsrpSession::send_chunks).
pub trait MsrpEventListener: Send + Sync {
    /// A complete message arrived
    fn msrp_data_received(&self, data: Bytes, mime_type: Option<&str>);

    /// `current` of `total` bytes sent or received so far
    fn msrp_transfer_progress(&self, current: u64, total: u64);

    /// The peer aborted the incoming message
    fn msrp_transfer_aborted(&self);

    fn msrp_transfer_error(&self, error: &str);

    /// The outgoing message has been sent (and reported, when requested)
    fn msrp_data_transfered(&self);
}
