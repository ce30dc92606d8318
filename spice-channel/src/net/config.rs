/// Tunables for a single channel. Mirrors the constants the original
/// endpoint hardcoded per-protocol (ack window, vectored-send fanout) but
/// keeps them per-instance so tests can exercise small windows quickly.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Messages the client may send before a SET_ACK/ACK roundtrip is
    /// required to unblock the pump again.
    pub client_ack_window: u32,
    /// Whether this channel type participates in the ack flow-control
    /// scheme at all. Channels that don't (`handle_acks = false`) are
    /// never throttled by the ack window.
    pub handle_acks: bool,
    /// Whether this channel type supports the migration handoff
    /// (`MIGRATE_FLUSH_MARK`/`MIGRATE_DATA`). Purely a data-model
    /// attribute a subclass may introspect; the core dispatches those
    /// control messages regardless.
    pub migrate: bool,
    /// Max number of pipe items flushed into a single `writev` call.
    pub max_send_vec: usize,
    /// Max message body size accepted from the wire before the channel
    /// treats it as malformed and tears the connection down.
    pub max_message_size: u32,
}

impl ChannelConfig {
    pub const DEFAULT_CLIENT_ACK_WINDOW: u32 = 30;
    pub const DEFAULT_MAX_SEND_VEC: usize = 16;
    pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;
}

impl Default for ChannelConfig {
    #[inline]
    fn default() -> Self {
        ChannelConfig {
            client_ack_window: Self::DEFAULT_CLIENT_ACK_WINDOW,
            handle_acks: true,
            migrate: false,
            max_send_vec: Self::DEFAULT_MAX_SEND_VEC,
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
