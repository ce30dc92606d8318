/// Credit-based outgoing flow control. The client advertises how many
/// messages it can have in flight (`client_window`); the channel counts
/// messages sent since the last acknowledged generation and refuses to push
/// more once it is more than double the window ahead, mirroring
/// `red_channel_client_waiting_for_ack`.
///
/// A freshly attached client starts permanently blocked: `messages_window`
/// and `client_generation` both start at the sentinel `u32::MAX` so that
/// nothing is sent before the subclass explicitly calls
/// [`AckState::init_outgoing_messages_window`] (mirroring
/// `red_channel_client_init_outgoing_messages_window`), and so a client that
/// has never sent `ACK_SYNC` can never spuriously satisfy
/// `client_generation == generation` while `generation` is still its own
/// initial value of zero.
#[derive(Debug, Clone)]
pub struct AckState {
    handle_acks: bool,
    client_window: u32,
    messages_window: u32,
    generation: u32,
    client_generation: u32,
}

impl AckState {
    #[inline]
    pub fn new(client_window: u32, handle_acks: bool) -> Self {
        AckState {
            handle_acks,
            client_window,
            messages_window: u32::MAX,
            generation: 0,
            client_generation: u32::MAX,
        }
    }

    #[inline]
    pub fn handle_acks(&self) -> bool {
        self.handle_acks
    }

    #[inline]
    pub fn client_window(&self) -> u32 {
        self.client_window
    }

    #[inline]
    pub fn set_client_window(&mut self, window: u32) {
        self.client_window = window;
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Zeroes the messages window, turning a freshly attached (permanently
    /// blocked) client sendable. The subclass calls this exactly once after
    /// the handshake completes; mirrors
    /// `red_channel_client_init_outgoing_messages_window`, which also kicks
    /// the pump immediately afterward (the caller is expected to do the
    /// same, e.g. via `ChannelClient::init_outgoing_messages_window`).
    #[inline]
    pub fn init_outgoing_messages_window(&mut self) {
        self.messages_window = 0;
    }

    /// Record that a message was just pushed to the client.
    #[inline]
    pub fn message_sent(&mut self) {
        self.messages_window += 1;
    }

    /// True once the channel has more unacked messages in flight than the
    /// window tolerates; the pump must stop pushing until an `ACK` arrives.
    /// Always false when this channel doesn't handle acks at all.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.handle_acks && self.messages_window > self.client_window.saturating_mul(2)
    }

    /// Bumps the generation and returns the (generation, window) pair to
    /// send in a `SET_ACK` control message. Sending `SET_ACK` resets the
    /// in-flight counter: the client is expected to start acking against
    /// the new generation from zero.
    #[inline]
    pub fn next_set_ack(&mut self) -> (u32, u32) {
        self.generation += 1;
        self.messages_window = 0;
        (self.generation, self.client_window)
    }

    /// Applies an inbound `ACK` control message, which carries no body on
    /// the wire: the effect depends only on local state. Stale acks (from
    /// before the last `SET_ACK` bumped the generation) are ignored rather
    /// than treated as errors, since the client may have them in flight
    /// already. Returns `true` if the window moved, so the caller knows to
    /// kick the pump.
    #[inline]
    pub fn handle_ack(&mut self) -> bool {
        if self.client_generation == self.generation {
            self.messages_window = self.messages_window.saturating_sub(self.client_window);
            true
        } else {
            false
        }
    }

    /// Applies an inbound `ACK_SYNC` control message, which sets the
    /// generation the client claims to be acking against without resetting
    /// the in-flight counter.
    #[inline]
    pub fn handle_ack_sync(&mut self, generation: u32) {
        self.client_generation = generation;
    }

    #[inline]
    pub fn client_generation(&self) -> u32 {
        self.client_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_permanently_blocked_until_initialized() {
        let ack = AckState::new(10, true);
        assert!(ack.is_blocked());
    }

    #[test]
    fn init_outgoing_messages_window_unblocks_a_fresh_client() {
        let mut ack = AckState::new(10, true);
        ack.init_outgoing_messages_window();
        assert!(!ack.is_blocked());
    }

    #[test]
    fn blocks_once_twice_the_window_is_in_flight() {
        let mut ack = AckState::new(2, true);
        ack.init_outgoing_messages_window();
        assert!(!ack.is_blocked());

        for _ in 0..4 {
            ack.message_sent();
        }
        assert!(!ack.is_blocked());

        ack.message_sent();
        assert!(ack.is_blocked());
    }

    #[test]
    fn set_ack_bumps_generation_and_clears_window() {
        let mut ack = AckState::new(1, true);
        ack.init_outgoing_messages_window();
        ack.message_sent();
        ack.message_sent();
        ack.message_sent();
        assert!(ack.is_blocked());

        let (generation, window) = ack.next_set_ack();
        assert_eq!(generation, 1);
        assert_eq!(window, 1);
        assert!(!ack.is_blocked());
    }

    #[test]
    fn ack_decrements_the_window_instead_of_resetting_it() {
        // Mirrors spec scenario 3: client_window=10, 30 enqueued, 21 sent
        // before the pump stalls, then exactly 10 more after a matching ack.
        let mut ack = AckState::new(10, true);
        ack.init_outgoing_messages_window();

        let mut sent = 0;
        while !ack.is_blocked() {
            ack.message_sent();
            sent += 1;
        }
        assert_eq!(sent, 21);

        ack.handle_ack_sync(ack.generation());
        assert!(ack.handle_ack());
        assert!(!ack.is_blocked());

        let mut more = 0;
        while !ack.is_blocked() {
            ack.message_sent();
            more += 1;
        }
        assert_eq!(more, 10);
    }

    #[test]
    fn stale_ack_generation_is_ignored() {
        let mut ack = AckState::new(1, true);
        ack.init_outgoing_messages_window();
        ack.next_set_ack();
        ack.message_sent();
        ack.message_sent();
        ack.message_sent();

        // client_generation is still the sentinel (never synced): a bare
        // ACK must not match the freshly bumped generation.
        assert!(!ack.handle_ack());
        assert!(ack.is_blocked());

        ack.handle_ack_sync(ack.generation());
        assert!(ack.handle_ack());
        assert!(!ack.is_blocked());
    }

    #[test]
    fn handle_acks_false_never_blocks() {
        let mut ack = AckState::new(1, false);
        for _ in 0..100 {
            ack.message_sent();
        }
        assert!(!ack.is_blocked());
    }
}
