bitflags::bitflags! {
    /// Socket events, used both for what a socket has subscribed to and for what is pending.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Events: u32 {
        /// The socket can accept at least one more maximum-sized frame.
        const SEND = 1;
        /// The socket has at least one frame waiting to be read.
        const READ = 2;
    }
}
