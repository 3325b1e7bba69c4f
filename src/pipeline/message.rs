//! Messages carried by a closable queue.

/// One slot in a closable queue: either an item or the shutdown sentinel.
///
/// The sentinel is a variant rather than a reserved item value, so no item can
/// ever be mistaken for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMsg<T> {
    Data(T),
    Shutdown,
}

impl<T> ChannelMsg<T> {
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ChannelMsg::Shutdown)
    }
}
