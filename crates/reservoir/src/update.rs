/// An event raised by the firmware-update endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    /// An image upload has started.
    Started,
    /// An image upload has ended.
    Ended {
        /// Whether the image has been written and verified.
        success: bool,
    },
}

/// The firmware-update endpoint, as observed by the node.
///
/// The endpoint itself accepts and flashes images; the node only needs to
/// drive its pending I/O and learn about the start and the end of an update.
pub trait UpdateEndpoint {
    /// Services the pending endpoint I/O and returns the next event, if any.
    ///
    /// Called once per scheduling tick, before anything else.
    fn poll(&mut self) -> Option<UpdateEvent>;

    /// Checks whether an image is being written.
    fn is_busy(&self) -> bool;
}
