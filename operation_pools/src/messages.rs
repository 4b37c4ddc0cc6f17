use futures::channel::mpsc::UnboundedSender;
use logging::debug_with_status;
use types::capella::containers::SignedBlsToExecutionChange;

#[derive(Debug)]
pub enum PoolToP2pMessage {
    PublishSignedBlsToExecutionChange(Box<SignedBlsToExecutionChange>),
}

impl PoolToP2pMessage {
    pub fn send(self, tx: &UnboundedSender<Self>) {
        if let Err(message) = tx.unbounded_send(self) {
            debug_with_status!("send to p2p failed because the receiver was dropped: {message:?}");
        }
    }
}
