use log::{
    debug,
    warn,
};
use std::net::SocketAddr;
use tokio::sync::mpsc::{
    self,
    error::TrySendError,
};

/// Notifications for whatever front end is watching the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewJob { id: String },
    /// A chunk of print data, decoded lossily for display only.
    PrinterData { peer: SocketAddr, text: String },
    SnmpQuery { peer: SocketAddr },
}

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Never waits: a slow or missing front end loses events instead of
    /// stalling the listeners (or the front end itself, when it issues
    /// commands that notify).
    pub fn notify(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event queue full; dropping {:?}", event),
            Err(TrySendError::Closed(event)) => debug!("No event receiver; dropping {:?}", event),
        }
    }
}
