use crate::acquisition::{RequestTicket, ServiceError, ServiceResponse};
use crate::mesh::{ColorLayer, CostLayer, GeometryPayload};

/// Every callback that can mutate a [`crate::display::MeshDisplay`].
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Geometry(GeometryPayload),
    Colors(ColorLayer),
    Costs(CostLayer),
    Response {
        ticket: RequestTicket,
        result: Result<ServiceResponse, ServiceError>,
    },
    Refresh,
    Reset,
}

#[cfg(feature = "event-queue")]
pub use queue::{EventQueue, EventSender};

#[cfg(feature = "event-queue")]
mod queue {
    use super::DisplayEvent;
    use crate::acquisition::{RequestTicket, ServiceError, ServiceResponse};
    use crate::display::MeshDisplay;
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

    /// Cloneable handle transport callbacks use to reach the display task.
    #[derive(Debug, Clone)]
    pub struct EventSender {
        tx: UnboundedSender<DisplayEvent>,
    }

    impl EventSender {
        /// Returns false once the queue has been dropped.
        pub fn send(&self, event: DisplayEvent) -> bool {
            self.tx.send(event).is_ok()
        }

        pub fn respond(
            &self,
            ticket: RequestTicket,
            result: Result<ServiceResponse, ServiceError>,
        ) -> bool {
            self.send(DisplayEvent::Response { ticket, result })
        }
    }

    /// Single consumer that serializes events into one display.
    pub struct EventQueue {
        rx: UnboundedReceiver<DisplayEvent>,
    }

    impl EventQueue {
        pub fn channel() -> (EventSender, EventQueue) {
            let (tx, rx) = mpsc::unbounded_channel();
            (EventSender { tx }, EventQueue { rx })
        }

        /// Applies events until every sender is gone. Returns how many were
        /// handled.
        pub async fn run(&mut self, display: &mut MeshDisplay) -> usize {
            let mut handled = 0;
            while let Some(event) = self.rx.recv().await {
                apply(display, event);
                handled += 1;
            }
            log::debug!("[display] event queue closed after {handled} events");
            handled
        }

        /// Applies whatever is queued right now without waiting.
        pub fn drain_ready(&mut self, display: &mut MeshDisplay) -> usize {
            let mut handled = 0;
            loop {
                match self.rx.try_recv() {
                    Ok(event) => {
                        apply(display, event);
                        handled += 1;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            handled
        }
    }

    fn apply(display: &mut MeshDisplay, event: DisplayEvent) {
        // errors already reach the status surface and the log
        if let Err(err) = display.handle(event) {
            log::debug!("[display] event failed: {err}");
        }
    }

}
