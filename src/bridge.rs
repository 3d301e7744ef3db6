//! Latest-wins channels connecting the capture stage to the detection worker.
//!
//! A [`latest`] channel holds at most one item. Sending never blocks: when the slot is occupied,
//! the channel's [`Overflow`] policy decides whether the stale item is replaced or the new one is
//! discarded. The policy is fixed when the channel is created, so one direction never mixes both.
//!
//! [`frame_bridge`] pairs two such channels into a [`CaptureEnd`] and a [`DetectEnd`]: frames
//! (followed by a final [`Message::Sentinel`]) flow towards the worker, results flow back.
//!
//! Under load, intermediate items are lost instead of queued. There is no ordering guarantee
//! beyond "at most one item in flight per direction".

use std::time::Duration;

use crossbeam::channel::{
    self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};
use thiserror::Error;

/// What a latest-wins channel does when an item is sent while the slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Remove the stale item and store the new one.
    #[default]
    EvictOldest,
    /// Keep the stale item and discard the new one.
    DropNewest,
}

/// Outcome of a successful, non-blocking send.
///
/// A full slot is an expected backpressure signal, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    /// The slot was empty; the item is now in it.
    Delivered,
    /// The slot was full; its stale item was discarded and replaced.
    Evicted,
    /// The slot was full; the new item was discarded.
    Dropped,
}

/// The other end of the channel was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel disconnected")]
pub struct Disconnected;

/// Creates a capacity-1 latest-wins channel with the given overflow policy.
pub fn latest<T>(overflow: Overflow) -> (LatestSender<T>, LatestReceiver<T>) {
    let (sender, recv) = channel::bounded(1);
    // Nothing is ever sent over this one. It only tells the sender whether the receiver still
    // exists, since the sender keeps its own handle to the slot for evicting stale items.
    let (alive, alive_recv) = channel::bounded(0);
    (
        LatestSender {
            sender,
            evict: recv.clone(),
            receiver_alive: alive_recv,
            overflow,
        },
        LatestReceiver {
            recv,
            _alive: alive,
        },
    )
}

/// Sending half of a [`latest`] channel.
///
/// There is exactly one sender per channel, so an emptied slot can only be refilled by it.
pub struct LatestSender<T> {
    sender: Sender<T>,
    evict: Receiver<T>,
    receiver_alive: Receiver<()>,
    overflow: Overflow,
}

impl<T> LatestSender<T> {
    /// Returns whether the slot currently holds an item.
    pub fn is_full(&self) -> bool {
        self.sender.is_full()
    }

    /// Returns whether the [`LatestReceiver`] was dropped.
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self.receiver_alive.try_recv(),
            Err(TryRecvError::Disconnected)
        )
    }

    /// Sends `item` without blocking, applying the overflow policy if the slot is occupied.
    pub fn try_send(&self, item: T) -> Result<Sent, Disconnected> {
        if self.is_disconnected() {
            return Err(Disconnected);
        }

        let item = match self.sender.try_send(item) {
            Ok(()) => return Ok(Sent::Delivered),
            Err(TrySendError::Disconnected(_)) => return Err(Disconnected),
            Err(TrySendError::Full(item)) => item,
        };

        match self.overflow {
            Overflow::DropNewest => Ok(Sent::Dropped),
            Overflow::EvictOldest => {
                // The receiver may have taken the item in the meantime, in which case there is
                // nothing left to evict.
                let evicted = self.evict.try_recv().is_ok();
                match self.sender.try_send(item) {
                    Ok(()) if evicted => Ok(Sent::Evicted),
                    Ok(()) => Ok(Sent::Delivered),
                    Err(TrySendError::Disconnected(_)) => Err(Disconnected),
                    // unreachable with a single sender
                    Err(TrySendError::Full(_)) => Ok(Sent::Dropped),
                }
            }
        }
    }

    /// Sends the last item on this channel.
    ///
    /// With [`Overflow::EvictOldest`] this is [`LatestSender::try_send`]. With
    /// [`Overflow::DropNewest`] the final item must not be discarded, so this waits up to `timeout`
    /// for the receiver to empty the slot and returns [`Sent::Dropped`] if it didn't.
    pub fn send_final(&self, item: T, timeout: Duration) -> Result<Sent, Disconnected> {
        match self.overflow {
            Overflow::EvictOldest => self.try_send(item),
            Overflow::DropNewest => {
                if self.is_disconnected() {
                    return Err(Disconnected);
                }
                match self.sender.send_timeout(item, timeout) {
                    Ok(()) => Ok(Sent::Delivered),
                    Err(SendTimeoutError::Timeout(_)) => Ok(Sent::Dropped),
                    Err(SendTimeoutError::Disconnected(_)) => Err(Disconnected),
                }
            }
        }
    }
}

/// Receiving half of a [`latest`] channel.
pub struct LatestReceiver<T> {
    recv: Receiver<T>,
    _alive: Sender<()>,
}

impl<T> LatestReceiver<T> {
    /// Takes the current item out of the slot without blocking.
    ///
    /// Returns `Ok(None)` if the slot is empty. Items sent before the sender was dropped are still
    /// returned; [`Disconnected`] is only reported once the slot is empty.
    pub fn try_recv(&self) -> Result<Option<T>, Disconnected> {
        match self.recv.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Disconnected),
        }
    }

    /// Waits up to `timeout` for an item.
    ///
    /// Returns `Ok(None)` if none arrived in time.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, Disconnected> {
        match self.recv.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Disconnected),
        }
    }
}

/// An item on the input channel of a [`frame_bridge`].
#[derive(Debug)]
pub enum Message<T> {
    Data(T),
    /// No more input will follow. The consumer must stop reading after observing it.
    Sentinel,
}

/// Creates the two channels between the capture stage and the detection worker.
///
/// `input` is the overflow policy of the frame direction, `output` the one of the result
/// direction.
pub fn frame_bridge<I, O>(
    input: Overflow,
    output: Overflow,
) -> (CaptureEnd<I, O>, DetectEnd<I, O>) {
    let (input_tx, input_rx) = latest(input);
    let (output_tx, output_rx) = latest(output);
    (
        CaptureEnd {
            input: input_tx,
            output: output_rx,
        },
        DetectEnd {
            input: input_rx,
            output: output_tx,
            finished: false,
        },
    )
}

/// The capture stage's side of a [`frame_bridge`]. Every operation is non-blocking or bounded.
pub struct CaptureEnd<I, O> {
    input: LatestSender<Message<I>>,
    output: LatestReceiver<O>,
}

impl<I, O> CaptureEnd<I, O> {
    /// Hands `item` to the consumer without blocking.
    pub fn send(&self, item: I) -> Result<Sent, Disconnected> {
        self.input.try_send(Message::Data(item))
    }

    /// Asks the consumer to stop.
    ///
    /// This is the only termination signal. Under [`Overflow::EvictOldest`] the Sentinel replaces
    /// any pending item; under [`Overflow::DropNewest`] this waits up to `timeout` for the slot to
    /// free up.
    pub fn send_sentinel(&self, timeout: Duration) -> Result<Sent, Disconnected> {
        self.input.send_final(Message::Sentinel, timeout)
    }

    /// Takes the latest result, if one is waiting.
    pub fn try_recv(&self) -> Result<Option<O>, Disconnected> {
        self.output.try_recv()
    }
}

/// The consumer's side of a [`frame_bridge`].
pub struct DetectEnd<I, O> {
    input: LatestReceiver<Message<I>>,
    output: LatestSender<O>,
    finished: bool,
}

impl<I, O> DetectEnd<I, O> {
    /// Waits up to `timeout` for the next input message.
    ///
    /// Once the Sentinel was returned, this never reads from the channel again and keeps
    /// returning [`Message::Sentinel`].
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message<I>>, Disconnected> {
        if self.finished {
            return Ok(Some(Message::Sentinel));
        }
        let msg = self.input.recv_timeout(timeout)?;
        if let Some(Message::Sentinel) = msg {
            self.finished = true;
        }
        Ok(msg)
    }

    /// Publishes a result without blocking.
    pub fn publish(&self, result: O) -> Result<Sent, Disconnected> {
        self.output.try_send(result)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    #[test]
    fn latest_wins() {
        let (tx, rx) = latest(Overflow::EvictOldest);
        assert_eq!(tx.try_send(1), Ok(Sent::Delivered));
        assert!(tx.is_full());
        assert_eq!(tx.try_send(2), Ok(Sent::Evicted));
        assert_eq!(rx.try_recv(), Ok(Some(2)));
        assert_eq!(rx.try_recv(), Ok(None));
    }

    #[test]
    fn drop_newest_keeps_stale_item() {
        let (tx, rx) = latest(Overflow::DropNewest);
        assert_eq!(tx.try_send(1), Ok(Sent::Delivered));
        assert_eq!(tx.try_send(2), Ok(Sent::Dropped));
        assert_eq!(rx.try_recv(), Ok(Some(1)));
        assert_eq!(rx.try_recv(), Ok(None));
    }

    #[test]
    fn sender_never_blocks_on_paused_consumer() {
        for overflow in [Overflow::EvictOldest, Overflow::DropNewest] {
            let (tx, rx) = latest(overflow);
            let start = Instant::now();
            for i in 0..1000 {
                tx.try_send(vec![0u8; 64 * i]).unwrap();
            }
            assert!(
                start.elapsed() < Duration::from_millis(500),
                "{overflow:?}: {:?}",
                start.elapsed()
            );
            assert!(rx.try_recv().unwrap().is_some());
        }
    }

    #[test]
    fn disconnect_is_reported_both_ways() {
        let (tx, rx) = latest::<u32>(Overflow::EvictOldest);
        assert!(!tx.is_disconnected());
        drop(rx);
        assert!(tx.is_disconnected());
        assert_eq!(tx.try_send(1), Err(Disconnected));

        let (tx, rx) = latest(Overflow::EvictOldest);
        tx.try_send(7).unwrap();
        drop(tx);
        // pending item is still delivered
        assert_eq!(rx.try_recv(), Ok(Some(7)));
        assert_eq!(rx.try_recv(), Err(Disconnected));
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)), Err(Disconnected));
    }

    #[test]
    fn recv_timeout_returns_none_when_idle() {
        let (_tx, rx) = latest::<u32>(Overflow::EvictOldest);
        let start = Instant::now();
        assert_eq!(rx.recv_timeout(Duration::from_millis(20)), Ok(None));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn sentinel_replaces_pending_frame() {
        let (capture, mut detect) =
            frame_bridge::<u32, u32>(Overflow::EvictOldest, Overflow::EvictOldest);
        assert_eq!(capture.send(1), Ok(Sent::Delivered));
        assert_eq!(capture.send_sentinel(Duration::ZERO), Ok(Sent::Evicted));
        let timeout = Duration::from_millis(10);
        assert!(matches!(detect.recv_timeout(timeout), Ok(Some(Message::Sentinel))));
        // never reads again once finished
        capture.send(2).unwrap();
        assert!(matches!(detect.recv_timeout(timeout), Ok(Some(Message::Sentinel))));
    }

    #[test]
    fn sentinel_waits_for_slot_under_drop_newest() {
        let (capture, mut detect) =
            frame_bridge::<u32, u32>(Overflow::DropNewest, Overflow::EvictOldest);
        capture.send(1).unwrap();

        let consumer = thread::spawn(move || {
            let mut seen = Vec::new();
            loop {
                match detect.recv_timeout(Duration::from_millis(10)).unwrap() {
                    Some(Message::Data(n)) => seen.push(n),
                    Some(Message::Sentinel) => return seen,
                    None => {}
                }
            }
        });

        assert_eq!(
            capture.send_sentinel(Duration::from_secs(5)),
            Ok(Sent::Delivered)
        );
        assert_eq!(consumer.join().unwrap(), [1]);
    }

    #[test]
    fn results_flow_back() {
        let (capture, detect) =
            frame_bridge::<u32, &str>(Overflow::EvictOldest, Overflow::EvictOldest);
        assert_eq!(capture.try_recv(), Ok(None));
        detect.publish("one").unwrap();
        assert_eq!(detect.publish("two"), Ok(Sent::Evicted));
        assert_eq!(capture.try_recv(), Ok(Some("two")));

        drop(detect);
        assert_eq!(capture.try_recv(), Err(Disconnected));
        assert_eq!(capture.send(1), Err(Disconnected));
    }
}
