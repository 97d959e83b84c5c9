//! Per-channel subscription bookkeeping.
//!
//! The book records which channels the application wants and how far each
//! one got on the current connection. It does no I/O; the driver in
//! `subscription.rs` consults it to decide which frames to send and which
//! asynchronous results to discard.
//!
//! Every authorization request is stamped with a ticket. A result is only
//! accepted while its channel is still `Authorizing` under that same ticket,
//! so a grant that arrives after an unsubscribe or after the connection was
//! reset is dropped instead of resurrecting the subscription.

use std::collections::BTreeMap;

/// Subscription state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Wanted, waiting for a connection to authorize on.
    Pending,
    /// Grant requested or subscribe frame sent; awaiting the outcome.
    Authorizing,
    /// The server confirmed the subscription.
    Subscribed,
    /// The server refused the grant. Other channels are unaffected.
    Forbidden,
    /// Authorization failed for a reason other than a refusal.
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: ChannelState,
    ticket: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionBook {
    channels: BTreeMap<String, Entry>,
    next_ticket: u64,
}

impl SubscriptionBook {
    /// Record interest in `channel`.
    ///
    /// Returns `true` if the channel now needs an authorization round-trip:
    /// it was not wanted before, or its last attempt was refused or failed.
    pub fn want(&mut self, channel: &str) -> bool {
        match self.channels.get_mut(channel) {
            Some(entry) => match entry.state {
                ChannelState::Forbidden | ChannelState::Failed => {
                    entry.state = ChannelState::Pending;
                    true
                }
                _ => false,
            },
            None => {
                self.channels.insert(
                    channel.to_owned(),
                    Entry {
                        state: ChannelState::Pending,
                        ticket: 0,
                    },
                );
                true
            }
        }
    }

    /// Forget `channel`, returning the state it was in.
    ///
    /// Idempotent: a second call returns `None`.
    pub fn release(&mut self, channel: &str) -> Option<ChannelState> {
        self.channels.remove(channel).map(|entry| entry.state)
    }

    /// Move a `Pending` channel to `Authorizing` and return its ticket.
    pub fn begin_authorization(&mut self, channel: &str) -> Option<u64> {
        let entry = self.channels.get_mut(channel)?;
        if entry.state != ChannelState::Pending {
            return None;
        }
        self.next_ticket += 1;
        entry.state = ChannelState::Authorizing;
        entry.ticket = self.next_ticket;
        Some(entry.ticket)
    }

    /// `true` if a result stamped with `ticket` is still current.
    pub fn is_current(&self, channel: &str, ticket: u64) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|e| e.state == ChannelState::Authorizing && e.ticket == ticket)
    }

    /// Confirm a subscription. Ignored unless the channel is `Authorizing`.
    pub fn confirm(&mut self, channel: &str) -> bool {
        self.transition(channel, ChannelState::Subscribed)
    }

    /// Record a refusal. Ignored unless the channel is `Authorizing`.
    pub fn refuse(&mut self, channel: &str) -> bool {
        self.transition(channel, ChannelState::Forbidden)
    }

    /// Record a non-refusal failure. Ignored unless the channel is `Authorizing`.
    pub fn fail(&mut self, channel: &str) -> bool {
        self.transition(channel, ChannelState::Failed)
    }

    fn transition(&mut self, channel: &str, to: ChannelState) -> bool {
        match self.channels.get_mut(channel) {
            Some(entry) if entry.state == ChannelState::Authorizing => {
                entry.state = to;
                true
            }
            _ => false,
        }
    }

    /// Drop every per-connection grant after the transport was lost.
    ///
    /// Subscribed, in-flight and failed channels go back to `Pending` so they
    /// are re-authorized on the next connection. Refused channels stay
    /// refused until the application asks for them again.
    pub fn reset_for_reconnect(&mut self) {
        for entry in self.channels.values_mut() {
            if entry.state != ChannelState::Forbidden {
                entry.state = ChannelState::Pending;
            }
        }
    }

    /// Channels waiting for an authorization round-trip.
    pub fn pending(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(_, e)| e.state == ChannelState::Pending)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ChannelState> {
        self.channels
            .iter()
            .map(|(name, e)| (name.clone(), e.state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CH: &str = "private-ai.user.42";

    #[test]
    fn test_happy_path() {
        let mut book = SubscriptionBook::default();
        assert!(book.want(CH));
        assert!(!book.want(CH));
        let ticket = book.begin_authorization(CH).unwrap();
        assert!(book.is_current(CH, ticket));
        assert!(book.confirm(CH));
        assert_eq!(book.snapshot()[CH], ChannelState::Subscribed);
    }

    #[test]
    fn test_reconnect_requires_new_authorization() {
        let mut book = SubscriptionBook::default();
        book.want(CH);
        let first = book.begin_authorization(CH).unwrap();
        book.confirm(CH);

        book.reset_for_reconnect();
        assert_eq!(book.pending(), vec![CH.to_owned()]);
        assert!(!book.confirm(CH), "a stale confirmation must not resubscribe");

        let second = book.begin_authorization(CH).unwrap();
        assert_ne!(first, second);
        assert!(!book.is_current(CH, first));
        assert!(book.is_current(CH, second));
    }

    #[test]
    fn test_result_after_release_is_stale() {
        let mut book = SubscriptionBook::default();
        book.want(CH);
        let ticket = book.begin_authorization(CH).unwrap();
        assert_eq!(book.release(CH), Some(ChannelState::Authorizing));
        assert_eq!(book.release(CH), None);
        assert!(!book.is_current(CH, ticket));
        assert!(!book.confirm(CH));
    }

    #[test]
    fn test_result_after_reset_is_stale() {
        let mut book = SubscriptionBook::default();
        book.want(CH);
        let ticket = book.begin_authorization(CH).unwrap();
        book.reset_for_reconnect();
        assert!(!book.is_current(CH, ticket));
    }

    #[test]
    fn test_forbidden_is_isolated_and_retryable() {
        let mut book = SubscriptionBook::default();
        let other = "private-ai.user.7";
        book.want(CH);
        book.want(other);
        book.begin_authorization(CH);
        book.begin_authorization(other);
        book.confirm(CH);
        book.refuse(other);

        let snapshot = book.snapshot();
        assert_eq!(snapshot[CH], ChannelState::Subscribed);
        assert_eq!(snapshot[other], ChannelState::Forbidden);

        book.reset_for_reconnect();
        assert_eq!(book.pending(), vec![CH.to_owned()]);

        assert!(book.want(other));
        assert_eq!(book.snapshot()[other], ChannelState::Pending);
    }
}
