//! # Events
//!
//! Double-buffered message queues between systems.
//!
//! ## Design
//! [`Events<E>`] is a resource holding two buffers. New events go into the
//! current buffer. [`Events::update`], called once per tick by
//! [`event_update_system`], swaps the buffers and clears the one that
//! becomes current. An event is therefore readable during the tick it was
//! sent and the following one, then dropped.
//!
//! Readers keep an [`EventCursor`] holding the count of events they have
//! seen. Event ids are dense and monotonic, so a cursor stays meaningful
//! across buffer swaps.
//!
//! ```text
//! send(a) update send(b)      buffers: [a] [b]   cursor@0 reads a, b
//! update                      buffers: [b] []    cursor@0 reads b
//! update                      buffers: []  []    a and b are gone
//! ```
//!
//! ## Invariants
//! - `events_a.start_event_count <= events_b.start_event_count <= event_count`.
//! - A cursor never yields an event twice.

use std::fmt;
use std::marker::PhantomData;
use std::slice;

use crate::engine::change::{Res, ResMut};
use crate::engine::component::Resource;


/// Marker for types sent through [`Events`].
pub trait Event: Send + Sync + 'static {}

/// Dense, monotonic id of a sent event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(usize);

impl EventId {
    /// Sequence number of the event.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct EventInstance<E> {
    event_id: EventId,
    event: E,
}

#[derive(Debug)]
struct EventSequence<E> {
    events: Vec<EventInstance<E>>,
    start_event_count: usize,
}

impl<E> Default for EventSequence<E> {
    fn default() -> Self {
        Self { events: Vec::new(), start_event_count: 0 }
    }
}

/// Double-buffered event storage for one event type.
#[derive(Debug)]
pub struct Events<E: Event> {
    events_a: EventSequence<E>,
    events_b: EventSequence<E>,
    event_count: usize,
}

impl<E: Event> Default for Events<E> {
    fn default() -> Self {
        Self { events_a: EventSequence::default(), events_b: EventSequence::default(), event_count: 0 }
    }
}

impl<E: Event> Resource for Events<E> {}

impl<E: Event> Events<E> {
    /// Sends an event into the current buffer.
    pub fn send(&mut self, event: E) -> EventId {
        let event_id = EventId(self.event_count);
        self.events_b.events.push(EventInstance { event_id, event });
        self.event_count += 1;
        event_id
    }

    /// Sends every event of `events`.
    pub fn send_batch(&mut self, events: impl IntoIterator<Item = E>) {
        for event in events {
            self.send(event);
        }
    }

    /// Sends `E::default()`.
    pub fn send_default(&mut self) -> EventId
    where
        E: Default,
    {
        self.send(E::default())
    }

    /// Swaps the buffers and clears the new current buffer.
    pub fn update(&mut self) {
        std::mem::swap(&mut self.events_a, &mut self.events_b);
        self.events_b.events.clear();
        self.events_b.start_event_count = self.event_count;
    }

    /// Cursor positioned at the oldest buffered event.
    pub fn get_cursor(&self) -> EventCursor<E> {
        EventCursor::default()
    }

    /// Cursor positioned after the newest event.
    pub fn get_cursor_current(&self) -> EventCursor<E> {
        EventCursor { last_event_count: self.event_count, _marker: PhantomData }
    }

    /// Id the oldest buffered event had, or would have.
    #[inline]
    pub fn oldest_event_count(&self) -> usize {
        self.events_a.start_event_count
    }

    /// Total number of events ever sent.
    #[inline]
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Number of buffered events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events_a.events.len() + self.events_b.events.len()
    }

    /// Returns `true` if no event is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every buffered event.
    pub fn clear(&mut self) {
        self.events_a.start_event_count = self.event_count;
        self.events_b.start_event_count = self.event_count;
        self.events_a.events.clear();
        self.events_b.events.clear();
    }

    /// Removes and returns every buffered event, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = E> + '_ {
        self.events_a.start_event_count = self.event_count;
        self.events_b.start_event_count = self.event_count;
        self.events_a
            .events
            .drain(..)
            .chain(self.events_b.events.drain(..))
            .map(|instance| instance.event)
    }

    /// Events sent since the last [`Events::update`].
    pub fn iter_current_update_events(&self) -> impl ExactSizeIterator<Item = &E> {
        self.events_b.events.iter().map(|instance| &instance.event)
    }
}

/// Read position of one consumer in an [`Events`] stream.
pub struct EventCursor<E: Event> {
    last_event_count: usize,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Event> Default for EventCursor<E> {
    fn default() -> Self {
        Self { last_event_count: 0, _marker: PhantomData }
    }
}

impl<E: Event> Clone for EventCursor<E> {
    fn clone(&self) -> Self {
        Self { last_event_count: self.last_event_count, _marker: PhantomData }
    }
}

impl<E: Event> fmt::Debug for EventCursor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCursor")
            .field("event", &std::any::type_name::<E>())
            .field("last_event_count", &self.last_event_count)
            .finish()
    }
}

impl<E: Event> EventCursor<E> {
    /// Iterates over unread events, marking them read as they are yielded.
    pub fn read<'a>(&'a mut self, events: &'a Events<E>) -> EventIterator<'a, E> {
        EventIterator::new(self, events)
    }

    /// Like [`EventCursor::read`], also yielding event ids.
    pub fn read_with_id<'a>(
        &'a mut self,
        events: &'a Events<E>,
    ) -> impl Iterator<Item = (&'a E, EventId)> + 'a {
        EventIterator::new(self, events).with_ids()
    }

    /// Number of unread events.
    pub fn len(&self, events: &Events<E>) -> usize {
        events.event_count.saturating_sub(self.last_event_count).min(events.len())
    }

    /// Returns `true` if there is nothing to read.
    pub fn is_empty(&self, events: &Events<E>) -> bool {
        self.len(events) == 0
    }

    /// Number of events dropped before this cursor read them.
    pub fn missed_events(&self, events: &Events<E>) -> usize {
        events.oldest_event_count().saturating_sub(self.last_event_count)
    }

    /// Marks every buffered event read.
    pub fn clear(&mut self, events: &Events<E>) {
        self.last_event_count = events.event_count;
    }
}

/// Iterator over unread events.
pub struct EventIterator<'a, E: Event> {
    cursor: &'a mut EventCursor<E>,
    chain: std::iter::Chain<slice::Iter<'a, EventInstance<E>>, slice::Iter<'a, EventInstance<E>>>,
    unread: usize,
}

impl<'a, E: Event> EventIterator<'a, E> {
    fn new(cursor: &'a mut EventCursor<E>, events: &'a Events<E>) -> Self {
        let a_index = cursor.last_event_count.saturating_sub(events.events_a.start_event_count);
        let b_index = cursor.last_event_count.saturating_sub(events.events_b.start_event_count);
        let a = events.events_a.events.get(a_index..).unwrap_or_default();
        let b = events.events_b.events.get(b_index..).unwrap_or_default();
        let unread = a.len() + b.len();
        cursor.last_event_count = events.event_count - unread;
        Self { cursor, chain: a.iter().chain(b.iter()), unread }
    }

    fn with_ids(self) -> impl Iterator<Item = (&'a E, EventId)> + 'a {
        let EventIterator { cursor, chain, .. } = self;
        chain.map(move |instance| {
            cursor.last_event_count += 1;
            (&instance.event, instance.event_id)
        })
    }
}

impl<'a, E: Event> Iterator for EventIterator<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<&'a E> {
        let instance = self.chain.next()?;
        self.cursor.last_event_count += 1;
        self.unread -= 1;
        Some(&instance.event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.unread, Some(self.unread))
    }
}

impl<E: Event> ExactSizeIterator for EventIterator<'_, E> {}

/// System parameter reading events of type `E`.
pub struct EventReader<'w, 's, E: Event> {
    pub(crate) cursor: &'s mut EventCursor<E>,
    pub(crate) events: Res<'w, Events<E>>,
}

impl<'w, 's, E: Event> EventReader<'w, 's, E> {
    /// Iterates over events this system has not seen yet.
    pub fn read(&mut self) -> EventIterator<'_, E> {
        self.cursor.read(&self.events)
    }

    /// Number of unread events.
    pub fn len(&self) -> usize {
        self.cursor.len(&self.events)
    }

    /// Returns `true` if there is nothing to read.
    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty(&self.events)
    }

    /// Marks every buffered event read.
    pub fn clear(&mut self) {
        self.cursor.clear(&self.events);
    }
}

/// System parameter sending events of type `E`.
pub struct EventWriter<'w, E: Event> {
    pub(crate) events: ResMut<'w, Events<E>>,
}

impl<'w, E: Event> EventWriter<'w, E> {
    /// Sends `event`.
    pub fn send(&mut self, event: E) -> EventId {
        self.events.send(event)
    }

    /// Sends every event of `events`.
    pub fn send_batch(&mut self, events: impl IntoIterator<Item = E>) {
        self.events.send_batch(events);
    }

    /// Sends `E::default()`.
    pub fn send_default(&mut self) -> EventId
    where
        E: Default,
    {
        self.events.send_default()
    }
}

/// Swaps the buffers of `Events<E>` once per run. Add it to a schedule.
pub fn event_update_system<E: Event>(events: Option<ResMut<Events<E>>>) {
    if let Some(mut events) = events {
        events.update();
    }
}
