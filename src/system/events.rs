//! Typed event surface of the brewing engine.
//! Sessions return events per input; the bus fans them out to UI-side subscribers.

use crate::types::{MethodParams, Step};
use embassy_sync::{
    blocking_mutex::raw::NoopRawMutex,
    pubsub::{PubSubChannel, Publisher, Subscriber, WaitResult},
};
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StepChanged {
        from: Step,
        to: Step,
    },
    /// Emitted on every accepted tick.
    StageChange {
        index: usize,
        progress_percent: f64,
        is_waiting: bool,
        current_water_g: f64,
        elapsed_s: f64,
    },
    ParameterUpdate {
        equipment_name: String,
        method_name: String,
        params: MethodParams,
    },
    Completion {
        total_elapsed_seconds: f64,
    },
    TimelineRebuilt {
        stage_count: usize,
        total_duration_s: f64,
    },
    TimerStarted {
        epoch: u32,
    },
    TimerPaused {
        elapsed_s: f64,
    },
    TimerReset,
    SessionReset,
}

impl EngineEvent {
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            EngineEvent::StageChange { .. } | EngineEvent::Completion { .. }
        )
    }
}

pub const EVENT_BUS_CAPACITY: usize = 32;
pub const EVENT_BUS_SUBSCRIBERS: usize = 4;
pub const EVENT_BUS_PUBLISHERS: usize = 2;

type Channel = PubSubChannel<
    NoopRawMutex,
    EngineEvent,
    EVENT_BUS_CAPACITY,
    EVENT_BUS_SUBSCRIBERS,
    EVENT_BUS_PUBLISHERS,
>;

/// Single-threaded publish/subscribe channel for [`EngineEvent`]s.
pub struct EventBus {
    channel: Channel,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
        }
    }

    pub fn publisher(&self) -> anyhow::Result<EventPublisher<'_>> {
        let inner = self
            .channel
            .publisher()
            .map_err(|e| anyhow::anyhow!("event bus publisher unavailable: {:?}", e))?;
        Ok(EventPublisher { inner })
    }

    pub fn subscriber(&self) -> anyhow::Result<EventSubscriber<'_>> {
        fn any(_: &EngineEvent) -> bool {
            true
        }
        self.filtered_subscriber(any as fn(&EngineEvent) -> bool)
    }

    pub fn filtered_subscriber<F>(&self, filter: F) -> anyhow::Result<EventSubscriber<'_, F>>
    where
        F: Fn(&EngineEvent) -> bool,
    {
        let inner = self
            .channel
            .subscriber()
            .map_err(|e| anyhow::anyhow!("event bus subscriber unavailable: {:?}", e))?;
        Ok(EventSubscriber { inner, filter })
    }

    /// Only stage progress and completion events.
    pub fn progress_subscriber(&self) -> anyhow::Result<EventSubscriber<'_, fn(&EngineEvent) -> bool>> {
        self.filtered_subscriber(EngineEvent::is_progress as fn(&EngineEvent) -> bool)
    }

    /// Everything except per-tick progress.
    pub fn workflow_subscriber(&self) -> anyhow::Result<EventSubscriber<'_, fn(&EngineEvent) -> bool>> {
        fn not_progress(event: &EngineEvent) -> bool {
            !event.is_progress()
        }
        self.filtered_subscriber(not_progress as fn(&EngineEvent) -> bool)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventPublisher<'a> {
    inner: Publisher<
        'a,
        NoopRawMutex,
        EngineEvent,
        EVENT_BUS_CAPACITY,
        EVENT_BUS_SUBSCRIBERS,
        EVENT_BUS_PUBLISHERS,
    >,
}

impl<'a> EventPublisher<'a> {
    /// Publishes without waiting; a full queue drops its oldest event.
    pub fn publish(&self, event: EngineEvent) {
        debug!("📡 Publishing: {:?}", event);
        self.inner.publish_immediate(event);
    }

    pub fn publish_all<I>(&self, events: I)
    where
        I: IntoIterator<Item = EngineEvent>,
    {
        for event in events {
            self.publish(event);
        }
    }
}

pub struct EventSubscriber<'a, F = fn(&EngineEvent) -> bool>
where
    F: Fn(&EngineEvent) -> bool,
{
    inner: Subscriber<
        'a,
        NoopRawMutex,
        EngineEvent,
        EVENT_BUS_CAPACITY,
        EVENT_BUS_SUBSCRIBERS,
        EVENT_BUS_PUBLISHERS,
    >,
    filter: F,
}

impl<'a, F> EventSubscriber<'a, F>
where
    F: Fn(&EngineEvent) -> bool,
{
    /// Wait for the next event matching the filter
    pub async fn next_event(&mut self) -> EngineEvent {
        loop {
            let event = match self.inner.next_message().await {
                WaitResult::Lagged(count) => {
                    debug!("Subscriber lagged by {} events", count);
                    continue;
                }
                WaitResult::Message(event) => event,
            };
            if (self.filter)(&event) {
                return event;
            }
        }
    }

    /// Try to get next matching event without blocking
    pub fn try_next_event(&mut self) -> Option<EngineEvent> {
        loop {
            let event = match self.inner.try_next_message()? {
                WaitResult::Lagged(count) => {
                    debug!("Subscriber lagged by {} events", count);
                    continue;
                }
                WaitResult::Message(event) => event,
            };
            if (self.filter)(&event) {
                return Some(event);
            }
        }
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        std::iter::from_fn(|| self.try_next_event()).collect()
    }
}
