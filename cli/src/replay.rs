//! Headless replay of scripted carousel sessions.
//!
//! A script names the viewport, the items and the story panels on the page,
//! then lists user events. Events drive a [`CarouselCore`] over a
//! [`RecordingView`]; deferred tasks run on a virtual clock that only moves
//! on `wait` events, so a replay is deterministic.

#[cfg(test)]
#[path = "replay_test.rs"]
mod replay_test;

use std::collections::BTreeMap;

use carousel::config::CarouselConfig;
use carousel::engine::{Action, CarouselCore, CarouselItem, CoreSnapshot};
use carousel::error::CarouselError;
use carousel::input::WheelDelta;
use carousel::schedule::TaskToken;
use carousel::story::StoryId;
use carousel::view::{RecordingView, View, Viewport};
use serde::{Deserialize, Serialize};

/// A scripted session.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub viewport: Viewport,
    /// Story id per item, in display order. `null` for items without a story.
    pub items: Vec<Option<String>>,
    /// Story panels present on the page.
    #[serde(default)]
    pub panels: Vec<String>,
    #[serde(default)]
    pub scroll_y: f64,
    pub events: Vec<ScriptEvent>,
}

/// One user action or passage of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// Mouse wheel over the carousel. Unconsumed wheels scroll the page.
    Wheel { dy: f64 },
    /// Click on the item at `index`.
    Click { index: usize },
    /// Click on a back-to-carousel control.
    Back,
    /// Page scrolled to `y`.
    Scroll { y: f64 },
    /// Window resized.
    Resize { width: f64, height: f64 },
    /// Let `ms` milliseconds pass on the virtual clock.
    Wait { ms: u64 },
}

/// Timers armed by the controller, keyed by token, firing at virtual times.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_ms: u64,
    due: BTreeMap<TaskToken, u64>,
}

impl VirtualClock {
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.due.len()
    }

    /// Record scheduling actions. Returns whether a wheel was consumed.
    pub fn apply(&mut self, actions: &[Action]) -> bool {
        let mut consumed = false;
        for action in actions {
            match action {
                Action::ConsumeWheel => consumed = true,
                Action::Schedule(ticket) => {
                    self.due.insert(ticket.token, self.now_ms.saturating_add(u64::from(ticket.delay_ms)));
                }
                Action::Cancel(token) => {
                    self.due.remove(token);
                }
            }
        }
        consumed
    }

    /// Pop the earliest timer due at or before `deadline`, advancing the clock to it.
    ///
    /// Ties fire in token (arming) order.
    pub fn next_due(&mut self, deadline: u64) -> Option<TaskToken> {
        let (token, at) = self
            .due
            .iter()
            .filter(|(_, at)| **at <= deadline)
            .min_by_key(|(token, at)| (**at, **token))
            .map(|(token, at)| (*token, *at))?;
        self.due.remove(&token);
        self.now_ms = self.now_ms.max(at);
        Some(token)
    }

    /// Move the clock forward to `deadline` once nothing else is due.
    pub fn settle(&mut self, deadline: u64) {
        self.now_ms = self.now_ms.max(deadline);
    }
}

/// Controller state after one event.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub at_ms: u64,
    pub event: ScriptEvent,
    pub state: CoreSnapshot,
}

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub steps: Vec<Step>,
    pub state: CoreSnapshot,
    pub view: RecordingView,
}

/// A controller, its in-memory page and the virtual clock.
pub struct Session {
    core: CarouselCore,
    view: RecordingView,
    clock: VirtualClock,
}

impl Session {
    /// Build and start a session for `script`'s page.
    pub fn new(config: CarouselConfig, script: &Script) -> Result<Self, CarouselError> {
        let items = CarouselItem::from_stories(script.items.iter().cloned());
        let panels: Vec<StoryId> = script.panels.iter().map(StoryId::new).collect();
        let mut view = RecordingView::new(script.viewport, items.len(), &panels);
        view.scroll_y = script.scroll_y;
        let mut core = CarouselCore::new(config, items)?;
        core.start(&mut view);
        Ok(Self { core, view, clock: VirtualClock::default() })
    }

    #[must_use]
    pub fn core(&self) -> &CarouselCore {
        &self.core
    }

    #[must_use]
    pub fn view(&self) -> &RecordingView {
        &self.view
    }

    #[must_use]
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Apply one scripted event.
    pub fn step(&mut self, event: &ScriptEvent) {
        match *event {
            ScriptEvent::Wheel { dy } => {
                let actions = self.core.on_wheel(WheelDelta::vertical(dy), &mut self.view);
                if !self.clock.apply(&actions) {
                    let y = (self.view.scroll_offset() + dy).max(0.0);
                    self.view.scroll_page_to(y);
                    self.core.on_page_scroll(&mut self.view);
                }
            }
            ScriptEvent::Click { index } => {
                let actions = self.core.on_item_click(index, &mut self.view);
                self.clock.apply(&actions);
            }
            ScriptEvent::Back => {
                let actions = self.core.close_story(&mut self.view);
                self.clock.apply(&actions);
            }
            ScriptEvent::Scroll { y } => {
                self.view.scroll_page_to(y);
                self.core.on_page_scroll(&mut self.view);
            }
            ScriptEvent::Resize { width, height } => {
                self.view.viewport = Viewport::new(width, height);
                self.core.on_resize(&mut self.view);
            }
            ScriptEvent::Wait { ms } => self.advance(ms),
        }
    }

    /// Run the virtual clock forward, firing due timers in order.
    pub fn advance(&mut self, ms: u64) {
        let deadline = self.clock.now_ms().saturating_add(ms);
        while let Some(token) = self.clock.next_due(deadline) {
            let actions = self.core.fire(token, &mut self.view);
            self.clock.apply(&actions);
        }
        self.clock.settle(deadline);
    }

    /// Replay every event, recording the controller state after each.
    pub fn run(mut self, events: &[ScriptEvent]) -> Report {
        let mut steps = Vec::with_capacity(events.len());
        for event in events {
            self.step(event);
            tracing::debug!(?event, rotation = self.core.rotation(), "replayed event");
            steps.push(Step {
                at_ms: self.clock.now_ms(),
                event: event.clone(),
                state: self.core.snapshot(),
            });
        }
        Report { steps, state: self.core.snapshot(), view: self.view }
    }
}
