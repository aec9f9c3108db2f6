//! Recording host
//!
//! Implements every host collaborator by logging the callback and keeping a
//! timestamped transcript for the report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sim_bridge::{CallbackKind, ControlLoop, Event, EventSubscriber, Message, MessageSink, MessageType, PlotHandler, PlotRequest};
use std::sync::Mutex;

/// One callback received from the engine
#[derive(Debug, Clone, Serialize)]
pub struct CallbackRecord {
    pub at: DateTime<Utc>,
    pub kind: CallbackKind,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    records: Mutex<Vec<CallbackRecord>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: CallbackKind, detail: impl Into<String>) {
        let record = CallbackRecord {
            at: Utc::now(),
            kind,
            detail: detail.into(),
        };
        // A poisoned transcript is still worth reporting
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
    }

    pub fn records(&self) -> Vec<CallbackRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PlotHandler for RecordingHost {
    fn plot(&self, request: &PlotRequest) -> anyhow::Result<()> {
        let detail = match request.plot_type() {
            Some(plot_type) => format!("{} plot", plot_type),
            None => request.params().to_string(),
        };
        log::info!("Plot requested: {}", detail);
        self.record(CallbackKind::Plot, detail);
        Ok(())
    }
}

impl MessageSink for RecordingHost {
    fn write(&self, message: &Message) -> anyhow::Result<()> {
        match message.kind {
            MessageType::Error => log::error!("{}", message.text),
            MessageType::Help | MessageType::FireOffEditor => log::info!("{}", message.text),
            kind if kind.is_progress() => log::trace!("{:?}: {}", kind, message.text),
            MessageType::Unknown(tag) => log::debug!("[type {}] {}", tag, message.text),
            _ => log::info!("{}", message.text),
        }

        if !message.kind.is_progress() {
            self.record(CallbackKind::Write, format!("{:?}: {}", message.kind, message.text));
        }
        Ok(())
    }
}

impl ControlLoop for RecordingHost {
    fn init(&self) -> anyhow::Result<()> {
        log::debug!("Init controls");
        self.record(CallbackKind::InitControls, "");
        Ok(())
    }

    fn check(&self) -> anyhow::Result<()> {
        log::debug!("Check controls");
        self.record(CallbackKind::CheckControls, "");
        Ok(())
    }

    fn step(&self) -> anyhow::Result<()> {
        log::debug!("Step controls");
        self.record(CallbackKind::StepControls, "");
        Ok(())
    }
}

impl EventSubscriber for RecordingHost {
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        log::debug!("Event {} at step {}", event.code, event.step);
        self.record(CallbackKind::Event, format!("{} (step {})", event.code, event.step));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_bridge::EventCode;

    #[test]
    fn test_records_callbacks_in_order() {
        let host = RecordingHost::new();
        host.plot(&PlotRequest::new(r#"{"PlotType": "Circuit"}"#)).unwrap();
        host.write(&Message {
            text: "Solved".to_string(),
            kind: MessageType::Info,
        })
        .unwrap();
        host.write(&Message {
            text: "50".to_string(),
            kind: MessageType::ProgressPercent,
        })
        .unwrap();
        host.on_event(&Event {
            code: EventCode::CLEAR,
            step: 0,
            payload: std::ptr::null_mut(),
        })
        .unwrap();

        let records = host.records();
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![CallbackKind::Plot, CallbackKind::Write, CallbackKind::Event]);
        assert_eq!(records[0].detail, "Circuit plot");
        assert_eq!(records[1].detail, "Info: Solved");
        assert_eq!(records[2].detail, "clear (step 0)");
    }
}
