//! Event listener that writes context events to the log.

use colonysim_core::{EventListener, ListenerError};
use colonysim_types::SystemEvent;
use tracing::{debug, info, warn};

/// Logs every context event at a level matching its weight.
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn handle_event(&mut self, event: &SystemEvent) -> Result<(), ListenerError> {
        match event {
            SystemEvent::ResourceCrisis {
                settlement_id,
                resources,
            } => warn!(settlement_id = %settlement_id, resources = ?resources, "event: resource crisis"),
            SystemEvent::StrategicOpportunity { opportunity } => info!(
                settlement_id = %opportunity.settlement_id,
                body = %opportunity.body_id,
                kind = ?opportunity.kind,
                priority = %opportunity.priority,
                "event: strategic opportunity"
            ),
            SystemEvent::MissionQueued { mission } => info!(
                mission_id = %mission.id,
                kind = ?mission.kind,
                "event: mission queued"
            ),
            SystemEvent::SettlementRegistered { settlement_id }
            | SystemEvent::SettlementUnregistered { settlement_id } => {
                info!(settlement_id = %settlement_id, kind = ?event.kind(), "event: settlement roster");
            }
            other => debug!(kind = ?other.kind(), "event"),
        }
        Ok(())
    }
}
