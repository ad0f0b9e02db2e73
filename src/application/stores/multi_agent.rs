//! Multi-agent orchestrations and meetings.

use serde::Serialize;
use tracing::info;

use super::{prepend, replace_by_id, Loadable, StoreCell};
use crate::domain::{ApiFailure, Backend, Meeting, MeetingTurn, Orchestration, Participant};
use crate::infrastructure::RequestClient;

/// Body of an orchestration create call.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrchestration {
    pub name: String,
    pub mode: String,
    pub participants: Vec<Participant>,
}

/// Body of a meeting start call.
#[derive(Debug, Clone, Serialize)]
pub struct NewMeeting {
    pub orchestration_id: String,
    pub topic: String,
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MultiAgentState {
    pub orchestrations: Vec<Orchestration>,
    pub meetings: Vec<Meeting>,
    pub loading: bool,
}

impl Loadable for MultiAgentState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

pub struct MultiAgentStore {
    client: RequestClient,
    state: StoreCell<MultiAgentState>,
}

impl MultiAgentStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(MultiAgentState::default()),
        }
    }

    pub fn snapshot(&self) -> MultiAgentState {
        self.state.snapshot()
    }

    pub async fn hydrate(&self) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let (orchestrations, meetings) = tokio::join!(
            self.client
                .get::<Vec<Orchestration>>(Backend::Engine, "/multi-agent/orchestrations"),
            self.client.get::<Vec<Meeting>>(Backend::Engine, "/multi-agent/meetings"),
        );
        let orchestrations = orchestrations.into_result();
        let meetings = meetings.into_result();

        self.state.update(|s| {
            if let Ok(orchestrations) = &orchestrations {
                s.orchestrations.clone_from(orchestrations);
            }
            if let Ok(meetings) = &meetings {
                s.meetings.clone_from(meetings);
            }
        });
        orchestrations.and(meetings).map(|_| ())
    }

    pub async fn create_orchestration(
        &self,
        request: &NewOrchestration,
    ) -> Result<Orchestration, ApiFailure> {
        let orchestration = self
            .client
            .post::<Orchestration>(Backend::Engine, "/multi-agent/orchestrations", request)
            .await
            .into_result()?;
        info!(orchestration = %orchestration.id, "Orchestration created");
        self.state
            .update(|s| prepend(&mut s.orchestrations, orchestration.clone()));
        Ok(orchestration)
    }

    pub async fn start_meeting(&self, request: &NewMeeting) -> Result<Meeting, ApiFailure> {
        let meeting = self
            .client
            .post::<Meeting>(Backend::Engine, "/multi-agent/meetings", request)
            .await
            .into_result()?;
        info!(meeting = %meeting.id, topic = %meeting.topic, "Meeting started");
        self.state.update(|s| prepend(&mut s.meetings, meeting.clone()));
        Ok(meeting)
    }

    /// Append a turn; the engine returns the updated meeting.
    pub async fn record_turn(&self, meeting_id: &str, turn: &MeetingTurn) -> Result<Meeting, ApiFailure> {
        let meeting = self
            .client
            .post::<Meeting>(
                Backend::Engine,
                &format!("/multi-agent/meetings/{meeting_id}/turns"),
                turn,
            )
            .await
            .into_result()?;
        self.state.update(|s| {
            replace_by_id(&mut s.meetings, meeting.clone());
        });
        Ok(meeting)
    }
}
