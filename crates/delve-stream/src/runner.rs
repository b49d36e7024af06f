//! The run loop: drive one research stream from open to terminal state.
//!
//! [`StreamRunner::run`] opens the stream, feeds every record through the
//! [`Ingestor`], publishes heartbeats, and persists the terminal snapshot.
//! Two degradation paths keep a run useful without a live stream:
//!
//! - stream rejected or interrupted: persist what accumulated, then poll
//!   the state endpoint until the backend reports a terminal status or the
//!   attempt budget runs out;
//! - cancellation (session switch, new chat): persist and return promptly.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use delve_bus::{BusEvent, NoticeLevel};
use delve_core::events::StreamRequest;
use delve_core::ids::{ClientId, ResearchId, SessionId};
use delve_core::state::{ResearchIdentity, ResearchState, ResearchStatus};
use delve_settings::types::DelveSettings;
use delve_store::StateService;

use crate::client::ResearchStreamClient;
use crate::errors::Result;
use crate::ingest::{Applied, Ingestor};

/// Tunables for one run, lifted out of settings.
#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    /// Heartbeat publish interval.
    pub heartbeat_interval: Duration,
    /// Delay between polling attempts after a stream failure.
    pub poll_interval: Duration,
    /// Polling attempt budget.
    pub poll_max_attempts: u32,
    /// Synthetic approval cadence, when configured.
    pub approval_cadence: Option<u32>,
}

impl RunOptions {
    /// Lift options from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &DelveSettings) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(settings.client.heartbeat_interval_secs),
            poll_interval: Duration::from_secs(settings.client.poll_interval_secs),
            poll_max_attempts: settings.client.poll_max_attempts,
            approval_cadence: settings.approval.cadence,
        }
    }
}

/// Drives research runs against the streaming endpoint.
pub struct StreamRunner {
    client: ResearchStreamClient,
    service: StateService,
    options: RunOptions,
}

impl StreamRunner {
    /// Build a runner over an opened service.
    #[must_use]
    pub fn new(client: ResearchStreamClient, service: StateService, options: RunOptions) -> Self {
        Self {
            client,
            service,
            options,
        }
    }

    /// Run one research stream to a terminal state.
    ///
    /// Returns the final accumulated state. The run ends when the backend
    /// sends `complete` or `error`, when polling fallback resolves, when
    /// the attempt budget is exhausted, or when `cancel` fires.
    #[instrument(skip_all, fields(session_id = %request.session_id))]
    pub async fn run(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ResearchState> {
        let identity = ResearchIdentity {
            session_id: SessionId::new(&request.session_id),
            research_id: ResearchId::new(&request.research_id),
            client_id: ClientId::new(&request.client_id),
        };
        let bus = self.service.bus().clone();
        let mut ingestor = Ingestor::new(
            identity,
            request.research_objective.clone(),
            self.options.approval_cadence,
            bus.clone(),
        );
        self.service.record_history(
            &request.session_id,
            Some(&request.research_id),
            &request.research_objective,
        )?;

        let mut events = match self.client.open(&request).await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "stream open failed");
                bus.publish(BusEvent::Notice {
                    level: NoticeLevel::Warning,
                    message: "Live stream unavailable, polling for results".to_string(),
                });
                return self.poll_for_state(ingestor, &cancel).await;
            }
        };

        let mut heartbeat = tokio::time::interval(self.options.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("run cancelled");
                    let state = ingestor.into_state();
                    self.service.save_research_state(&state).await?;
                    return Ok(state);
                }

                record = events.next() => match record {
                    Some(Ok(event)) => match ingestor.apply(event) {
                        Applied::Accepted => {
                            bus.publish(BusEvent::StateUpdate {
                                state: Box::new(ingestor.state().clone()),
                            });
                        }
                        Applied::Filtered => {}
                        Applied::Completed => {
                            info!("research run completed");
                            return self.finish(ingestor.into_state()).await;
                        }
                        Applied::Failed(message) => {
                            bus.publish(BusEvent::Notice {
                                level: NoticeLevel::Error,
                                message,
                            });
                            return self.finish(ingestor.into_state()).await;
                        }
                    },
                    Some(Err(err)) => {
                        warn!(error = %err, "stream interrupted");
                        bus.publish(BusEvent::Notice {
                            level: NoticeLevel::Warning,
                            message: "Stream interrupted, polling for results".to_string(),
                        });
                        return self.poll_for_state(ingestor, &cancel).await;
                    }
                    None => {
                        debug!("stream closed before a terminal event");
                        return self.poll_for_state(ingestor, &cancel).await;
                    }
                },

                _ = heartbeat.tick() => {
                    bus.publish(BusEvent::heartbeat_now());
                }
            }
        }
    }

    async fn finish(&self, state: ResearchState) -> Result<ResearchState> {
        self.service.save_research_state(&state).await?;
        let _ = self
            .service
            .touch_history(state.identity.session_id.as_str())?;
        Ok(state)
    }

    /// Poll the state endpoint until the backend reports a terminal status.
    async fn poll_for_state(
        &self,
        ingestor: Ingestor,
        cancel: &CancellationToken,
    ) -> Result<ResearchState> {
        // Persist what accumulated so the cache participates in
        // last-writer-wins resolution against the backend.
        self.service.save_research_state(ingestor.state()).await?;

        let session_id = ingestor.state().identity.session_id.as_str().to_string();
        let research_id = ingestor.state().identity.research_id.as_str().to_string();
        let bus = self.service.bus().clone();

        for attempt in 1..=self.options.poll_max_attempts {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("polling cancelled");
                    return Ok(ingestor.into_state());
                }
                () = tokio::time::sleep(self.options.poll_interval) => {}
            }

            match self
                .service
                .get_research_state(&session_id, Some(&research_id))
                .await
            {
                Ok(Some(state))
                    if matches!(
                        state.status,
                        ResearchStatus::Completed | ResearchStatus::Error
                    ) =>
                {
                    info!(attempt, "polling resolved terminal state");
                    bus.publish(BusEvent::StateUpdate {
                        state: Box::new(state.clone()),
                    });
                    return Ok(state);
                }
                Ok(_) => debug!(attempt, "run still in progress"),
                Err(err) => warn!(attempt, error = %err, "polling attempt failed"),
            }
        }

        warn!("polling budget exhausted");
        bus.publish(BusEvent::Notice {
            level: NoticeLevel::Warning,
            message: "Gave up waiting for results; showing what was received".to_string(),
        });
        Ok(ingestor.into_state())
    }
}
