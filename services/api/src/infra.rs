use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use talent_pipeline::config::PipelineConfig;
use talent_pipeline::error::AppError;
use talent_pipeline::workflows::pipeline::{
    default_stage_templates, load_stage_seed, DispatchError, InMemoryPipelineStore,
    MessageDispatcher, OutboundMessage, PipelineService, StageTemplate,
};
use tracing::info;

pub(crate) type ApiPipelineService = PipelineService<InMemoryPipelineStore, LoggingOutbox>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Dispatcher that logs each message and keeps it for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingOutbox {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MessageDispatcher for LoggingOutbox {
    fn dispatch(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        info!(
            application_id = %message.application_id,
            action = message.action.as_str(),
            subject = %message.subject,
            "pipeline message queued"
        );
        let mut guard = self
            .sent
            .lock()
            .map_err(|_| DispatchError::Transport("outbox mutex poisoned".to_string()))?;
        guard.push(message);
        Ok(())
    }
}

impl LoggingOutbox {
    pub(crate) fn messages(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Stage templates from the configured seed file, or the built-in defaults.
pub(crate) fn load_stage_templates(config: &PipelineConfig) -> Result<Vec<StageTemplate>, AppError> {
    match &config.stage_seed {
        Some(path) => {
            let templates = load_stage_seed(path)?;
            info!(path = %path.display(), stages = templates.len(), "loaded stage seed");
            Ok(templates)
        }
        None => Ok(default_stage_templates()),
    }
}

/// In-memory pipeline with the global catalog seeded.
pub(crate) fn build_pipeline(
    templates: &[StageTemplate],
) -> Result<(ApiPipelineService, LoggingOutbox), AppError> {
    let outbox = LoggingOutbox::default();
    let service = PipelineService::new(
        Arc::new(InMemoryPipelineStore::default()),
        Arc::new(outbox.clone()),
    );
    service.seed_defaults(templates)?;
    Ok((service, outbox))
}
