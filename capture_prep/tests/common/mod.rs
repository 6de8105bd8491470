#![allow(dead_code)]

use capture_prep::{
    CalibrationSettings, CaptureContext, JobTargets, PrepareCommand, PrepareConfig, PrepareEvent,
    PrepareOrchestrator, PrepareStage, RecordingSink, SharedCommandSink,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Orchestrator wired to a recording sink, with its notifications collected
pub struct Harness {
    pub orchestrator: PrepareOrchestrator,
    pub sink: Arc<RecordingSink>,
    events: broadcast::Receiver<PrepareEvent>,
    completions: usize,
    stages: Vec<PrepareStage>,
    logs: Vec<String>,
}

impl Harness {
    pub fn new(ctx: CaptureContext, targets: JobTargets, calibration: CalibrationSettings) -> Self {
        Self::with_config(ctx, PrepareConfig::default(), targets, calibration)
    }

    pub fn with_config(
        ctx: CaptureContext,
        config: PrepareConfig,
        targets: JobTargets,
        calibration: CalibrationSettings,
    ) -> Self {
        let sink = RecordingSink::new();
        let shared: SharedCommandSink = sink.clone();
        let orchestrator = PrepareOrchestrator::new(ctx.shared(), config, shared)
            .with_targets(targets)
            .with_calibration(calibration);
        let events = orchestrator.subscribe();

        Self {
            orchestrator,
            sink,
            events,
            completions: 0,
            stages: Vec::new(),
            logs: Vec::new(),
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                PrepareEvent::PrepareComplete => self.completions += 1,
                PrepareEvent::StageChanged(stage) => self.stages.push(stage),
                PrepareEvent::NewLog(message) => self.logs.push(message),
            }
        }
    }

    /// PrepareComplete notifications seen so far
    pub fn completions(&mut self) -> usize {
        self.drain();
        self.completions
    }

    pub fn stages(&mut self) -> Vec<PrepareStage> {
        self.drain();
        self.stages.clone()
    }

    pub fn logs(&mut self) -> Vec<String> {
        self.drain();
        self.logs.clone()
    }

    pub fn count(&self, predicate: impl Fn(&PrepareCommand) -> bool) -> usize {
        self.sink.count(predicate)
    }
}
